//! SQL dialect descriptors for the backends on either side of a comparison
//!
//! A [`Dialect`] is plain data: the sampler and null normalizer read the
//! random/hash function names, identifier casing and literal conventions from
//! it instead of branching on the concrete connector type.

use crate::null_normalizer::NullPattern;
use crate::schema::SemanticType;
use serde::{Deserialize, Serialize};

/// How a backend folds unquoted identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierCase {
    Upper,
    Lower,
    Preserve,
}

impl IdentifierCase {
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::Upper => name.to_uppercase(),
            Self::Lower => name.to_lowercase(),
            Self::Preserve => name.to_string(),
        }
    }
}

/// How the modulo operation is spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuloStyle {
    /// `MOD(a, b)`
    Function,
    /// `(a % b)`
    Operator,
}

/// How year/month parts are pulled out of a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePartStyle {
    /// `YEAR(col)`, `MONTH(col)`
    Functions,
    /// `EXTRACT(YEAR FROM col)`
    Extract,
}

/// Capability descriptor for one SQL backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    pub name: String,
    pub identifier_case: IdentifierCase,
    /// Expression producing a random value per row, e.g. `RAND()`
    pub random_fn: String,
    /// Name of a function returning an integer hash of its argument
    pub hash_fn: String,
    pub modulo: ModuloStyle,
    pub date_parts: DatePartStyle,
    /// Cheapest statement that proves the connection is alive
    pub ping_sql: String,
    /// Values this backend writes where it means "no value"
    pub null_patterns: Vec<NullPattern>,
}

impl Dialect {
    /// SAP HANA, the usual system of record
    pub fn hana() -> Self {
        Self {
            name: "hana".to_string(),
            identifier_case: IdentifierCase::Upper,
            random_fn: "RAND()".to_string(),
            hash_fn: "HASH_SHA256".to_string(),
            modulo: ModuloStyle::Function,
            date_parts: DatePartStyle::Functions,
            ping_sql: "SELECT 1 FROM DUMMY".to_string(),
            null_patterns: vec![
                NullPattern::text(SemanticType::Temporal, "00000000"),
                NullPattern::text(SemanticType::Categorical, ""),
            ],
        }
    }

    /// Dremio lakehouse copies
    pub fn dremio() -> Self {
        Self {
            name: "dremio".to_string(),
            identifier_case: IdentifierCase::Lower,
            random_fn: "RANDOM()".to_string(),
            hash_fn: "HASH".to_string(),
            modulo: ModuloStyle::Function,
            date_parts: DatePartStyle::Extract,
            ping_sql: "SELECT 1".to_string(),
            null_patterns: vec![
                NullPattern::text(SemanticType::Categorical, ""),
                NullPattern::text(SemanticType::Temporal, ""),
            ],
        }
    }

    /// DuckDB, used for local files and attached databases
    pub fn duckdb() -> Self {
        Self {
            name: "duckdb".to_string(),
            identifier_case: IdentifierCase::Preserve,
            random_fn: "random()".to_string(),
            hash_fn: "hash".to_string(),
            modulo: ModuloStyle::Operator,
            date_parts: DatePartStyle::Extract,
            ping_sql: "SELECT 1".to_string(),
            null_patterns: vec![NullPattern::text(SemanticType::Categorical, "")],
        }
    }

    /// Look up a built-in dialect by name
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "hana" | "sap_hana" => Some(Self::hana()),
            "dremio" => Some(Self::dremio()),
            "duckdb" => Some(Self::duckdb()),
            _ => None,
        }
    }

    /// Quote an identifier exactly as given
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Fold a configured name into this backend's identifier convention
    pub fn fold_identifier(&self, name: &str) -> String {
        self.identifier_case.apply(name)
    }

    pub fn modulo(&self, expr: &str, divisor: u64) -> String {
        match self.modulo {
            ModuloStyle::Function => format!("MOD({}, {})", expr, divisor),
            ModuloStyle::Operator => format!("({} % {})", expr, divisor),
        }
    }

    /// Deterministic bucket in `0..100` for a column value
    pub fn hash_bucket(&self, column_ref: &str) -> String {
        let hashed = format!("ABS({}({}))", self.hash_fn, column_ref);
        self.modulo(&hashed, 100)
    }

    pub fn year_of(&self, column_ref: &str) -> String {
        match self.date_parts {
            DatePartStyle::Functions => format!("YEAR({})", column_ref),
            DatePartStyle::Extract => format!("EXTRACT(YEAR FROM {})", column_ref),
        }
    }

    pub fn month_of(&self, column_ref: &str) -> String {
        match self.date_parts {
            DatePartStyle::Functions => format!("MONTH({})", column_ref),
            DatePartStyle::Extract => format!("EXTRACT(MONTH FROM {})", column_ref),
        }
    }

    /// Predicate restricting a date column to one calendar month
    pub fn month_filter(&self, column: &str, year: i32, month: u32) -> String {
        let column_ref = self.quote_identifier(&self.fold_identifier(column));
        format!(
            "{} = {} AND {} = {}",
            self.year_of(&column_ref),
            year,
            self.month_of(&column_ref),
            month
        )
    }
}
