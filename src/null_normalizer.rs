//! Null-equivalent normalization
//!
//! Backends write sentinels where they mean "no value": a zero date string,
//! an empty string. Before null rates or distributions are compared those
//! sentinels are rewritten to real NULLs in the extraction SQL.

use crate::dialect::Dialect;
use crate::schema::{ColumnDescriptor, SemanticType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The sentinel value itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullLiteral {
    Text(String),
    Date(NaiveDate),
}

impl NullLiteral {
    fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// SQL literal comparable with a column of the given kind
    fn to_sql(&self, native_temporal: bool) -> String {
        match self {
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Date(d) if native_temporal => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Self::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        }
    }
}

/// One null-equivalent rule: columns of `semantic_type` holding `literal` are NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullPattern {
    pub semantic_type: SemanticType,
    pub literal: NullLiteral,
}

impl NullPattern {
    pub fn text(semantic_type: SemanticType, literal: &str) -> Self {
        Self {
            semantic_type,
            literal: NullLiteral::Text(literal.to_string()),
        }
    }

    pub fn date(semantic_type: SemanticType, literal: NaiveDate) -> Self {
        Self {
            semantic_type,
            literal: NullLiteral::Date(literal),
        }
    }
}

/// A pattern that matched the column's type but could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPattern {
    pub pattern: NullPattern,
    pub reason: String,
}

/// SQL for one column with its null-equivalents folded to NULL
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransform {
    pub column: String,
    /// Normalized value expression without an alias
    pub value_expr: String,
    pub applied: Vec<NullPattern>,
    pub skipped: Vec<SkippedPattern>,
}

impl ColumnTransform {
    /// `value_expr AS "column"`, ready for a select list
    pub fn select_expr(&self, dialect: &Dialect) -> String {
        format!("{} AS {}", self.value_expr, dialect.quote_identifier(&self.column))
    }

    pub fn is_identity(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Null-equivalent rules for one side of a comparison
#[derive(Debug, Clone)]
pub struct NullNormalizer {
    dialect: Dialect,
    patterns: Vec<NullPattern>,
}

impl NullNormalizer {
    /// Built-in patterns of the dialect followed by any configured extras
    pub fn new(dialect: &Dialect, extra: &[NullPattern]) -> Self {
        let mut patterns = dialect.null_patterns.clone();
        for pattern in extra {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        Self {
            dialect: dialect.clone(),
            patterns,
        }
    }

    pub fn patterns(&self) -> &[NullPattern] {
        &self.patterns
    }

    /// Wrap the column in one `NULLIF` per applicable pattern.
    ///
    /// Text sentinels are never compared against native date/time columns;
    /// those patterns are skipped here and recorded on the transform.
    pub fn transform_column(&self, column: &ColumnDescriptor) -> ColumnTransform {
        let native_temporal = column.is_native_temporal();
        let mut value_expr = self.dialect.quote_identifier(&column.name);
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for pattern in self
            .patterns
            .iter()
            .filter(|p| p.semantic_type == column.semantic_type)
        {
            if native_temporal && pattern.literal.is_text() {
                log::debug!(
                    "[{}] Not applying text null pattern {:?} to native {} column '{}'",
                    self.dialect.name,
                    pattern.literal,
                    column.native_type,
                    column.name
                );
                skipped.push(SkippedPattern {
                    pattern: pattern.clone(),
                    reason: format!(
                        "text literal cannot be compared with native type {}",
                        column.native_type
                    ),
                });
                continue;
            }

            value_expr = format!(
                "NULLIF({}, {})",
                value_expr,
                pattern.literal.to_sql(native_temporal)
            );
            applied.push(pattern.clone());
        }

        ColumnTransform {
            column: column.name.clone(),
            value_expr,
            applied,
            skipped,
        }
    }
}
