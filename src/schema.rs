//! Column descriptors, table schemas and cross-backend schema reconciliation

use crate::report::{TestResult, TestStatus};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// Lower-cased name fragments that mark a string column as holding dates
const TEMPORAL_NAME_HINTS: &[&str] = &["date", "_dt", "time", "_ts", "timestamp"];

/// What kind of values a column holds, independent of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numerical,
    Categorical,
    Temporal,
    Boolean,
    Binary,
    Other,
}

impl SemanticType {
    /// Classify a backend type string such as `NVARCHAR(10)`, `DECIMAL(18,2)`,
    /// `TIMESTAMP WITH TIME ZONE` or `date32[day]`
    pub fn from_native(native_type: &str) -> Self {
        let upper = native_type.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();

        if base.starts_with("INTERVAL") {
            return Self::Other;
        }
        if base.contains("BINARY") || matches!(base, "BLOB" | "BYTEA" | "IMAGE" | "BYTES") {
            return Self::Binary;
        }
        if matches!(base, "BOOLEAN" | "BOOL" | "BIT") {
            return Self::Boolean;
        }
        if base.starts_with("DATE")
            || base.starts_with("TIMESTAMP")
            || base.starts_with("TIME")
            || base.starts_with("SECONDDATE")
        {
            return Self::Temporal;
        }
        if base.contains("INT")
            || ["DECIMAL", "NUMERIC", "FLOAT", "DOUBLE", "REAL", "SMALLDECIMAL", "NUMBER", "MONEY"]
                .iter()
                .any(|prefix| base.starts_with(prefix))
        {
            return Self::Numerical;
        }
        if ["CHAR", "TEXT", "STRING", "CLOB", "ALPHANUM", "UTF8"]
            .iter()
            .any(|fragment| base.contains(fragment))
        {
            return Self::Categorical;
        }
        Self::Other
    }

    /// Which family of statistical tests applies
    pub fn family(&self) -> ColumnFamily {
        match self {
            Self::Numerical => ColumnFamily::Numerical,
            Self::Categorical | Self::Boolean => ColumnFamily::Categorical,
            Self::Temporal => ColumnFamily::Temporal,
            Self::Binary | Self::Other => ColumnFamily::Other,
        }
    }
}

/// Buckets returned by [`SchemaReconciler::classify_columns`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFamily {
    Numerical,
    Categorical,
    Temporal,
    Other,
}

/// One column as reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub native_type: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Build a descriptor, promoting string columns with date-like names
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, nullable: bool) -> Self {
        let name = name.into();
        let native_type = native_type.into();
        let mut semantic_type = SemanticType::from_native(&native_type);

        if semantic_type == SemanticType::Categorical && has_temporal_name(&name) {
            semantic_type = SemanticType::Temporal;
        }

        Self {
            name,
            native_type,
            semantic_type,
            nullable,
        }
    }

    /// True when the backend type itself is a date/time type
    pub fn is_native_temporal(&self) -> bool {
        SemanticType::from_native(&self.native_type) == SemanticType::Temporal
    }

    pub fn is_binary(&self) -> bool {
        self.semantic_type == SemanticType::Binary
    }

    /// Name used inside the local cache
    pub fn canonical_name(&self) -> String {
        self.name.to_lowercase()
    }
}

fn has_temporal_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    TEMPORAL_NAME_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Ordered set of columns keyed case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: IndexMap<String, ColumnDescriptor>,
}

impl TableSchema {
    /// Build a schema; a later column whose name only differs by case from an
    /// earlier one is ignored
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let mut map = IndexMap::with_capacity(columns.len());
        for column in columns {
            let key = column.name.to_uppercase();
            if map.contains_key(&key) {
                log::warn!("Ignoring column '{}': name collides case-insensitively", column.name);
                continue;
            }
            map.insert(key, column);
        }
        Self { columns: map }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(&name.to_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(&name.to_uppercase())
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn upper_names(&self) -> BTreeSet<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }
}

/// Result of [`SchemaReconciler::classify_columns`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnClassification {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
    pub temporal: Vec<String>,
    pub other: Vec<String>,
}

impl ColumnClassification {
    /// Bucket holding `name`, matched case-insensitively
    pub fn family_of(&self, name: &str) -> Option<ColumnFamily> {
        let holds = |bucket: &[String]| bucket.iter().any(|c| c.eq_ignore_ascii_case(name));
        if holds(&self.numerical) {
            Some(ColumnFamily::Numerical)
        } else if holds(&self.categorical) {
            Some(ColumnFamily::Categorical)
        } else if holds(&self.temporal) {
            Some(ColumnFamily::Temporal)
        } else if holds(&self.other) {
            Some(ColumnFamily::Other)
        } else {
            None
        }
    }
}

/// Case-insensitive schema diffing between two backends
pub struct SchemaReconciler;

impl SchemaReconciler {
    /// Compare two schemas and produce the `schema_comparison` result
    pub fn compare_schemas(source: &TableSchema, dest: &TableSchema) -> TestResult {
        let source_names = source.upper_names();
        let dest_names = dest.upper_names();

        let missing: Vec<String> = source_names
            .difference(&dest_names)
            .filter_map(|key| source.get(key).map(|c| c.name.clone()))
            .collect();
        let extra: Vec<String> = dest_names
            .difference(&source_names)
            .filter_map(|key| dest.get(key).map(|c| c.name.clone()))
            .collect();

        let mut type_mismatches = Vec::new();
        let mut common = 0usize;
        for key in source_names.intersection(&dest_names) {
            common += 1;
            let (Some(src), Some(dst)) = (source.get(key), dest.get(key)) else {
                continue;
            };
            if !Self::types_compatible(&src.native_type, &dst.native_type) {
                type_mismatches.push(json!({
                    "column": src.name,
                    "source_type": src.native_type,
                    "dest_type": dst.native_type,
                }));
            }
        }

        let status = if !missing.is_empty() || !extra.is_empty() {
            TestStatus::Fail
        } else if !type_mismatches.is_empty() {
            TestStatus::Warning
        } else {
            TestStatus::Pass
        };

        TestResult::new("schema_comparison", None, status)
            .with_detail("source_columns", source.len())
            .with_detail("dest_columns", dest.len())
            .with_detail("missing_in_dest", missing)
            .with_detail("extra_in_dest", extra)
            .with_detail("type_mismatches", type_mismatches)
            .with_detail("common_columns", common)
    }

    /// Grouped type compatibility: numeric with numeric, date-like with
    /// date-like, everything else by exact name
    pub fn types_compatible(source_type: &str, dest_type: &str) -> bool {
        let source_upper = source_type.trim().to_uppercase();
        let dest_upper = dest_type.trim().to_uppercase();
        if source_upper == dest_upper {
            return true;
        }

        if SemanticType::from_native(&source_upper) == SemanticType::Numerical
            && SemanticType::from_native(&dest_upper) == SemanticType::Numerical
        {
            return true;
        }

        let date_like = |t: &str| t.contains("DATE") || t.contains("TIMESTAMP");
        date_like(&source_upper) && date_like(&dest_upper)
    }

    /// Columns present on both sides, in source casing, sorted
    pub fn get_common_columns(source: &TableSchema, dest: &TableSchema) -> Vec<String> {
        source
            .upper_names()
            .intersection(&dest.upper_names())
            .filter_map(|key| source.get(key).map(|c| c.name.clone()))
            .collect()
    }

    /// Bucket columns by the tests that apply to them
    pub fn classify_columns(schema: &TableSchema) -> ColumnClassification {
        let mut classification = ColumnClassification::default();
        for column in schema.columns() {
            let bucket = match column.semantic_type.family() {
                ColumnFamily::Numerical => &mut classification.numerical,
                ColumnFamily::Categorical => &mut classification.categorical,
                ColumnFamily::Temporal => &mut classification.temporal,
                ColumnFamily::Other => &mut classification.other,
            };
            bucket.push(column.name.clone());
        }
        classification
    }
}
