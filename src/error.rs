//! Error types for statdiff operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatdiffError>;

#[derive(Error, Debug)]
pub enum StatdiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Connection to {backend} failed: {message}")]
    Connection { backend: String, message: String },

    #[error("Query execution failed: {message}")]
    QueryExecution { message: String },

    #[error("Caching failed: {message}")]
    Caching { message: String },

    #[error("Column '{column}' could not be materialized: {message}")]
    ColumnMaterialization { column: String, message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Insufficient non-null data: {actual} values, {required} required")]
    InsufficientSample { actual: usize, required: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl StatdiffError {
    pub fn connection(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
        }
    }

    pub fn caching(msg: impl Into<String>) -> Self {
        Self::Caching {
            message: msg.into(),
        }
    }

    pub fn column_materialization(column: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ColumnMaterialization {
            column: column.into(),
            message: msg.into(),
        }
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Whether this error means a backend could not be reached at all
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
