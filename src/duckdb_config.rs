//! Settings for the local DuckDB store that holds cached samples

use crate::error::{Result, StatdiffError};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Local store configuration (`cache.*` keys)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Database file for the cache; in-memory when unset
    pub path: Option<PathBuf>,
    /// DuckDB memory limit, e.g. `4GB`
    pub memory_limit: Option<String>,
    pub threads: Option<usize>,
}

impl DuckDbConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = &self.memory_limit {
            let limit = limit.trim();
            let digits = limit.trim_end_matches(|c: char| c.is_ascii_alphabetic()).trim();
            if digits.is_empty() || digits.parse::<f64>().is_err() {
                return Err(StatdiffError::config(format!(
                    "cache.memory_limit '{}' is not a size like '4GB'",
                    limit
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(StatdiffError::config("cache.threads must be at least 1"));
        }
        Ok(())
    }

    /// Open a connection with these settings applied
    pub fn open_connection(&self) -> Result<Connection> {
        let connection = match &self.path {
            Some(path) => {
                log::info!("Using DuckDB cache file: {}", path.display());
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };

        connection.execute_batch("SET enable_progress_bar=false")?;
        if let Some(limit) = &self.memory_limit {
            connection.execute_batch(&format!("SET memory_limit='{}'", limit.replace('\'', "")))?;
        }
        if let Some(threads) = self.threads {
            connection.execute_batch(&format!("SET threads={}", threads))?;
        }
        Ok(connection)
    }
}
