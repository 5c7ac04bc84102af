//! Local columnar cache of the sampled rows of each side
//!
//! Both sides are materialized into one private DuckDB store with lower-cased
//! column names, so every later per-column query runs locally. A column that
//! cannot be stored is dropped on its own; the rest of the table survives.

use crate::connector::{run_query, Table, Value};
use crate::duckdb_config::DuckDbConfig;
use crate::error::{Result, StatdiffError};
use crate::schema::{ColumnDescriptor, SemanticType};
use chrono::{NaiveDate, NaiveDateTime};
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which side of the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Dest,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Dest => "dest",
        }
    }

    /// Name of this side's table in the local store
    pub fn cache_table(&self) -> &'static str {
        match self {
            Self::Source => "cached_source",
            Self::Dest => "cached_dest",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column left out of the cache and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedColumn {
    pub name: String,
    pub reason: String,
}

impl DroppedColumn {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Record a column that failed to materialize into `target`
    fn unmaterialized(target: &str, column: &str, error: &StatdiffError) -> Self {
        log::warn!("Dropping from {}: {}", target, error);
        Self::new(column, error.to_string())
    }
}

/// Result of writing one query result into the store
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTable {
    pub table_name: String,
    /// Lower-cased names of the columns that made it in
    pub columns: Vec<String>,
    pub dropped: Vec<DroppedColumn>,
    pub row_count: u64,
}

/// One side's cached sample
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDataset {
    pub side: Side,
    pub table_name: String,
    pub columns: Vec<String>,
    pub dropped: Vec<DroppedColumn>,
    pub row_count: u64,
}

impl CachedDataset {
    pub fn new(side: Side, table: MaterializedTable) -> Self {
        Self {
            side,
            table_name: table.table_name,
            columns: table.columns,
            dropped: table.dropped,
            row_count: table.row_count,
        }
    }

    pub fn has_column(&self, canonical: &str) -> bool {
        self.columns.iter().any(|c| c == canonical)
    }
}

/// Outcome of the caching phase
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    Ready {
        source: CachedDataset,
        dest: CachedDataset,
    },
    Failed {
        side: Side,
        error: String,
    },
}

impl CacheOutcome {
    /// Canonical names retained on both sides, in source order
    pub fn retained_columns(&self) -> Vec<String> {
        match self {
            Self::Ready { source, dest } => source
                .columns
                .iter()
                .filter(|c| dest.has_column(c))
                .cloned()
                .collect(),
            Self::Failed { .. } => Vec::new(),
        }
    }
}

/// Column type inside the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Double,
    Timestamp,
    Boolean,
    Varchar,
}

impl StoreType {
    pub fn for_column(column: &ColumnDescriptor) -> Self {
        if column.is_native_temporal() {
            return Self::Timestamp;
        }
        match column.semantic_type {
            SemanticType::Numerical => Self::Double,
            SemanticType::Boolean => Self::Boolean,
            _ => Self::Varchar,
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            Self::Double => "DOUBLE",
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
            Self::Varchar => "VARCHAR",
        }
    }

    /// Convert one fetched value; `Err` carries the reason the column is unusable
    fn convert(&self, value: &Value) -> std::result::Result<DuckValue, String> {
        if value.is_null() {
            return Ok(DuckValue::Null);
        }
        if let Value::Bytes(bytes) = value {
            return Err(format!("{} bytes of non-UTF-8 or binary content", bytes.len()));
        }

        match self {
            Self::Double => match value {
                Value::Int(i) => Ok(DuckValue::Double(*i as f64)),
                Value::Float(f) => Ok(DuckValue::Double(*f)),
                Value::Bool(b) => Ok(DuckValue::Double(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) if s.trim().is_empty() => Ok(DuckValue::Null),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(DuckValue::Double)
                    .map_err(|_| format!("value '{}' is not numeric", s)),
                other => Err(format!("value {:?} is not numeric", other)),
            },
            Self::Timestamp => match value {
                Value::Date(d) => d
                    .and_hms_opt(0, 0, 0)
                    .map(timestamp_value)
                    .ok_or_else(|| format!("date {} is out of range", d)),
                Value::Timestamp(ts) => Ok(timestamp_value(*ts)),
                Value::Text(s) => parse_timestamp(s)
                    .map(timestamp_value)
                    .ok_or_else(|| format!("value '{}' is not a timestamp", s)),
                other => Err(format!("value {:?} is not a timestamp", other)),
            },
            Self::Boolean => match value {
                Value::Bool(b) => Ok(DuckValue::Boolean(*b)),
                Value::Int(0) => Ok(DuckValue::Boolean(false)),
                Value::Int(1) => Ok(DuckValue::Boolean(true)),
                Value::Text(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "t" | "1" | "y" => Ok(DuckValue::Boolean(true)),
                    "false" | "f" | "0" | "n" => Ok(DuckValue::Boolean(false)),
                    _ => Err(format!("value '{}' is not boolean", s)),
                },
                other => Err(format!("value {:?} is not boolean", other)),
            },
            Self::Varchar => Ok(match value {
                Value::Text(s) => DuckValue::Text(s.clone()),
                Value::Int(i) => DuckValue::Text(i.to_string()),
                Value::Float(f) => DuckValue::Text(f.to_string()),
                Value::Bool(b) => DuckValue::Text(b.to_string()),
                Value::Date(d) => DuckValue::Text(d.format("%Y-%m-%d").to_string()),
                Value::Timestamp(ts) => DuckValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
                Value::Null | Value::Bytes(_) => DuckValue::Null,
            }),
        }
    }
}

fn timestamp_value(ts: NaiveDateTime) -> DuckValue {
    DuckValue::Timestamp(TimeUnit::Microsecond, ts.and_utc().timestamp_micros())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%Y%m%d"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

struct PreparedColumn {
    name: String,
    store_type: StoreType,
    values: Vec<DuckValue>,
}

/// The private DuckDB store of one comparison run
pub struct LocalStore {
    connection: Connection,
}

impl LocalStore {
    pub fn open(config: &DuckDbConfig) -> Result<Self> {
        let connection = config
            .open_connection()
            .map_err(|e| StatdiffError::caching(format!("Failed to open local store: {}", e)))?;
        Ok(Self { connection })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(&DuckDbConfig::default())
    }

    /// Store `table` as `target`, dropping columns that cannot be stored
    pub fn materialize(
        &self,
        target: &str,
        columns: &[ColumnDescriptor],
        table: &Table,
    ) -> Result<MaterializedTable> {
        let mut prepared = Vec::new();
        let mut dropped = Vec::new();
        let mut seen = HashSet::new();

        for (index, raw_name) in table.columns.iter().enumerate() {
            let canonical = raw_name.to_lowercase();
            if !seen.insert(canonical.clone()) {
                dropped.push(DroppedColumn::new(
                    raw_name.as_str(),
                    "duplicate column name after case folding",
                ));
                continue;
            }

            let store_type = columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(raw_name))
                .map(StoreType::for_column)
                .unwrap_or(StoreType::Varchar);

            let converted: Result<Vec<DuckValue>> = table
                .column_values(index)
                .map(|value| {
                    store_type
                        .convert(value)
                        .map_err(|reason| StatdiffError::column_materialization(raw_name.as_str(), reason))
                })
                .collect();

            match converted {
                Ok(values) => prepared.push(PreparedColumn {
                    name: canonical,
                    store_type,
                    values,
                }),
                Err(e) => dropped.push(DroppedColumn::unmaterialized(target, raw_name, &e)),
            }
        }

        if prepared.is_empty() {
            return Err(StatdiffError::caching(format!(
                "No column of {} could be materialized",
                target
            )));
        }

        let rows = table.num_rows();
        if let Err(e) = self.write_table(target, &prepared, rows) {
            log::warn!(
                "Bulk insert into {} failed ({}), probing columns individually",
                target,
                e
            );
            let probe = format!("{}_probe", target);
            let mut retained = Vec::new();
            for column in prepared {
                match self.write_table(&probe, std::slice::from_ref(&column), rows) {
                    Ok(()) => retained.push(column),
                    Err(e) => {
                        let error = StatdiffError::column_materialization(column.name.as_str(), e.to_string());
                        dropped.push(DroppedColumn::unmaterialized(target, &column.name, &error));
                    }
                }
            }
            self.connection
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(&probe)))?;

            if retained.is_empty() {
                return Err(StatdiffError::caching(format!(
                    "No column of {} could be materialized",
                    target
                )));
            }
            self.write_table(target, &retained, rows)
                .map_err(|e| StatdiffError::caching(format!("Retry into {} failed: {}", target, e)))?;
            prepared = retained;
        }

        log::info!(
            "Cached {} rows x {} columns into {} ({} dropped)",
            rows,
            prepared.len(),
            target,
            dropped.len()
        );

        Ok(MaterializedTable {
            table_name: target.to_string(),
            columns: prepared.into_iter().map(|c| c.name).collect(),
            dropped,
            row_count: rows as u64,
        })
    }

    /// Create `name` and bulk-load the prepared columns through an appender
    fn write_table(&self, name: &str, columns: &[PreparedColumn], rows: usize) -> Result<()> {
        let ddl = columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.store_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection
            .execute_batch(&format!("CREATE OR REPLACE TABLE {} ({})", quote(name), ddl))?;

        let appended = (|| -> Result<()> {
            let mut appender = self.connection.appender(name)?;
            for row in 0..rows {
                appender.append_row(params_from_iter(columns.iter().map(|c| c.values[row].clone())))?;
            }
            appender.flush()?;
            Ok(())
        })();

        if appended.is_err() {
            if let Err(e) = self
                .connection
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(name)))
            {
                log::warn!("Could not drop partially written table {}: {}", name, e);
            }
        }
        appended
    }

    pub fn query(&self, sql: &str) -> Result<Table> {
        log::debug!("[cache] {}", sql);
        run_query(&self.connection, sql)
    }

    /// Non-null finite values of a column as doubles
    pub fn numeric_values(&self, table: &str, column: &str) -> Result<Vec<f64>> {
        let col = quote(column);
        let sql = format!(
            "SELECT TRY_CAST({col} AS DOUBLE) FROM {} WHERE {col} IS NOT NULL",
            quote(table)
        );
        Ok(self
            .query(&sql)?
            .column_values(0)
            .filter_map(Value::as_f64)
            .filter(|v| v.is_finite())
            .collect())
    }

    pub fn distinct_count(&self, table: &str, column: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(DISTINCT {}) FROM {}", quote(column), quote(table));
        self.query(&sql)?
            .scalar()
            .and_then(Value::as_i64)
            .map(|n| n.max(0) as u64)
            .ok_or_else(|| StatdiffError::query(format!("No distinct count for {}", column)))
    }

    /// Histogram of non-null values, keyed by their text form
    pub fn value_counts(&self, table: &str, column: &str) -> Result<Vec<(String, u64)>> {
        let col = quote(column);
        let sql = format!(
            "SELECT CAST({col} AS VARCHAR) AS value, COUNT(*) AS cnt FROM {} \
             WHERE {col} IS NOT NULL GROUP BY 1 ORDER BY 1",
            quote(table)
        );
        let result = self.query(&sql)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| match (row.first(), row.get(1).and_then(Value::as_i64)) {
                (Some(Value::Text(value)), Some(count)) => Some((value.clone(), count.max(0) as u64)),
                _ => None,
            })
            .collect())
    }

    /// Non-null values that parse as dates or timestamps, including `YYYYMMDD` strings
    pub fn timestamps(&self, table: &str, column: &str) -> Result<Vec<NaiveDateTime>> {
        let col = quote(column);
        let sql = format!(
            "SELECT COALESCE(TRY_CAST({col} AS TIMESTAMP), TRY_STRPTIME(CAST({col} AS VARCHAR), '%Y%m%d')) \
             FROM {} WHERE {col} IS NOT NULL",
            quote(table)
        );
        Ok(self
            .query(&sql)?
            .column_values(0)
            .filter_map(Value::as_timestamp)
            .collect())
    }

    pub fn close(self) -> Result<()> {
        self.connection
            .close()
            .map_err(|(_, e)| StatdiffError::caching(format!("Failed to close local store: {}", e)))
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
