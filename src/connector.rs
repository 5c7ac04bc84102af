//! Backend connectors: the `DataConnector` contract and a DuckDB implementation

use crate::cache::{LocalStore, MaterializedTable};
use crate::dialect::Dialect;
use crate::error::{Result, StatdiffError};
use crate::schema::{ColumnDescriptor, TableSchema};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use std::env;
use std::path::Path;

/// A single cell fetched from a backend
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary content, or string content that is not valid UTF-8
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }
}

/// Query result: column names plus rows in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// All values of one column
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// First cell of the first row
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// What the comparison engine needs from a backend
pub trait DataConnector {
    fn dialect(&self) -> &Dialect;

    fn execute_query(&self, sql: &str) -> Result<Table>;

    fn get_table_schema(&self, table: &str) -> Result<TableSchema>;

    fn get_row_count(&self, table: &str) -> Result<u64> {
        self.count_rows(table, None)
    }

    fn close(&mut self) -> Result<()>;

    /// Run `sql` and materialize the result into `store` as `target_name`
    fn cache_query(
        &self,
        sql: &str,
        target_name: &str,
        columns: &[ColumnDescriptor],
        store: &LocalStore,
    ) -> Result<MaterializedTable> {
        log::debug!("[{}] Caching into {}: {}", self.dialect().name, target_name, sql);
        let table = self.execute_query(sql)?;
        store.materialize(target_name, columns, &table)
    }

    /// Row count with an optional caller predicate
    fn count_rows(&self, table: &str, filter: Option<&str>) -> Result<u64> {
        let sql = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(filter) => format!("SELECT COUNT(*) FROM {} WHERE ({})", table, filter),
            None => format!("SELECT COUNT(*) FROM {}", table),
        };
        let result = self.execute_query(&sql)?;
        result
            .scalar()
            .and_then(Value::as_i64)
            .map(|n| n.max(0) as u64)
            .ok_or_else(|| StatdiffError::query(format!("Row count query returned no value: {}", sql)))
    }

    /// Prove the backend is reachable
    fn ping(&self) -> Result<()> {
        let dialect = self.dialect();
        self.execute_query(&dialect.ping_sql)
            .map(|_| ())
            .map_err(|e| StatdiffError::connection(dialect.name.clone(), e.to_string()))
    }
}

/// A connector over a DuckDB database: in-memory, a file, or engines
/// reachable through `ATTACH`
pub struct DuckDbConnector {
    connection: Option<Connection>,
    dialect: Dialect,
}

impl DuckDbConnector {
    pub fn open_in_memory(dialect: Dialect) -> Result<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| StatdiffError::connection(dialect.name.clone(), e.to_string()))?;
        Ok(Self {
            connection: Some(connection),
            dialect,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, dialect: Dialect) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StatdiffError::connection(
                dialect.name.clone(),
                format!("Database file not found: {}", path.display()),
            ));
        }
        let connection = Connection::open(path)
            .map_err(|e| StatdiffError::connection(dialect.name.clone(), e.to_string()))?;
        Ok(Self {
            connection: Some(connection),
            dialect,
        })
    }

    /// Run an `ATTACH ...` statement; `{VAR}` placeholders are read from the environment
    pub fn attach(&self, statement: &str) -> Result<()> {
        let statement = substitute_env_vars(statement)?;
        self.connection()?
            .execute_batch(&statement)
            .map_err(|e| StatdiffError::connection(self.dialect.name.clone(), e.to_string()))
    }

    /// Run setup SQL (DDL, inserts) without returning rows
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| StatdiffError::connection(self.dialect.name.clone(), "connection is closed"))
    }
}

impl DataConnector for DuckDbConnector {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn execute_query(&self, sql: &str) -> Result<Table> {
        log::debug!("[{}] {}", self.dialect.name, sql);
        run_query(self.connection()?, sql)
    }

    fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let sql = format!("DESCRIBE {}", table);
        let mut stmt = self
            .connection()?
            .prepare(&sql)
            .map_err(|e| StatdiffError::query(format!("Failed to describe {}: {}", table, e)))?;

        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let native_type: String = row.get(1)?;
            let nullable: Option<String> = row.get(2)?;
            Ok((name, native_type, nullable))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, native_type, nullable) = row?;
            let nullable = nullable.map(|n| n.eq_ignore_ascii_case("YES")).unwrap_or(true);
            columns.push(ColumnDescriptor::new(name, native_type, nullable));
        }

        if columns.is_empty() {
            return Err(StatdiffError::query(format!("Table {} has no columns", table)));
        }
        Ok(TableSchema::new(columns))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .map_err(|(_, e)| StatdiffError::connection(self.dialect.name.clone(), e.to_string()))?;
        }
        Ok(())
    }
}

/// Execute a query on a DuckDB connection and collect every row
pub(crate) fn run_query(connection: &Connection, sql: &str) -> Result<Table> {
    let mut stmt = connection
        .prepare(sql)
        .map_err(|e| StatdiffError::query(format!("{} ({})", e, sql)))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| StatdiffError::query(format!("{} ({})", e, sql)))?;

    let columns: Vec<String> = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();

    let mut table = Table {
        columns,
        rows: Vec::new(),
    };
    while let Some(row) = rows.next().map_err(|e| StatdiffError::query(e.to_string()))? {
        let mut values = Vec::with_capacity(table.columns.len());
        for i in 0..table.columns.len() {
            values.push(value_from_ref(row.get_ref(i)?));
        }
        table.rows.push(values);
    }
    Ok(table)
}

pub(crate) fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::Int(i as i64),
        ValueRef::SmallInt(i) => Value::Int(i as i64),
        ValueRef::Int(i) => Value::Int(i as i64),
        ValueRef::BigInt(i) => Value::Int(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        ValueRef::UTinyInt(i) => Value::Int(i as i64),
        ValueRef::USmallInt(i) => Value::Int(i as i64),
        ValueRef::UInt(i) => Value::Int(i as i64),
        ValueRef::UBigInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        ValueRef::Float(f) => Value::Float(f as f64),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Text(d.to_string())),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::Text(s.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
        ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, raw) => DateTime::<Utc>::from_timestamp_micros(micros(unit, raw))
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        ValueRef::Time64(unit, raw) => {
            let total = micros(unit, raw);
            let secs = total.div_euclid(1_000_000);
            Value::Text(format!(
                "{:02}:{:02}:{:02}.{:06}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60,
                total.rem_euclid(1_000_000)
            ))
        }
        other => Value::Text(format!("{:?}", other)),
    }
}

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

/// Substitute `{VAR_NAME}` placeholders with environment variables
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut start = 0;
    while let Some(open) = result[start..].find('{') {
        let open = start + open;
        let Some(close) = result[open..].find('}') else {
            break;
        };
        let close = open + close;
        let name = result[open + 1..close].to_string();
        let value = env::var(&name).map_err(|_| {
            StatdiffError::invalid_input(format!("Environment variable '{}' not found", name))
        })?;
        result.replace_range(open..=close, &value);
        start = open + value.len();
    }
    Ok(result)
}
