//! # statdiff
//!
//! Statistical comparison of a table that lives in two database engines.
//! A [`Comparator`] reconciles the schemas, caches a sample of each side in a
//! local DuckDB store, runs a suite of hypothesis tests per column and folds
//! the results into one [`ComparisonReport`] with an overall verdict.

pub mod cache;
pub mod cli;
pub mod commands;
pub mod comparator;
pub mod config;
pub mod connector;
pub mod correction;
pub mod dialect;
pub mod distributions;
pub mod duckdb_config;
pub mod error;
pub mod null_normalizer;
pub mod output;
pub mod progress;
pub mod report;
pub mod sampler;
pub mod schema;
pub mod statistics;

pub use comparator::{CompareOptions, Comparator, Phase};
pub use config::CompareConfig;
pub use connector::{DataConnector, DuckDbConnector, Table, Value};
pub use dialect::Dialect;
pub use error::{Result, StatdiffError};
pub use report::{ComparisonReport, OverallStatus, TestResult, TestStatus};
