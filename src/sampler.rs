//! Extraction-query construction for one side of a comparison
//!
//! The sampler only builds SQL. Strategy decisions that need data (the row
//! count for percentage sampling, the schema for hash-column detection) are
//! passed in by the caller, so the same inputs always produce the same query.

use crate::dialect::Dialect;
use crate::schema::{ColumnDescriptor, SemanticType, TableSchema};
use serde::{Deserialize, Serialize};

/// Column names accepted as-is for hash sampling, in priority order
const HASH_COLUMN_NAMES: &[&str] = &["id", "key", "pk", "primary_key", "row_id", "rowid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Full scan
    None,
    /// First `target_size` rows
    Fixed,
    /// `target_pct` of the table, clamped to `[min_size, max_size]`
    Percentage,
    /// Deterministic bucket of a hashed column
    #[default]
    Hash,
    /// Shuffle and limit; slow on large tables
    Random,
}

impl SamplingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fixed => "fixed",
            Self::Percentage => "percentage",
            Self::Hash => "hash",
            Self::Random => "random",
        }
    }
}

impl std::fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub strategy: SamplingStrategy,
    pub target_size: u64,
    pub target_pct: f64,
    pub min_size: u64,
    pub max_size: u64,
    pub seed: u64,
    pub hash_column: Option<String>,
}

impl SampleSpec {
    /// Rows wanted from a table of `total` rows
    pub fn percentage_size(&self, total: u64) -> u64 {
        let wanted = (total as f64 * self.target_pct / 100.0).round() as u64;
        wanted.clamp(self.min_size, self.max_size.max(self.min_size))
    }
}

/// What was actually done on one side, kept in the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedSampling {
    pub requested: SamplingStrategy,
    pub applied: SamplingStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_column: Option<String>,
    /// blake3 of the sampling predicate, to compare runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Rows that ended up in the local cache
    pub rows_cached: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// A built extraction query and how it samples
#[derive(Debug, Clone, PartialEq)]
pub struct SampleQuery {
    pub sql: String,
    /// WHERE clause without the keyword, if any
    pub predicate: Option<String>,
    pub sampling: AppliedSampling,
}

pub struct Sampler<'a> {
    dialect: &'a Dialect,
    spec: &'a SampleSpec,
}

impl<'a> Sampler<'a> {
    pub fn new(dialect: &'a Dialect, spec: &'a SampleSpec) -> Self {
        Self { dialect, spec }
    }

    /// Build the extraction query.
    ///
    /// `select_list` holds ready select expressions; `total_rows` is the
    /// filtered row count when known.
    pub fn build_query(
        &self,
        table: &str,
        schema: &TableSchema,
        select_list: &[String],
        filter: Option<&str>,
        total_rows: Option<u64>,
    ) -> SampleQuery {
        let requested = self.spec.strategy;
        match requested {
            SamplingStrategy::None => self.assemble(table, select_list, filter, None, false, None, requested, requested),

            SamplingStrategy::Fixed => self.assemble(
                table,
                select_list,
                filter,
                None,
                false,
                Some(self.spec.target_size),
                requested,
                requested,
            ),

            SamplingStrategy::Random => self.random_query(table, select_list, filter, total_rows, None),

            SamplingStrategy::Percentage => match total_rows {
                Some(total) => {
                    let size = self.spec.percentage_size(total);
                    if size >= total {
                        let mut query = self.assemble(
                            table,
                            select_list,
                            filter,
                            None,
                            false,
                            None,
                            requested,
                            SamplingStrategy::None,
                        );
                        query.sampling.fallback_reason =
                            Some(format!("sample size {} covers all {} rows", size, total));
                        query
                    } else {
                        self.assemble(
                            table,
                            select_list,
                            filter,
                            None,
                            true,
                            Some(size),
                            requested,
                            requested,
                        )
                    }
                }
                None => self.random_query(
                    table,
                    select_list,
                    filter,
                    None,
                    Some("row count unavailable".to_string()),
                ),
            },

            SamplingStrategy::Hash => match self.hash_column(schema) {
                Some(column) => {
                    let predicate = self.hash_predicate(&column.name);
                    let size = total_rows
                        .map(|t| self.spec.percentage_size(t))
                        .unwrap_or(self.spec.max_size);
                    let mut query = self.assemble(
                        table,
                        select_list,
                        filter,
                        Some(predicate),
                        false,
                        Some(size),
                        requested,
                        requested,
                    );
                    query.sampling.hash_column = Some(column.name.clone());
                    query
                }
                None => self.random_query(
                    table,
                    select_list,
                    filter,
                    total_rows,
                    Some("no suitable hash column".to_string()),
                ),
            },
        }
    }

    /// Random-order query, used directly or as the fallback for hash sampling
    pub fn random_query(
        &self,
        table: &str,
        select_list: &[String],
        filter: Option<&str>,
        total_rows: Option<u64>,
        fallback_reason: Option<String>,
    ) -> SampleQuery {
        let size = match (self.spec.strategy, total_rows) {
            (SamplingStrategy::Random | SamplingStrategy::Fixed, _) => self.spec.target_size,
            (_, Some(total)) => self.spec.percentage_size(total),
            (_, None) => self.spec.max_size,
        };
        if let Some(reason) = &fallback_reason {
            log::warn!(
                "[{}] Falling back to random sampling on {}: {}",
                self.dialect.name,
                table,
                reason
            );
        }
        let mut query = self.assemble(
            table,
            select_list,
            filter,
            None,
            true,
            Some(size),
            self.spec.strategy,
            SamplingStrategy::Random,
        );
        query.sampling.fallback_reason = fallback_reason;
        query
    }

    /// Bucket predicate for hash sampling; identical inputs give an identical string
    pub fn hash_predicate(&self, column_name: &str) -> String {
        let column_ref = self.dialect.quote_identifier(column_name);
        let bucket = self.dialect.hash_bucket(&column_ref);
        let seed = self.spec.seed % 100;
        let bucket = if seed == 0 {
            bucket
        } else {
            self.dialect.modulo(&format!("{} + {}", bucket, seed), 100)
        };
        format!("{} < {}", bucket, format_pct(self.spec.target_pct))
    }

    /// Configured hash column if usable, else the best auto-detected one
    pub fn hash_column<'s>(&self, schema: &'s TableSchema) -> Option<&'s ColumnDescriptor> {
        if let Some(configured) = &self.spec.hash_column {
            match schema.get(configured) {
                Some(column) if !column.is_binary() => return Some(column),
                Some(_) => log::warn!(
                    "[{}] Configured hash column '{}' is binary, auto-detecting instead",
                    self.dialect.name,
                    configured
                ),
                None => log::warn!(
                    "[{}] Configured hash column '{}' not found, auto-detecting instead",
                    self.dialect.name,
                    configured
                ),
            }
        }
        detect_hash_column(schema)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        table: &str,
        select_list: &[String],
        filter: Option<&str>,
        sampling_predicate: Option<String>,
        shuffle: bool,
        limit: Option<u64>,
        requested: SamplingStrategy,
        applied: SamplingStrategy,
    ) -> SampleQuery {
        let projection = if select_list.is_empty() {
            "*".to_string()
        } else {
            select_list.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", projection, table);

        let mut conditions = Vec::new();
        if let Some(predicate) = &sampling_predicate {
            conditions.push(predicate.clone());
        }
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            conditions.push(format!("({})", filter));
        }
        let predicate = if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        };
        if let Some(predicate) = &predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }

        if shuffle {
            sql.push_str(&format!(" ORDER BY {}", self.dialect.random_fn));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let predicate_fingerprint = sampling_predicate.as_deref().map(fingerprint);

        SampleQuery {
            sql,
            predicate,
            sampling: AppliedSampling {
                requested,
                applied,
                hash_column: None,
                predicate_fingerprint,
                limit,
                rows_cached: 0,
                fallback_reason: None,
            },
        }
    }
}

/// Pick a stable column to hash: well-known key names, then names containing
/// them, then the first integer or string column
pub fn detect_hash_column(schema: &TableSchema) -> Option<&ColumnDescriptor> {
    let candidates: Vec<&ColumnDescriptor> = schema.columns().filter(|c| !c.is_binary()).collect();

    for name in HASH_COLUMN_NAMES {
        if let Some(column) = candidates.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
            return Some(column);
        }
    }

    for name in HASH_COLUMN_NAMES {
        if let Some(column) = candidates
            .iter()
            .find(|c| c.name.to_lowercase().contains(name))
        {
            return Some(column);
        }
    }

    candidates.into_iter().find(|c| {
        let integer = c.semantic_type == SemanticType::Numerical && c.native_type.to_uppercase().contains("INT");
        let string = c.semantic_type == SemanticType::Categorical;
        integer || string
    })
}

fn fingerprint(predicate: &str) -> String {
    blake3::hash(predicate.as_bytes()).to_hex()[..16].to_string()
}

fn format_pct(pct: f64) -> String {
    if pct.fract() == 0.0 {
        format!("{}", pct as i64)
    } else {
        format!("{}", pct)
    }
}
