//! Phased orchestration of one source/destination comparison

use crate::cache::{CacheOutcome, CachedDataset, DroppedColumn, LocalStore, Side};
use crate::config::CompareConfig;
use crate::connector::{DataConnector, Value};
use crate::dialect::Dialect;
use crate::error::{Result, StatdiffError};
use crate::null_normalizer::{NullNormalizer, NullPattern};
use crate::progress::ProgressReporter;
use crate::report::{ComparisonReport, ReportBuilder, TestResult, TestStatus};
use crate::sampler::{Sampler, SamplingStrategy};
use crate::schema::{ColumnDescriptor, ColumnFamily, SchemaReconciler, TableSchema};
use crate::statistics::{NullCounts, StatisticalTestSuite};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a comparison run, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    RowCountCheck,
    SchemaCheck,
    Cache,
    AbortNoCommonColumns,
    PerColumnTests,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::RowCountCheck => "ROW_COUNT_CHECK",
            Self::SchemaCheck => "SCHEMA_CHECK",
            Self::Cache => "CACHE",
            Self::AbortNoCommonColumns => "ABORT_NO_COMMON_COLUMNS",
            Self::PerColumnTests => "PER_COLUMN_TESTS",
            Self::Finalize => "FINALIZE",
        };
        f.write_str(s)
    }
}

/// One calendar month of a date column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthFilter {
    pub column: String,
    pub year: i32,
    pub month: u32,
}

/// Per-run options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// SQL predicate applied verbatim to both sides (row counts, null rates, samples)
    pub filter: Option<String>,
    /// Month restriction, spelled in each side's own dialect
    pub month: Option<MonthFilter>,
    /// Restrict the per-column phase to these columns (case-insensitive)
    pub columns: Option<Vec<String>>,
}

impl CompareOptions {
    /// The row filter one side receives
    pub fn filter_for(&self, dialect: &Dialect) -> Option<String> {
        let raw = self
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let month = self
            .month
            .as_ref()
            .map(|m| dialect.month_filter(&m.column, m.year, m.month));
        match (raw, month) {
            (Some(raw), Some(month)) => Some(format!("({}) AND ({})", raw, month)),
            (raw, month) => raw.or(month),
        }
    }
}

/// Everything known about one side once the schema phase is done
struct SideContext<'c> {
    side: Side,
    connector: &'c dyn DataConnector,
    table: &'c str,
    schema: TableSchema,
    total_rows: Option<u64>,
    filter: Option<String>,
}

pub struct Comparator<'a> {
    source: &'a dyn DataConnector,
    dest: &'a dyn DataConnector,
    config: CompareConfig,
    suite: StatisticalTestSuite,
    progress: ProgressReporter,
}

impl<'a> Comparator<'a> {
    pub fn new(source: &'a dyn DataConnector, dest: &'a dyn DataConnector, config: CompareConfig) -> Self {
        let suite = StatisticalTestSuite::new(&config.thresholds, config.sampling.min_sample_size);
        Self {
            source,
            dest,
            config,
            suite,
            progress: ProgressReporter::new_minimal(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Run every phase and produce the finalized report.
    ///
    /// Only an unreachable backend is returned as an error; every later
    /// failure is recorded in the report.
    pub fn compare(
        &mut self,
        source_table: &str,
        dest_table: &str,
        options: &CompareOptions,
    ) -> Result<ComparisonReport> {
        let mut builder = ReportBuilder::new(source_table, dest_table);
        let source_filter = options.filter_for(self.source.dialect());
        let dest_filter = options.filter_for(self.dest.dialect());
        for (side, filter) in [(Side::Source, &source_filter), (Side::Dest, &dest_filter)] {
            if let Some(filter) = filter {
                builder.run.filters.insert(side.as_str().to_string(), filter.clone());
            }
        }

        builder.enter(Phase::Init);
        self.progress.phase("Connecting...");
        self.source.ping()?;
        self.dest.ping()?;
        log::info!(
            "Comparing {} ({}) with {} ({})",
            source_table,
            self.source.dialect().name,
            dest_table,
            self.dest.dialect().name
        );

        builder.enter(Phase::RowCountCheck);
        self.progress.phase("Counting rows...");
        let (source_total, dest_total) = self.row_count_check(
            &mut builder,
            (source_table, source_filter.as_deref()),
            (dest_table, dest_filter.as_deref()),
        );

        builder.enter(Phase::SchemaCheck);
        self.progress.phase("Comparing schemas...");
        let (source_schema, dest_schema) = match self.schema_check(&mut builder, source_table, dest_table) {
            Some(schemas) => schemas,
            None => return Ok(self.finish(builder)),
        };

        let common = SchemaReconciler::get_common_columns(&source_schema, &dest_schema);
        let columns = restrict_columns(common, options.columns.as_deref());
        if columns.is_empty() {
            let mismatch = StatdiffError::schema_mismatch(format!(
                "no common columns to test between {} and {}",
                source_table, dest_table
            ));
            log::warn!("{}", mismatch);
            builder.enter(Phase::AbortNoCommonColumns);
            return Ok(self.finish(builder));
        }

        let source = SideContext {
            side: Side::Source,
            connector: self.source,
            table: source_table,
            schema: source_schema,
            total_rows: source_total,
            filter: source_filter,
        };
        let dest = SideContext {
            side: Side::Dest,
            connector: self.dest,
            table: dest_table,
            schema: dest_schema,
            total_rows: dest_total,
            filter: dest_filter,
        };

        builder.enter(Phase::Cache);
        self.progress.phase("Caching samples...");
        let store = match LocalStore::open(&self.config.cache) {
            Ok(store) => store,
            Err(e) => {
                record_caching_failure(&mut builder, None, &e.to_string());
                return Ok(self.finish(builder));
            }
        };

        let outcome = self.cache(&mut builder, &store, &source, &dest, &columns);
        if let CacheOutcome::Failed { side, error } = &outcome {
            record_caching_failure(&mut builder, Some(*side), error);
            close_store(store);
            return Ok(self.finish(builder));
        }

        builder.enter(Phase::PerColumnTests);
        self.per_column_tests(&mut builder, &store, &outcome, &source, &dest);
        close_store(store);

        Ok(self.finish(builder))
    }

    fn finish(&mut self, builder: ReportBuilder) -> ComparisonReport {
        let report = builder.finalize(&self.config.thresholds.fdr_correction, self.config.verdict.tie_policy);
        self.progress.finish(&format!("{}", report.overall_status));
        report
    }

    fn row_count_check(
        &self,
        builder: &mut ReportBuilder,
        (source_table, source_filter): (&str, Option<&str>),
        (dest_table, dest_filter): (&str, Option<&str>),
    ) -> (Option<u64>, Option<u64>) {
        let counts = self
            .source
            .count_rows(source_table, source_filter)
            .and_then(|s| Ok((s, self.dest.count_rows(dest_table, dest_filter)?)));
        match counts {
            Ok((source_count, dest_count)) => {
                log::info!("Row counts: source={}, dest={}", source_count, dest_count);
                builder.push(self.suite.row_count(source_count, dest_count));
                (Some(source_count), Some(dest_count))
            }
            Err(e) => {
                log::error!("Row count check failed: {}", e);
                builder.push(TestResult::from_error("row_count", None, &e));
                (None, None)
            }
        }
    }

    fn schema_check(
        &self,
        builder: &mut ReportBuilder,
        source_table: &str,
        dest_table: &str,
    ) -> Option<(TableSchema, TableSchema)> {
        let schemas = self
            .source
            .get_table_schema(source_table)
            .and_then(|s| Ok((s, self.dest.get_table_schema(dest_table)?)));
        match schemas {
            Ok((source, dest)) => {
                let result = SchemaReconciler::compare_schemas(&source, &dest)
                    .with_detail("source_table", source_table)
                    .with_detail("dest_table", dest_table);
                if result.status == TestStatus::Fail {
                    let listed = |key: &str| result.details.get(key).and_then(|v| v.as_array()).map_or(0, Vec::len);
                    let mismatch = StatdiffError::schema_mismatch(format!(
                        "{} columns missing in {}, {} extra",
                        listed("missing_in_dest"),
                        dest_table,
                        listed("extra_in_dest")
                    ));
                    log::warn!("{}; testing common columns only", mismatch);
                }
                builder.push(result);
                Some((source, dest))
            }
            Err(e) => {
                log::error!("Schema check failed: {}", e);
                builder.push(TestResult::from_error("schema_comparison", None, &e));
                None
            }
        }
    }

    /// Materialize both sides into the local store
    fn cache(
        &self,
        builder: &mut ReportBuilder,
        store: &LocalStore,
        source: &SideContext<'_>,
        dest: &SideContext<'_>,
        columns: &[String],
    ) -> CacheOutcome {
        let source_dataset = match self.cache_side(builder, store, source, columns, None) {
            Ok(dataset) => dataset,
            Err(e) => {
                return CacheOutcome::Failed {
                    side: Side::Source,
                    error: e.to_string(),
                }
            }
        };

        // Hash both sides on the same column so the samples line up
        let source_hash_column = builder
            .run
            .sampling
            .get(Side::Source.as_str())
            .and_then(|s| s.hash_column.clone());
        match self.cache_side(builder, store, dest, columns, source_hash_column) {
            Ok(dest_dataset) => CacheOutcome::Ready {
                source: source_dataset,
                dest: dest_dataset,
            },
            Err(e) => CacheOutcome::Failed {
                side: Side::Dest,
                error: e.to_string(),
            },
        }
    }

    fn cache_side(
        &self,
        builder: &mut ReportBuilder,
        store: &LocalStore,
        ctx: &SideContext<'_>,
        columns: &[String],
        hash_column: Option<String>,
    ) -> Result<CachedDataset> {
        let filter = ctx.filter.as_deref();
        let dialect = ctx.connector.dialect();
        let normalizer = NullNormalizer::new(dialect, self.null_equivalents(ctx.side));

        let mut descriptors = Vec::new();
        let mut dropped = Vec::new();
        for name in columns {
            match ctx.schema.get(name) {
                Some(column) if column.is_binary() => {
                    log::warn!("[{}] Not caching binary column '{}'", ctx.side, column.name);
                    dropped.push(DroppedColumn::new(column.name.as_str(), "binary column"));
                }
                Some(column) => descriptors.push(column.clone()),
                None => {}
            }
        }
        if descriptors.is_empty() {
            return Err(StatdiffError::caching(format!(
                "no cacheable columns in {}",
                ctx.table
            )));
        }

        let select_list: Vec<String> = descriptors
            .iter()
            .map(|column| normalizer.transform_column(column).select_expr(dialect))
            .collect();

        let mut spec = self.config.sampling.sample_spec();
        if hash_column.is_some() {
            spec.hash_column = hash_column;
        }
        let sampler = Sampler::new(dialect, &spec);
        let query = sampler.build_query(ctx.table, &ctx.schema, &select_list, filter, ctx.total_rows);

        let (materialized, mut sampling) =
            match ctx
                .connector
                .cache_query(&query.sql, ctx.side.cache_table(), &descriptors, store)
            {
                Ok(materialized) => (materialized, query.sampling),
                Err(e) if query.sampling.applied == SamplingStrategy::Hash => {
                    let fallback = sampler.random_query(
                        ctx.table,
                        &select_list,
                        filter,
                        ctx.total_rows,
                        Some(format!("hash sampling failed: {}", e)),
                    );
                    let materialized = ctx.connector.cache_query(
                        &fallback.sql,
                        ctx.side.cache_table(),
                        &descriptors,
                        store,
                    )?;
                    (materialized, fallback.sampling)
                }
                Err(e) => return Err(e),
            };

        sampling.rows_cached = materialized.row_count;
        log::info!(
            "Cached {} rows from {} ({} sampling)",
            materialized.row_count,
            ctx.table,
            sampling.applied
        );
        let dataset = CachedDataset::new(ctx.side, materialized);
        dropped.extend(dataset.dropped.iter().cloned());

        builder.run.sampling.insert(ctx.side.as_str().to_string(), sampling);
        if !dropped.is_empty() {
            builder.run.dropped_columns.insert(ctx.side.as_str().to_string(), dropped);
        }
        Ok(dataset)
    }

    fn per_column_tests(
        &mut self,
        builder: &mut ReportBuilder,
        store: &LocalStore,
        outcome: &CacheOutcome,
        source: &SideContext<'_>,
        dest: &SideContext<'_>,
    ) {
        let CacheOutcome::Ready {
            source: source_cache,
            dest: dest_cache,
        } = outcome
        else {
            return;
        };

        let columns: Vec<(&ColumnDescriptor, &ColumnDescriptor)> = outcome
            .retained_columns()
            .iter()
            .filter_map(|name| Some((source.schema.get(name)?, dest.schema.get(name)?)))
            .collect();
        builder.run.columns_tested = columns.len();
        self.progress.start_columns(columns.len() as u64);

        let tested = TableSchema::new(columns.iter().map(|(s, _)| (*s).clone()).collect());
        let classification = SchemaReconciler::classify_columns(&tested);

        let source_nulls = self.null_counts(source, columns.iter().map(|(s, _)| *s));
        let dest_nulls = self.null_counts(dest, columns.iter().map(|(_, d)| *d));

        for (index, (column, _)) in columns.iter().enumerate() {
            let name = column.name.as_str();
            let canonical = column.canonical_name();

            let null_rate = match (&source_nulls, &dest_nulls) {
                (Ok(src), Ok(dst)) => self.suite.null_rate(name, src[index], dst[index]),
                (Err(e), _) | (_, Err(e)) => TestResult::from_error("null_rate", Some(name), e),
            };
            push_logged(builder, null_rate);

            let results = match classification.family_of(name) {
                Some(ColumnFamily::Numerical) => {
                    self.numerical_tests(store, source_cache, dest_cache, name, &canonical)
                }
                Some(ColumnFamily::Categorical) => {
                    self.categorical_tests(store, source_cache, dest_cache, name, &canonical)
                }
                Some(ColumnFamily::Temporal) => {
                    vec![self.temporal_test(store, source_cache, dest_cache, name, &canonical)]
                }
                Some(ColumnFamily::Other) | None => Vec::new(),
            };
            for result in results {
                push_logged(builder, result);
            }
            self.progress.column_done(name);
        }
    }

    /// One batched aggregate per side: total rows plus a null count per column
    fn null_counts<'c>(
        &self,
        ctx: &SideContext<'_>,
        columns: impl Iterator<Item = &'c ColumnDescriptor>,
    ) -> Result<Vec<NullCounts>> {
        let dialect = ctx.connector.dialect();
        let normalizer = NullNormalizer::new(dialect, self.null_equivalents(ctx.side));

        let mut select = vec!["COUNT(*) AS n_total".to_string()];
        for (i, column) in columns.enumerate() {
            let expr = normalizer.transform_column(column).value_expr;
            select.push(format!(
                "CAST(SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END) AS BIGINT) AS n{}",
                expr, i
            ));
        }
        let mut sql = format!("SELECT {} FROM {}", select.join(", "), ctx.table);
        if let Some(filter) = &ctx.filter {
            sql.push_str(&format!(" WHERE ({})", filter));
        }

        let table = ctx.connector.execute_query(&sql)?;
        let row = table
            .rows
            .first()
            .ok_or_else(|| StatdiffError::query(format!("Null count query returned no rows: {}", sql)))?;
        let count = |value: Option<&Value>| value.and_then(Value::as_i64).unwrap_or(0).max(0) as u64;
        let total = count(row.first());
        Ok((1..select.len())
            .map(|i| NullCounts {
                nulls: count(row.get(i)),
                total,
            })
            .collect())
    }

    fn numerical_tests(
        &self,
        store: &LocalStore,
        source: &CachedDataset,
        dest: &CachedDataset,
        name: &str,
        canonical: &str,
    ) -> Vec<TestResult> {
        let values = store
            .numeric_values(&source.table_name, canonical)
            .and_then(|s| Ok((s, store.numeric_values(&dest.table_name, canonical)?)));
        match values {
            Ok((src, dst)) => vec![self.suite.ks_test(name, &src, &dst), self.suite.t_test(name, &src, &dst)],
            Err(e) => vec![
                TestResult::from_error("ks_test", Some(name), &e),
                TestResult::from_error("t_test", Some(name), &e),
            ],
        }
    }

    fn categorical_tests(
        &self,
        store: &LocalStore,
        source: &CachedDataset,
        dest: &CachedDataset,
        name: &str,
        canonical: &str,
    ) -> Vec<TestResult> {
        let psi_ceiling = self.config.categorical.max_cardinality_for_psi;
        let chi_ceiling = self.config.categorical.max_cardinality_for_chi_square;

        let cardinality = match store.distinct_count(&source.table_name, canonical) {
            Ok(cardinality) => cardinality,
            Err(e) => {
                return vec![
                    TestResult::from_error("psi", Some(name), &e),
                    TestResult::from_error("chi_square", Some(name), &e),
                ]
            }
        };
        if cardinality > psi_ceiling {
            log::debug!("Skipping categorical tests on {}: {} distinct values", name, cardinality);
            return vec![
                StatisticalTestSuite::cardinality_skip("psi", name, cardinality, psi_ceiling),
                StatisticalTestSuite::cardinality_skip("chi_square", name, cardinality, chi_ceiling),
            ];
        }

        let histograms = store
            .value_counts(&source.table_name, canonical)
            .and_then(|s| Ok((s, store.value_counts(&dest.table_name, canonical)?)));
        let (src, dst) = match histograms {
            Ok(histograms) => histograms,
            Err(e) => {
                return vec![
                    TestResult::from_error("psi", Some(name), &e),
                    TestResult::from_error("chi_square", Some(name), &e),
                ]
            }
        };

        let chi_square = if cardinality > chi_ceiling {
            StatisticalTestSuite::cardinality_skip("chi_square", name, cardinality, chi_ceiling)
        } else {
            self.suite.chi_square(name, &src, &dst)
        };
        vec![self.suite.psi(name, &src, &dst), chi_square]
    }

    fn temporal_test(
        &self,
        store: &LocalStore,
        source: &CachedDataset,
        dest: &CachedDataset,
        name: &str,
        canonical: &str,
    ) -> TestResult {
        let dates = store
            .timestamps(&source.table_name, canonical)
            .and_then(|s| Ok((s, store.timestamps(&dest.table_name, canonical)?)));
        match dates {
            Ok((src, dst)) => self.suite.date_range(name, &src, &dst),
            Err(e) => TestResult::from_error("date_range", Some(name), &e),
        }
    }

    fn null_equivalents(&self, side: Side) -> &[NullPattern] {
        match side {
            Side::Source => &self.config.null_equivalents.source,
            Side::Dest => &self.config.null_equivalents.dest,
        }
    }
}

/// Keep only the common columns the caller asked for, if it asked
fn restrict_columns(common: Vec<String>, requested: Option<&[String]>) -> Vec<String> {
    let Some(requested) = requested else {
        return common;
    };
    for name in requested {
        if !common.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            log::warn!("Requested column '{}' is not present on both sides", name);
        }
    }
    common
        .into_iter()
        .filter(|c| requested.iter().any(|r| r.eq_ignore_ascii_case(c)))
        .collect()
}

/// The caching phase failed: remember why and surface it as an ERROR result
fn record_caching_failure(builder: &mut ReportBuilder, side: Option<Side>, error: &str) {
    let message = match side {
        Some(side) => format!("{}: {}", side, error),
        None => error.to_string(),
    };
    log::error!("Caching failed: {}", message);
    let mut result = TestResult::error("cache", None, &message);
    if let Some(side) = side {
        result = result.with_detail("side", side.as_str());
    }
    builder.push(result);
    builder.run.caching_error = Some(message);
}

fn push_logged(builder: &mut ReportBuilder, result: TestResult) {
    if result.status == TestStatus::Error {
        log::error!(
            "{} on {} errored: {}",
            result.test_name,
            result.column.as_deref().unwrap_or("-"),
            result.details.get("error").and_then(|v| v.as_str()).unwrap_or("unknown")
        );
    }
    builder.push(result);
}

fn close_store(store: LocalStore) {
    if let Err(e) = store.close() {
        log::warn!("{}", e);
    }
}
