//! Test results, the comparison report and the overall verdict

use crate::cache::DroppedColumn;
use crate::comparator::Phase;
use crate::config::FdrConfig;
use crate::correction;
use crate::error::StatdiffError;
use crate::sampler::AppliedSampling;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of a single test. Closed set: nothing else is ever reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Warning,
    Skip,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warning => "WARNING",
            Self::Skip => "SKIP",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a whole comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    Warning,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warning => "WARNING",
        };
        f.write_str(s)
    }
}

/// What an evenly split run resolves to when no warnings were raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiePolicy {
    #[default]
    Pass,
    Warning,
    Fail,
}

/// One test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub status: TestStatus,
    #[serde(default)]
    pub details: IndexMap<String, Value>,
}

impl TestResult {
    pub fn new(test_name: impl Into<String>, column: Option<&str>, status: TestStatus) -> Self {
        Self {
            test_name: test_name.into(),
            column: column.map(str::to_string),
            status,
            details: IndexMap::new(),
        }
    }

    /// SKIP with a `reason`
    pub fn skip(test_name: &str, column: Option<&str>, reason: impl Into<String>) -> Self {
        Self::new(test_name, column, TestStatus::Skip).with_detail("reason", reason.into())
    }

    /// ERROR with the failure message under `error`
    pub fn error(test_name: &str, column: Option<&str>, error: impl std::fmt::Display) -> Self {
        Self::new(test_name, column, TestStatus::Error).with_detail("error", error.to_string())
    }

    /// Result for a test that could not produce a verdict; a too-small
    /// sample is a SKIP, anything else an ERROR
    pub fn from_error(test_name: &str, column: Option<&str>, error: &StatdiffError) -> Self {
        match error {
            StatdiffError::InsufficientSample { actual, required } => Self::skip(test_name, column, error.to_string())
                .with_detail("available", *actual)
                .with_detail("min_required", *required),
            _ => Self::error(test_name, column, error),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn p_value(&self) -> Option<f64> {
        self.details.get("p_value").and_then(Value::as_f64)
    }
}

/// Counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_tests: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Self {
            total_tests: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                TestStatus::Pass => summary.passed += 1,
                TestStatus::Warning => summary.warnings += 1,
                TestStatus::Fail => summary.failed += 1,
                TestStatus::Skip => summary.skipped += 1,
                TestStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    /// Tests that count towards pass and fail rates
    pub fn decided(&self) -> usize {
        self.total_tests - self.skipped
    }
}

/// Run bookkeeping attached to every report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub phases: Vec<Phase>,
    /// Row filter as sent to each side, in that side's dialect
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub filters: IndexMap<String, String>,
    #[serde(default)]
    pub sampling: IndexMap<String, AppliedSampling>,
    #[serde(default)]
    pub dropped_columns: IndexMap<String, Vec<DroppedColumn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching_error: Option<String>,
    pub columns_tested: usize,
}

/// Finalized outcome of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub source_table: String,
    pub dest_table: String,
    pub timestamp: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub summary: Summary,
    pub tests: Vec<TestResult>,
    pub run: RunMetadata,
}

impl ComparisonReport {
    pub fn find(&self, test_name: &str, column: Option<&str>) -> Option<&TestResult> {
        self.tests
            .iter()
            .find(|t| t.test_name == test_name && t.column.as_deref() == column)
    }

    pub fn failed_tests(&self) -> impl Iterator<Item = &TestResult> {
        self.tests.iter().filter(|t| t.status == TestStatus::Fail)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates results during a run; [`ReportBuilder::finalize`] consumes it,
/// so a run can only ever produce one report
#[derive(Debug)]
pub struct ReportBuilder {
    source_table: String,
    dest_table: String,
    timestamp: DateTime<Utc>,
    tests: Vec<TestResult>,
    pub run: RunMetadata,
}

impl ReportBuilder {
    pub fn new(source_table: &str, dest_table: &str) -> Self {
        Self {
            source_table: source_table.to_string(),
            dest_table: dest_table.to_string(),
            timestamp: Utc::now(),
            tests: Vec::new(),
            run: RunMetadata {
                run_id: Uuid::new_v4(),
                ..RunMetadata::default()
            },
        }
    }

    pub fn push(&mut self, result: TestResult) {
        self.tests.push(result);
    }

    pub fn enter(&mut self, phase: Phase) {
        log::info!("Phase: {}", phase);
        self.run.phases.push(phase);
    }

    /// Apply FDR correction once, summarize and derive the verdict
    pub fn finalize(mut self, fdr: &FdrConfig, tie_policy: TiePolicy) -> ComparisonReport {
        self.enter(Phase::Finalize);

        let tests = if fdr.enabled {
            correction::correct(self.tests, fdr)
        } else {
            self.tests
        };

        let summary = Summary::from_results(&tests);
        let overall_status = overall_status(&tests, &summary, tie_policy);
        log::info!(
            "Comparison complete: {} ({}/{} passed)",
            overall_status,
            summary.passed,
            summary.total_tests
        );

        ComparisonReport {
            source_table: self.source_table,
            dest_table: self.dest_table,
            timestamp: self.timestamp,
            overall_status,
            summary,
            tests,
            run: self.run,
        }
    }
}

/// Row-count failure overrides everything; otherwise a majority over the
/// results that were actually decided (SKIPs excluded)
pub fn overall_status(tests: &[TestResult], summary: &Summary, tie_policy: TiePolicy) -> OverallStatus {
    let row_count_failed = tests
        .iter()
        .any(|t| t.test_name == "row_count" && t.status == TestStatus::Fail);
    if row_count_failed {
        return OverallStatus::Fail;
    }

    let decided = summary.decided();
    let (pass_rate, fail_rate) = if decided > 0 {
        (
            summary.passed as f64 / decided as f64 * 100.0,
            summary.failed as f64 / decided as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    if pass_rate > 50.0 {
        OverallStatus::Pass
    } else if fail_rate > 50.0 {
        OverallStatus::Fail
    } else if summary.warnings > 0 {
        OverallStatus::Warning
    } else {
        match tie_policy {
            TiePolicy::Pass => OverallStatus::Pass,
            TiePolicy::Warning => OverallStatus::Warning,
            TiePolicy::Fail => OverallStatus::Fail,
        }
    }
}
