//! The statistical tests run on each column pair
//!
//! Every test returns a [`TestResult`]; insufficient data is a SKIP with a
//! `reason`, never a failure.

use crate::config::Thresholds;
use crate::distributions::{chi_square_sf, ks_two_sample, student_t_two_sided};
use crate::error::StatdiffError;
use crate::report::{TestResult, TestStatus};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

/// Proportion used for a category missing on one side
const PSI_EPSILON: f64 = 0.0001;

/// Null and total row counts for one column on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullCounts {
    pub nulls: u64,
    pub total: u64,
}

impl NullCounts {
    pub fn pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.nulls as f64 / self.total as f64 * 100.0
        }
    }
}

pub struct StatisticalTestSuite {
    thresholds: Thresholds,
    min_sample_size: usize,
}

impl StatisticalTestSuite {
    pub fn new(thresholds: &Thresholds, min_sample_size: usize) -> Self {
        Self {
            thresholds: thresholds.clone(),
            min_sample_size,
        }
    }

    /// Ratio-based row count comparison
    pub fn row_count(&self, source_count: u64, dest_count: u64) -> TestResult {
        let tolerance = self.thresholds.row_count_tolerance_pct;
        let threshold_ratio = 1.0 - tolerance / 100.0;
        let difference = dest_count as i64 - source_count as i64;

        let (status, ratio, difference_pct) = if source_count == 0 {
            let status = if dest_count == 0 {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            };
            let pct = if dest_count == 0 { 0.0 } else { 100.0 };
            (status, if dest_count == 0 { 1.0 } else { 0.0 }, pct)
        } else {
            let ratio = dest_count as f64 / source_count as f64;
            let status = if dest_count == source_count {
                TestStatus::Pass
            } else if ratio >= threshold_ratio {
                TestStatus::Warning
            } else {
                TestStatus::Fail
            };
            (
                status,
                ratio,
                (difference as f64 / source_count as f64 * 100.0).abs(),
            )
        };

        TestResult::new("row_count", None, status)
            .with_detail("source_count", source_count)
            .with_detail("dest_count", dest_count)
            .with_detail("difference", difference)
            .with_detail("difference_pct", round(difference_pct, 3))
            .with_detail("ratio", round(ratio, 6))
            .with_detail("threshold_pct", tolerance)
            .with_detail("threshold_ratio", round(threshold_ratio, 6))
    }

    pub fn null_rate(&self, column: &str, source: NullCounts, dest: NullCounts) -> TestResult {
        let tolerance = self.thresholds.null_rate_tolerance_pct;
        let (source_pct, dest_pct) = (source.pct(), dest.pct());
        let difference = (dest_pct - source_pct).abs();
        let status = if difference <= tolerance {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        };

        TestResult::new("null_rate", Some(column), status)
            .with_detail("source_null_pct", round(source_pct, 2))
            .with_detail("dest_null_pct", round(dest_pct, 2))
            .with_detail("difference_pct", round(difference, 2))
            .with_detail("threshold_pct", tolerance)
            .with_detail("source_total_rows", source.total)
            .with_detail("dest_total_rows", dest.total)
            .with_detail("source_null_rows", source.nulls)
            .with_detail("dest_null_rows", dest.nulls)
    }

    /// Two-sample Kolmogorov-Smirnov on NaN-stripped samples
    pub fn ks_test(&self, column: &str, source: &[f64], dest: &[f64]) -> TestResult {
        let source = strip_nan(source);
        let dest = strip_nan(dest);
        if let Some(skip) = self.sample_gate("ks_test", column, source.len(), dest.len()) {
            return skip;
        }

        let (statistic, p_value) = ks_two_sample(&source, &dest);
        let threshold = self.thresholds.ks_test_pvalue;
        let status = pass_if(p_value >= threshold);

        TestResult::new("ks_test", Some(column), status)
            .with_detail("statistic", round(statistic, 4))
            .with_detail("p_value", p_value)
            .with_detail("threshold", threshold)
            .with_detail(
                "interpretation",
                interpretation(status, "Distributions match", "Distributions differ significantly"),
            )
            .with_detail("source_sample_size", source.len())
            .with_detail("dest_sample_size", dest.len())
    }

    /// Student's two-sample t-test with pooled variance
    pub fn t_test(&self, column: &str, source: &[f64], dest: &[f64]) -> TestResult {
        let source = strip_nan(source);
        let dest = strip_nan(dest);
        if let Some(skip) = self.sample_gate("t_test", column, source.len(), dest.len()) {
            return skip;
        }
        if source.len() + dest.len() < 3 {
            return TestResult::skip("t_test", Some(column), "Not enough values for a variance estimate");
        }

        let (n1, n2) = (source.len() as f64, dest.len() as f64);
        let (mean1, var1) = mean_variance(&source);
        let (mean2, var2) = mean_variance(&dest);
        let df = n1 + n2 - 2.0;
        let pooled = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / df;
        let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();

        let (statistic, p_value) = if se == 0.0 || !se.is_finite() {
            if mean1 == mean2 {
                (0.0, 1.0)
            } else {
                (f64::INFINITY.copysign(mean1 - mean2), 0.0)
            }
        } else {
            let t = (mean1 - mean2) / se;
            (t, student_t_two_sided(t, df))
        };

        let threshold = self.thresholds.t_test_pvalue;
        let status = pass_if(p_value >= threshold);

        let result = TestResult::new("t_test", Some(column), status);
        let result = if statistic.is_finite() {
            result.with_detail("statistic", round(statistic, 4))
        } else {
            result.with_detail("statistic", if statistic > 0.0 { "inf" } else { "-inf" })
        };
        result
            .with_detail("source_mean", round(mean1, 4))
            .with_detail("dest_mean", round(mean2, 4))
            .with_detail("difference", round(mean2 - mean1, 4))
            .with_detail("degrees_of_freedom", df)
            .with_detail("p_value", p_value)
            .with_detail("threshold", threshold)
            .with_detail(
                "interpretation",
                interpretation(status, "Means match", "Means differ significantly"),
            )
    }

    /// Population Stability Index over two value histograms
    pub fn psi(&self, column: &str, source: &[(String, u64)], dest: &[(String, u64)]) -> TestResult {
        if source.is_empty() || dest.is_empty() {
            return TestResult::skip("psi", Some(column), "No data in one or both distributions");
        }
        if let Some(skip) = self.sample_gate("psi", column, total(source) as usize, total(dest) as usize) {
            return skip;
        }

        let value = psi_value(source, dest);
        let (status, text) = if value < self.thresholds.psi_threshold {
            (TestStatus::Pass, "No significant change")
        } else if value < self.thresholds.psi_fail_threshold {
            (TestStatus::Warning, "Moderate change detected")
        } else {
            (TestStatus::Fail, "Significant change detected")
        };

        TestResult::new("psi", Some(column), status)
            .with_detail("psi_value", round(value, 6))
            .with_detail("threshold", self.thresholds.psi_threshold)
            .with_detail("fail_threshold", self.thresholds.psi_fail_threshold)
            .with_detail("interpretation", text)
            .with_detail("source_cardinality", source.len())
            .with_detail("dest_cardinality", dest.len())
    }

    /// Chi-square test of independence on the k x 2 contingency table
    pub fn chi_square(&self, column: &str, source: &[(String, u64)], dest: &[(String, u64)]) -> TestResult {
        if source.is_empty() || dest.is_empty() {
            return TestResult::skip("chi_square", Some(column), "No data");
        }
        if let Some(skip) = self.sample_gate("chi_square", column, total(source) as usize, total(dest) as usize) {
            return skip;
        }

        let mut table: BTreeMap<&str, [f64; 2]> = BTreeMap::new();
        for (value, count) in source {
            table.entry(value.as_str()).or_insert([0.0, 0.0])[0] += *count as f64;
        }
        for (value, count) in dest {
            table.entry(value.as_str()).or_insert([0.0, 0.0])[1] += *count as f64;
        }

        let categories = table.len();
        let dof = categories.saturating_sub(1);
        let (statistic, p_value) = if dof == 0 {
            (0.0, 1.0)
        } else {
            let col_totals = [total(source) as f64, total(dest) as f64];
            let grand = col_totals[0] + col_totals[1];
            let yates = dof == 1;
            let mut statistic = 0.0;
            for row in table.values() {
                let row_total = row[0] + row[1];
                for (observed, col_total) in row.iter().zip(col_totals) {
                    let expected = row_total * col_total / grand;
                    if expected == 0.0 {
                        continue;
                    }
                    let mut diff = (observed - expected).abs();
                    if yates {
                        diff -= diff.min(0.5);
                    }
                    statistic += diff * diff / expected;
                }
            }
            (statistic, chi_square_sf(statistic, dof as f64))
        };

        let threshold = self.thresholds.chi_square_pvalue;
        let status = pass_if(p_value >= threshold);

        TestResult::new("chi_square", Some(column), status)
            .with_detail("chi2_statistic", round(statistic, 4))
            .with_detail("p_value", p_value)
            .with_detail("degrees_of_freedom", dof)
            .with_detail("threshold", threshold)
            .with_detail("categories", categories)
            .with_detail(
                "interpretation",
                interpretation(status, "Distributions match", "Distributions differ significantly"),
            )
    }

    /// Min and max must each agree within one day
    pub fn date_range(&self, column: &str, source: &[NaiveDateTime], dest: &[NaiveDateTime]) -> TestResult {
        let bounds = |dates: &[NaiveDateTime]| Some((*dates.iter().min()?, *dates.iter().max()?));
        let (Some((src_min, src_max)), Some((dst_min, dst_max))) = (bounds(source), bounds(dest)) else {
            return TestResult::skip("date_range", Some(column), "No valid dates in one or both columns");
        };

        let within_a_day = |a: NaiveDateTime, b: NaiveDateTime| {
            (a - b).num_seconds().abs() <= Duration::days(1).num_seconds()
        };
        let min_match = within_a_day(src_min, dst_min);
        let max_match = within_a_day(src_max, dst_max);
        let status = pass_if(min_match && max_match);

        TestResult::new("date_range", Some(column), status)
            .with_detail("source_min", src_min.to_string())
            .with_detail("source_max", src_max.to_string())
            .with_detail("dest_min", dst_min.to_string())
            .with_detail("dest_max", dst_max.to_string())
            .with_detail("source_span_days", (src_max - src_min).num_days())
            .with_detail("dest_span_days", (dst_max - dst_min).num_days())
            .with_detail(
                "interpretation",
                interpretation(status, "Date ranges match", "Date ranges differ"),
            )
    }

    /// Visible SKIP for a categorical test above its cardinality ceiling
    pub fn cardinality_skip(test_name: &str, column: &str, cardinality: u64, ceiling: u64) -> TestResult {
        TestResult::skip(
            test_name,
            Some(column),
            format!("Cardinality {} exceeds limit {}", cardinality, ceiling),
        )
        .with_detail("cardinality", cardinality)
        .with_detail("max_cardinality", ceiling)
    }

    fn sample_gate(&self, test_name: &str, column: &str, source: usize, dest: usize) -> Option<TestResult> {
        if source >= self.min_sample_size && dest >= self.min_sample_size {
            return None;
        }
        log::debug!(
            "Skipping {} on {}: {} / {} values, {} required",
            test_name,
            column,
            source,
            dest,
            self.min_sample_size
        );
        let error = StatdiffError::InsufficientSample {
            actual: source.min(dest),
            required: self.min_sample_size,
        };
        Some(
            TestResult::from_error(test_name, Some(column), &error)
                .with_detail("source_size", source)
                .with_detail("dest_size", dest),
        )
    }
}

/// PSI between two histograms; categories absent on one side use a small epsilon
pub fn psi_value(source: &[(String, u64)], dest: &[(String, u64)]) -> f64 {
    let proportions = |hist: &[(String, u64)]| -> BTreeMap<String, f64> {
        let sum = total(hist) as f64;
        let mut map = BTreeMap::new();
        if sum == 0.0 {
            return map;
        }
        for (value, count) in hist {
            *map.entry(value.clone()).or_insert(0.0) += *count as f64 / sum;
        }
        map
    };
    let src = proportions(source);
    let dst = proportions(dest);

    let mut keys: Vec<&String> = src.keys().chain(dst.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .map(|key| {
            let s = src.get(key).copied().filter(|p| *p > 0.0).unwrap_or(PSI_EPSILON);
            let d = dst.get(key).copied().filter(|p| *p > 0.0).unwrap_or(PSI_EPSILON);
            (d - s) * (d / s).ln()
        })
        .sum()
}

fn total(hist: &[(String, u64)]) -> u64 {
    hist.iter().map(|(_, c)| c).sum()
}

fn strip_nan(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn mean_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

fn pass_if(condition: bool) -> TestStatus {
    if condition {
        TestStatus::Pass
    } else {
        TestStatus::Fail
    }
}

fn interpretation(status: TestStatus, pass: &str, fail: &str) -> String {
    let text = if status == TestStatus::Pass { pass } else { fail };
    text.to_string()
}

fn round(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
