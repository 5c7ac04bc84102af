//! Output formatting utilities

use crate::error::Result;
use crate::report::{ComparisonReport, OverallStatus, TestResult, TestStatus};
use serde_json::Value;
use std::path::Path;

/// Pretty printer for comparison reports
pub struct PrettyPrinter;

impl PrettyPrinter {
    pub fn print_report(report: &ComparisonReport) {
        println!(
            "{} {} → {}: {}",
            overall_icon(report.overall_status),
            report.source_table,
            report.dest_table,
            report.overall_status
        );

        let summary = &report.summary;
        println!(
            "├─ Tests: {} ({} passed, {} warnings, {} failed, {} skipped, {} errors)",
            summary.total_tests,
            summary.passed,
            summary.warnings,
            summary.failed,
            summary.skipped,
            summary.errors
        );

        for (side, sampling) in &report.run.sampling {
            let mut line = format!(
                "├─ Sampling ({}): {} rows via {}",
                side, sampling.rows_cached, sampling.applied
            );
            if let Some(reason) = &sampling.fallback_reason {
                line.push_str(&format!(" ({})", reason));
            }
            println!("{}", line);
        }
        for (side, dropped) in &report.run.dropped_columns {
            let names: Vec<&str> = dropped.iter().map(|d| d.name.as_str()).collect();
            println!("├─ Dropped ({}): {}", side, names.join(", "));
        }
        if let Some(error) = &report.run.caching_error {
            println!("├─ ❌ Caching failed: {}", error);
        }

        let table_tests: Vec<&TestResult> = report.tests.iter().filter(|t| t.column.is_none()).collect();
        for test in &table_tests {
            println!("├─ {} {}{}", status_icon(test.status), test.test_name, brief(test));
        }

        let mut columns: Vec<&str> = Vec::new();
        for test in &report.tests {
            if let Some(column) = test.column.as_deref() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }

        if columns.is_empty() {
            println!("└─ No column tests");
            return;
        }
        println!("└─ Columns: {}", columns.len());
        for (i, column) in columns.iter().enumerate() {
            let last_column = i == columns.len() - 1;
            let (marker, indent) = if last_column {
                ("└─", "   ")
            } else {
                ("├─", "│  ")
            };
            println!("   {} {}", marker, column);

            let tests: Vec<&TestResult> = report
                .tests
                .iter()
                .filter(|t| t.column.as_deref() == Some(column))
                .collect();
            for (j, test) in tests.iter().enumerate() {
                let test_marker = if j == tests.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {}{} {} {}{}",
                    indent,
                    test_marker,
                    status_icon(test.status),
                    test.test_name,
                    brief(test)
                );
            }
        }
    }

    /// One line per failed test, for quick scanning
    pub fn print_failures(report: &ComparisonReport) {
        let failed: Vec<&TestResult> = report.failed_tests().collect();
        if failed.is_empty() {
            return;
        }
        println!();
        println!("🟡 Failed tests:");
        for test in failed {
            println!(
                "  {} {}{}",
                test.test_name,
                test.column.as_deref().map(|c| format!("[{}]", c)).unwrap_or_default(),
                brief(test)
            );
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Write the report to `path`, creating parent directories
    pub fn write_report(report: &ComparisonReport, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, report.to_json_pretty()?)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

fn overall_icon(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Pass => "✅",
        OverallStatus::Warning => "⚠️",
        OverallStatus::Fail => "❌",
    }
}

fn status_icon(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "✅",
        TestStatus::Warning => "⚠️",
        TestStatus::Fail => "❌",
        TestStatus::Skip => "⏭️",
        TestStatus::Error => "💥",
    }
}

/// Short parenthesized detail for a test line
fn brief(test: &TestResult) -> String {
    let detail = |key: &str| test.details.get(key);
    let text = match test.status {
        TestStatus::Skip => detail("reason").and_then(Value::as_str).map(str::to_string),
        TestStatus::Error => detail("error").and_then(Value::as_str).map(str::to_string),
        _ => match test.test_name.as_str() {
            "row_count" => match (detail("source_count"), detail("dest_count")) {
                (Some(s), Some(d)) => Some(format!("{} vs {}", s, d)),
                _ => None,
            },
            "null_rate" => match (detail("source_null_pct"), detail("dest_null_pct")) {
                (Some(s), Some(d)) => Some(format!("{}% vs {}%", s, d)),
                _ => None,
            },
            "psi" => detail("psi_value").map(|v| format!("psi={}", v)),
            "schema_comparison" => detail("common_columns").map(|v| format!("{} common columns", v)),
            "date_range" => detail("interpretation").and_then(Value::as_str).map(str::to_string),
            _ => test.p_value().map(|p| format!("p={:.4}", p)),
        },
    };
    text.map(|t| format!(" ({})", t)).unwrap_or_default()
}
