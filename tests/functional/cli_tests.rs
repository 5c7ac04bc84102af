//! End-to-end runs through the command-line entry point

use crate::common::{create_db_file, sample_data, CliTestRunner};
use statdiff::report::{ComparisonReport, TestStatus};
use statdiff::OverallStatus;
use std::path::Path;
use tempfile::TempDir;

fn read_report(path: &Path) -> ComparisonReport {
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn orders_pair(temp_dir: &TempDir) -> (String, String) {
    let source = create_db_file(temp_dir, "source.duckdb", &sample_data::orders("orders", 1000)).unwrap();
    let dest = create_db_file(temp_dir, "dest.duckdb", &sample_data::orders("orders", 1000)).unwrap();
    (
        source.to_string_lossy().into_owned(),
        dest.to_string_lossy().into_owned(),
    )
}

#[test]
fn test_compare_identical_files() {
    let temp_dir = TempDir::new().unwrap();
    let (source, dest) = orders_pair(&temp_dir);
    let output = temp_dir.path().join("reports").join("orders.json");

    let status = CliTestRunner::expect_success(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        &source,
        "--dest-db",
        &dest,
        "--output",
        output.to_str().unwrap(),
        "--no-progress",
    ]);
    assert_eq!(status, Some(OverallStatus::Pass));

    let report = read_report(&output);
    assert_eq!(report.overall_status, OverallStatus::Pass);
    assert_eq!(report.summary.failed, 0);
    assert!(report.find("row_count", None).is_some());
    assert!(report.find("ks_test", Some("amount")).is_some());
    assert!(report.find("psi", Some("region")).is_some());
    assert!(report.find("date_range", Some("order_date")).is_some());
}

#[test]
fn test_compare_detects_shift() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_db_file(&temp_dir, "source.duckdb", &sample_data::orders("orders", 1000)).unwrap();
    let dest = create_db_file(&temp_dir, "dest.duckdb", &sample_data::shifted_orders("orders", 1000)).unwrap();
    let output = temp_dir.path().join("shift.json");

    CliTestRunner::expect_success(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        source.to_str().unwrap(),
        "--dest-db",
        dest.to_str().unwrap(),
        "--format",
        "json",
        "--output",
        output.to_str().unwrap(),
    ]);

    let report = read_report(&output);
    assert_eq!(report.find("ks_test", Some("amount")).unwrap().status, TestStatus::Fail);
    assert_eq!(report.find("t_test", Some("amount")).unwrap().status, TestStatus::Fail);
    assert_eq!(report.find("psi", Some("region")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_compare_restricted_columns() {
    let temp_dir = TempDir::new().unwrap();
    let (source, dest) = orders_pair(&temp_dir);
    let output = temp_dir.path().join("columns.json");

    CliTestRunner::expect_success(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        &source,
        "--dest-db",
        &dest,
        "--columns",
        "amount,REGION",
        "--output",
        output.to_str().unwrap(),
        "--no-progress",
    ]);

    let report = read_report(&output);
    assert_eq!(report.run.columns_tested, 2);
    assert!(report.find("ks_test", Some("amount")).is_some());
    assert!(report.find("null_rate", Some("order_date")).is_none());
}

#[test]
fn test_compare_month_filter() {
    let temp_dir = TempDir::new().unwrap();
    let (source, dest) = orders_pair(&temp_dir);
    let output = temp_dir.path().join("month.json");

    CliTestRunner::expect_success(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        &source,
        "--dest-db",
        &dest,
        "--month",
        "2024-02",
        "--date-column",
        "order_date",
        "--output",
        output.to_str().unwrap(),
        "--no-progress",
    ]);

    let report = read_report(&output);
    let row_count = report.find("row_count", None).unwrap();
    // 1000 rows cycle through 366 days, so February appears in three cycles minus the tail
    let count = row_count.details["source_count"].as_u64().unwrap();
    assert!(count > 0 && count < 1000);
    assert!(report.run.filters["source"].contains("EXTRACT(MONTH FROM \"order_date\")"));
}

#[test]
fn test_month_filter_follows_each_side_dialect() {
    let temp_dir = TempDir::new().unwrap();
    let orders = "CREATE TABLE orders AS SELECT \
                    i AS id, \
                    (i % 50) * 1.5 AS amount, \
                    DATE '2024-01-01' + CAST(i % 90 AS INTEGER) AS erdat \
                  FROM range(900) t(i)";
    let source = create_db_file(
        &temp_dir,
        "hana.duckdb",
        &format!("CREATE TABLE DUMMY AS SELECT 'X' AS DUMMY; {}", orders),
    )
    .unwrap();
    let dest = create_db_file(&temp_dir, "dremio.duckdb", orders).unwrap();
    let config = temp_dir.path().join("full.yaml");
    std::fs::write(&config, "sampling:\n  enabled: false\n").unwrap();
    let output = temp_dir.path().join("month.json");

    CliTestRunner::expect_success(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        source.to_str().unwrap(),
        "--dest-db",
        dest.to_str().unwrap(),
        "--source-dialect",
        "hana",
        "--dest-dialect",
        "dremio",
        "--config",
        config.to_str().unwrap(),
        "--month",
        "2024-02",
        "--date-column",
        "erdat",
        "--output",
        output.to_str().unwrap(),
        "--no-progress",
    ]);

    let report = read_report(&output);
    assert!(report.run.filters["source"].contains("YEAR(\"ERDAT\") = 2024"));
    assert!(report.run.filters["dest"].contains("EXTRACT(YEAR FROM \"erdat\") = 2024"));
    assert!(!report.run.filters["dest"].contains("YEAR(\"ERDAT\")"));

    let row_count = report.find("row_count", None).unwrap();
    assert_eq!(row_count.status, TestStatus::Pass);
    // February 2024 has 29 days, each hit ten times by 900 rows over 90 days
    assert_eq!(row_count.details["source_count"], 290);
    assert_eq!(row_count.details["dest_count"], 290);
}

#[test]
fn test_compare_unknown_table_reports_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (source, dest) = orders_pair(&temp_dir);
    let output = temp_dir.path().join("missing.json");

    CliTestRunner::expect_success(&[
        "compare",
        "no_such_table",
        "orders",
        "--source-db",
        &source,
        "--dest-db",
        &dest,
        "--output",
        output.to_str().unwrap(),
        "--no-progress",
    ]);

    let report = read_report(&output);
    assert_eq!(report.find("row_count", None).unwrap().status, TestStatus::Error);
    assert!(report.summary.errors >= 1);
}

#[test]
fn test_compare_missing_database_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.duckdb");

    let err = CliTestRunner::expect_failure(&[
        "compare",
        "orders",
        "orders",
        "--source-db",
        missing.to_str().unwrap(),
        "--no-progress",
    ]);
    assert!(err.is_connection());
}

#[test]
fn test_compare_rejects_unknown_dialect() {
    let err = CliTestRunner::expect_failure(&[
        "compare",
        "orders",
        "orders",
        "--source-dialect",
        "oracle",
    ]);
    assert!(err.to_string().contains("oracle"));
}

#[test]
fn test_config_validate_and_show() {
    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("good.yaml");
    std::fs::write(
        &good,
        "sampling:\n  strategy: random\n  target_pct: 5.0\nfdr_correction:\n  enabled: true\n",
    )
    .unwrap();

    let status = CliTestRunner::expect_success(&["config", "validate", good.to_str().unwrap()]);
    assert_eq!(status, None);
    CliTestRunner::expect_success(&["config", "show", "--config", good.to_str().unwrap(), "--format", "json"]);

    let bad = temp_dir.path().join("bad.json");
    std::fs::write(&bad, r#"{"sampling": {"target_pct": 250.0}}"#).unwrap();
    CliTestRunner::expect_failure(&["config", "validate", bad.to_str().unwrap()]);
}
