//! End-to-end comparator runs over in-memory DuckDB connectors

use crate::common::{full_scan_config, sample_data, TestFixture};
use statdiff::comparator::{CompareOptions, Phase};
use statdiff::null_normalizer::NullPattern;
use statdiff::report::{OverallStatus, TestStatus};
use statdiff::schema::SemanticType;
use statdiff::Dialect;

#[test]
fn test_identical_tables_pass() {
    let fixture = TestFixture::new().unwrap();
    fixture.both_sql(&sample_data::orders("orders", 1000)).unwrap();

    let report = fixture.compare("orders", full_scan_config()).unwrap();

    let row_count = report.find("row_count", None).unwrap();
    assert_eq!(row_count.status, TestStatus::Pass);
    assert_eq!(row_count.details["ratio"], 1.0);

    for (test, column) in [
        ("null_rate", "amount"),
        ("ks_test", "amount"),
        ("t_test", "amount"),
        ("psi", "region"),
        ("chi_square", "region"),
        ("psi", "is_priority"),
        ("date_range", "order_date"),
    ] {
        let result = report
            .find(test, Some(column))
            .unwrap_or_else(|| panic!("{} on {} missing", test, column));
        assert_eq!(result.status, TestStatus::Pass, "{} on {}: {:?}", test, column, result.details);
    }
    assert_eq!(report.overall_status, OverallStatus::Pass);
    assert_eq!(report.summary.errors, 0);
    assert_eq!(report.run.columns_tested, 5);
    assert_eq!(
        report.run.phases,
        vec![
            Phase::Init,
            Phase::RowCountCheck,
            Phase::SchemaCheck,
            Phase::Cache,
            Phase::PerColumnTests,
            Phase::Finalize
        ]
    );
}

#[test]
fn test_shifted_distribution_fails() {
    let fixture = TestFixture::new().unwrap();
    fixture.source_sql(&sample_data::orders("orders", 1000)).unwrap();
    fixture.dest_sql(&sample_data::shifted_orders("orders", 1000)).unwrap();

    let report = fixture.compare("orders", full_scan_config()).unwrap();

    assert_eq!(report.find("ks_test", Some("amount")).unwrap().status, TestStatus::Fail);
    assert_eq!(report.find("t_test", Some("amount")).unwrap().status, TestStatus::Fail);
    assert_eq!(report.find("psi", Some("region")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_empty_destination_fails_overall() {
    let fixture = TestFixture::new().unwrap();
    fixture.source_sql(&sample_data::orders("orders", 1000)).unwrap();
    fixture.dest_sql(&sample_data::empty_orders("orders")).unwrap();

    let report = fixture.compare("orders", full_scan_config()).unwrap();

    assert_eq!(report.find("row_count", None).unwrap().status, TestStatus::Fail);
    assert_eq!(report.overall_status, OverallStatus::Fail);
    // Destination has nothing to sample, so distribution tests skip
    assert_eq!(report.find("ks_test", Some("amount")).unwrap().status, TestStatus::Skip);
}

#[test]
fn test_missing_column_tests_common_columns_only() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .source_sql("CREATE TABLE t AS SELECT i AS id, i * 2.0 AS amount, 'x' AS col_x FROM range(200) r(i)")
        .unwrap();
    fixture
        .dest_sql("CREATE TABLE t AS SELECT i AS id, i * 2.0 AS amount FROM range(200) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let schema = report.find("schema_comparison", None).unwrap();
    assert_eq!(schema.status, TestStatus::Fail);
    assert_eq!(schema.details["missing_in_dest"], serde_json::json!(["col_x"]));
    assert_eq!(schema.details["source_table"], "t");
    assert!(report.tests.iter().all(|t| t.column.as_deref() != Some("col_x")));
    assert!(report.find("ks_test", Some("amount")).is_some());
}

#[test]
fn test_column_names_match_across_casing() {
    let fixture = TestFixture::with_dialects(Dialect::hana(), Dialect::dremio()).unwrap();
    fixture
        .source_sql("CREATE TABLE ORDERS AS SELECT i AS \"ID\", (i % 50) * 1.0 AS \"AMOUNT\" FROM range(300) r(i)")
        .unwrap();
    fixture
        .dest_sql("CREATE TABLE orders AS SELECT i AS id, (i % 50) * 1.0 AS amount FROM range(300) r(i)")
        .unwrap();

    let report = fixture
        .compare_with("ORDERS", "orders", full_scan_config(), &CompareOptions::default())
        .unwrap();

    assert_eq!(report.find("schema_comparison", None).unwrap().status, TestStatus::Pass);
    // Results use the source spelling
    assert_eq!(report.find("ks_test", Some("AMOUNT")).unwrap().status, TestStatus::Pass);
    assert_eq!(report.overall_status, OverallStatus::Pass);
}

#[test]
fn test_null_equivalents_normalized_per_side() {
    let fixture = TestFixture::with_dialects(Dialect::hana(), Dialect::duckdb()).unwrap();
    fixture
        .source_sql(
            "CREATE TABLE DOCS AS SELECT i AS ID, \
             CASE WHEN i % 10 = 0 THEN '00000000' ELSE strftime(DATE '2024-01-01' + CAST(i % 300 AS INTEGER), '%Y%m%d') END AS POSTING_DATE, \
             CASE WHEN i % 5 = 0 THEN '' ELSE 'A' || (i % 3) END AS STATUS \
             FROM range(500) r(i)",
        )
        .unwrap();
    fixture
        .dest_sql(
            "CREATE TABLE docs AS SELECT i AS id, \
             CASE WHEN i % 10 = 0 THEN NULL ELSE DATE '2024-01-01' + CAST(i % 300 AS INTEGER) END AS posting_date, \
             CASE WHEN i % 5 = 0 THEN NULL ELSE 'A' || (i % 3) END AS status \
             FROM range(500) r(i)",
        )
        .unwrap();

    let report = fixture
        .compare_with("DOCS", "docs", full_scan_config(), &CompareOptions::default())
        .unwrap();

    let posting = report.find("null_rate", Some("POSTING_DATE")).unwrap();
    assert_eq!(posting.status, TestStatus::Pass, "{:?}", posting.details);
    assert_eq!(posting.details["source_null_rows"], 50);
    let status = report.find("null_rate", Some("STATUS")).unwrap();
    assert_eq!(status.status, TestStatus::Pass, "{:?}", status.details);
    assert_eq!(report.find("date_range", Some("POSTING_DATE")).unwrap().status, TestStatus::Pass);
    assert_eq!(report.find("psi", Some("STATUS")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_configured_null_equivalents() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .source_sql("CREATE TABLE t AS SELECT i AS id, CASE WHEN i % 4 = 0 THEN 'N/A' ELSE 'v' || (i % 2) END AS code FROM range(400) r(i)")
        .unwrap();
    fixture
        .dest_sql("CREATE TABLE t AS SELECT i AS id, CASE WHEN i % 4 = 0 THEN NULL ELSE 'v' || (i % 2) END AS code FROM range(400) r(i)")
        .unwrap();

    let without = fixture.compare("t", full_scan_config()).unwrap();
    assert_eq!(without.find("null_rate", Some("code")).unwrap().status, TestStatus::Fail);

    let mut config = full_scan_config();
    config.null_equivalents.source = vec![NullPattern::text(SemanticType::Categorical, "N/A")];
    let with = fixture.compare("t", config).unwrap();
    assert_eq!(with.find("null_rate", Some("code")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_filter_scopes_every_phase() {
    let fixture = TestFixture::new().unwrap();
    fixture.source_sql(&sample_data::orders("orders", 1000)).unwrap();
    // Destination only carries the northern orders
    fixture
        .dest_sql(&format!(
            "{}; DELETE FROM orders WHERE region <> 'north'",
            sample_data::orders("orders", 1000)
        ))
        .unwrap();

    let options = CompareOptions {
        filter: Some("region = 'north'".to_string()),
        ..CompareOptions::default()
    };
    let report = fixture
        .compare_with("orders", "orders", full_scan_config(), &options)
        .unwrap();

    let row_count = report.find("row_count", None).unwrap();
    assert_eq!(row_count.status, TestStatus::Pass);
    assert_eq!(row_count.details["source_count"], 250);
    assert_eq!(report.run.filters["source"], "region = 'north'");
    assert_eq!(report.run.filters["dest"], "region = 'north'");
    assert_eq!(report.overall_status, OverallStatus::Pass);
}

#[test]
fn test_column_list_restricts_tests() {
    let fixture = TestFixture::new().unwrap();
    fixture.both_sql(&sample_data::orders("orders", 500)).unwrap();

    let options = CompareOptions {
        columns: Some(vec!["AMOUNT".to_string()]),
        ..CompareOptions::default()
    };
    let report = fixture
        .compare_with("orders", "orders", full_scan_config(), &options)
        .unwrap();

    let columns: Vec<&str> = report.tests.iter().filter_map(|t| t.column.as_deref()).collect();
    assert!(!columns.is_empty());
    assert!(columns.iter().all(|c| *c == "amount"));
    assert_eq!(report.run.columns_tested, 1);
}

#[test]
fn test_binary_columns_are_dropped_not_fatal() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, i * 1.5 AS amount, CAST('abc' AS BLOB) AS payload FROM range(100) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let dropped = &report.run.dropped_columns["source"];
    assert_eq!(dropped[0].name, "payload");
    assert!(report.tests.iter().all(|t| t.column.as_deref() != Some("payload")));
    assert_eq!(report.summary.errors, 0);
    assert!(report.run.caching_error.is_none());
}

#[test]
fn test_caching_failure_is_an_error_result() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE blobs AS SELECT CAST('abc' AS BLOB) AS payload FROM range(50) r(i)")
        .unwrap();

    let report = fixture.compare("blobs", full_scan_config()).unwrap();

    let cache = report.find("cache", None).unwrap();
    assert_eq!(cache.status, TestStatus::Error);
    assert_eq!(cache.details["side"], "source");
    assert!(report.run.caching_error.as_deref().unwrap().contains("no cacheable columns"));
    assert_eq!(report.summary.errors, 1);
    assert!(!report.run.phases.contains(&Phase::PerColumnTests));
    assert_eq!(report.run.phases.last(), Some(&Phase::Finalize));
}

#[test]
fn test_unreachable_backend_is_an_error() {
    // A HANA dialect without a DUMMY table cannot be pinged
    let fixture = TestFixture::new().unwrap();
    let hana = statdiff::DuckDbConnector::open_in_memory(Dialect::hana()).unwrap();
    fixture.both_sql(&sample_data::orders("orders", 10)).unwrap();

    let mut comparator = statdiff::Comparator::new(&hana, &fixture.dest, full_scan_config());
    let err = comparator
        .compare("orders", "orders", &CompareOptions::default())
        .unwrap_err();
    assert!(err.is_connection());
}
