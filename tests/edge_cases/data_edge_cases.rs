//! Edge cases in the data being compared

use crate::common::{full_scan_config, sample_data, TestFixture};
use statdiff::comparator::Phase;
use statdiff::report::{OverallStatus, TestStatus};

#[test]
fn test_both_tables_empty() {
    let fixture = TestFixture::new().unwrap();
    fixture.both_sql(&sample_data::empty_orders("orders")).unwrap();

    let report = fixture.compare("orders", full_scan_config()).unwrap();

    assert_eq!(report.find("row_count", None).unwrap().status, TestStatus::Pass);
    for test in ["ks_test", "t_test"] {
        assert_eq!(report.find(test, Some("amount")).unwrap().status, TestStatus::Skip);
    }
    assert_eq!(report.find("psi", Some("region")).unwrap().status, TestStatus::Skip);
    assert_eq!(report.find("date_range", Some("order_date")).unwrap().status, TestStatus::Skip);
    assert_eq!(report.summary.errors, 0);
}

#[test]
fn test_small_tables_skip_distribution_tests() {
    let fixture = TestFixture::new().unwrap();
    fixture.both_sql(&sample_data::orders("orders", 10)).unwrap();

    let report = fixture.compare("orders", full_scan_config()).unwrap();

    let ks = report.find("ks_test", Some("amount")).unwrap();
    assert_eq!(ks.status, TestStatus::Skip);
    assert_eq!(ks.details["reason"], "Insufficient non-null data: 10 values, 30 required");
    assert_eq!(ks.details["min_required"], 30);
    // SKIPs are left out of the verdict; row count, schema and null rates decide it
    assert_eq!(report.overall_status, OverallStatus::Pass);
}

#[test]
fn test_all_null_column() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, CAST(NULL AS DOUBLE) AS amount FROM range(100) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let null_rate = report.find("null_rate", Some("amount")).unwrap();
    assert_eq!(null_rate.status, TestStatus::Pass);
    assert_eq!(null_rate.details["source_null_pct"], 100.0);
    assert_eq!(report.find("ks_test", Some("amount")).unwrap().status, TestStatus::Skip);
}

#[test]
fn test_high_cardinality_categorical_is_skipped_visibly() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, 'customer_' || i AS customer FROM range(500) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let psi = report.find("psi", Some("customer")).unwrap();
    assert_eq!(psi.status, TestStatus::Skip);
    assert_eq!(psi.details["cardinality"], 500);
    assert_eq!(psi.details["max_cardinality"], 100);
    assert_eq!(report.find("chi_square", Some("customer")).unwrap().status, TestStatus::Skip);
}

#[test]
fn test_mid_cardinality_runs_psi_but_not_chi_square() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, 'c' || (i % 75) AS category FROM range(1500) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    assert_eq!(report.find("psi", Some("category")).unwrap().status, TestStatus::Pass);
    let chi = report.find("chi_square", Some("category")).unwrap();
    assert_eq!(chi.status, TestStatus::Skip);
    assert_eq!(chi.details["max_cardinality"], 50);
}

#[test]
fn test_single_category_column() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, 'only' AS kind FROM range(100) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let chi = report.find("chi_square", Some("kind")).unwrap();
    assert_eq!(chi.status, TestStatus::Pass);
    assert_eq!(chi.p_value(), Some(1.0));
    assert_eq!(report.find("psi", Some("kind")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_constant_numeric_column() {
    let fixture = TestFixture::new().unwrap();
    fixture.source_sql("CREATE TABLE t AS SELECT i AS id, 5.0 AS rate FROM range(100) r(i)").unwrap();
    fixture.dest_sql("CREATE TABLE t AS SELECT i AS id, 6.0 AS rate FROM range(100) r(i)").unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    let t_test = report.find("t_test", Some("rate")).unwrap();
    assert_eq!(t_test.status, TestStatus::Fail);
    assert_eq!(t_test.p_value(), Some(0.0));
}

#[test]
fn test_no_common_columns() {
    let fixture = TestFixture::new().unwrap();
    fixture.source_sql("CREATE TABLE t AS SELECT 1 AS a, 2 AS b").unwrap();
    fixture.dest_sql("CREATE TABLE t AS SELECT 1 AS c").unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    assert_eq!(report.tests.len(), 2);
    assert_eq!(report.find("schema_comparison", None).unwrap().status, TestStatus::Fail);
    assert_eq!(
        report.run.phases.last().copied(),
        Some(Phase::Finalize)
    );
    assert!(report.run.phases.contains(&Phase::AbortNoCommonColumns));
}

#[test]
fn test_unicode_categories() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql(
            "CREATE TABLE t AS SELECT i AS id, \
             CASE i % 3 WHEN 0 THEN 'Café' WHEN 1 THEN '北京' ELSE '🚀' END AS city \
             FROM range(300) r(i)",
        )
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    assert_eq!(report.find("psi", Some("city")).unwrap().status, TestStatus::Pass);
    assert_eq!(report.find("chi_square", Some("city")).unwrap().status, TestStatus::Pass);
}

#[test]
fn test_quoted_identifiers() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .both_sql("CREATE TABLE t AS SELECT i AS id, i * 1.0 AS \"unit price\" FROM range(100) r(i)")
        .unwrap();

    let report = fixture.compare("t", full_scan_config()).unwrap();

    assert_eq!(report.find("ks_test", Some("unit price")).unwrap().status, TestStatus::Pass);
    assert_eq!(report.summary.errors, 0);
}
