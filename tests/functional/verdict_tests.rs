//! Overall verdict, FDR correction at finalize, and the report JSON shape

use statdiff::comparator::Phase;
use statdiff::config::{FdrConfig, FdrMethod};
use statdiff::report::{OverallStatus, ReportBuilder, TestResult, TestStatus, TiePolicy};

fn result(name: &str, column: &str, status: TestStatus) -> TestResult {
    TestResult::new(name, Some(column), status)
}

fn with_p(name: &str, column: &str, p: f64) -> TestResult {
    let status = if p < 0.05 { TestStatus::Fail } else { TestStatus::Pass };
    result(name, column, status).with_detail("p_value", p)
}

fn fdr_enabled() -> FdrConfig {
    FdrConfig {
        enabled: true,
        method: FdrMethod::BenjaminiHochberg,
        alpha: 0.05,
        apply_per_test_type: true,
    }
}

#[test]
fn test_row_count_failure_overrides_majority() {
    let mut builder = ReportBuilder::new("src", "dst");
    builder.push(TestResult::new("row_count", None, TestStatus::Fail));
    for i in 0..10 {
        builder.push(result("null_rate", &format!("c{}", i), TestStatus::Pass));
    }
    let report = builder.finalize(&FdrConfig::default(), TiePolicy::Pass);
    assert_eq!(report.overall_status, OverallStatus::Fail);
    assert_eq!(report.summary.passed, 10);
}

#[test]
fn test_skips_do_not_dilute_the_verdict() {
    let mut builder = ReportBuilder::new("src", "dst");
    builder.push(result("null_rate", "a", TestStatus::Pass));
    builder.push(result("null_rate", "b", TestStatus::Pass));
    builder.push(result("null_rate", "c", TestStatus::Fail));
    for i in 0..10 {
        builder.push(TestResult::skip("ks_test", Some(format!("s{}", i).as_str()), "Insufficient non-null data"));
    }
    let report = builder.finalize(&FdrConfig::default(), TiePolicy::Fail);
    assert_eq!(report.overall_status, OverallStatus::Pass);
    assert_eq!(report.summary.skipped, 10);
}

#[test]
fn test_tie_policy_decides_even_split() {
    for (policy, expected) in [
        (TiePolicy::Pass, OverallStatus::Pass),
        (TiePolicy::Warning, OverallStatus::Warning),
        (TiePolicy::Fail, OverallStatus::Fail),
    ] {
        let mut builder = ReportBuilder::new("src", "dst");
        builder.push(result("ks_test", "a", TestStatus::Pass));
        builder.push(result("ks_test", "b", TestStatus::Fail));
        let report = builder.finalize(&FdrConfig::default(), policy);
        assert_eq!(report.overall_status, expected);
    }
}

#[test]
fn test_warnings_decide_before_tie_policy() {
    let mut builder = ReportBuilder::new("src", "dst");
    builder.push(result("ks_test", "a", TestStatus::Pass));
    builder.push(result("ks_test", "b", TestStatus::Fail));
    builder.push(result("psi", "c", TestStatus::Warning));
    let report = builder.finalize(&FdrConfig::default(), TiePolicy::Pass);
    assert_eq!(report.overall_status, OverallStatus::Warning);
}

#[test]
fn test_fdr_runs_at_finalize_when_enabled() {
    let build = || {
        let mut builder = ReportBuilder::new("src", "dst");
        for (i, p) in [0.03, 0.04, 0.6, 0.8, 0.9].iter().enumerate() {
            builder.push(with_p("ks_test", &format!("c{}", i), *p));
        }
        builder
    };

    let disabled = build().finalize(&FdrConfig::default(), TiePolicy::Pass);
    assert_eq!(disabled.summary.failed, 2);

    let mut by = fdr_enabled();
    by.method = FdrMethod::BenjaminiYekutieli;
    let enabled = build().finalize(&by, TiePolicy::Pass);
    assert_eq!(enabled.summary.failed, 0);
    let flipped = enabled.find("ks_test", Some("c0")).unwrap();
    assert_eq!(flipped.status, TestStatus::Pass);
    assert_eq!(flipped.details["fdr_original_status"], "FAIL");
    assert_eq!(flipped.details["fdr_alpha"], 0.05);
    assert_eq!(enabled.tests.len(), 5);
}

#[test]
fn test_fdr_keeps_lone_failure() {
    let mut builder = ReportBuilder::new("src", "dst");
    for (i, p) in [0.04, 0.3, 0.5, 0.7].iter().enumerate() {
        builder.push(with_p("ks_test", &format!("c{}", i), *p));
    }
    let report = builder.finalize(&fdr_enabled(), TiePolicy::Pass);
    let lone = report.find("ks_test", Some("c0")).unwrap();
    assert_eq!(lone.status, TestStatus::Fail);
    assert_eq!(lone.details["fdr_corrected"], true);
    assert_eq!(report.summary.failed, 1);
}

#[test]
fn test_report_json_shape() {
    let mut builder = ReportBuilder::new("SRC.ORDERS", "lake.orders");
    builder.enter(Phase::Init);
    builder.push(TestResult::new("row_count", None, TestStatus::Pass).with_detail("ratio", 1.0));
    builder.push(TestResult::error("null_rate", Some("amount"), "query failed"));
    let report = builder.finalize(&FdrConfig::default(), TiePolicy::Pass);

    let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["source_table"], "SRC.ORDERS");
    assert_eq!(json["dest_table"], "lake.orders");
    assert_eq!(json["overall_status"], "PASS");
    assert_eq!(json["summary"]["total_tests"], 2);
    assert_eq!(json["summary"]["errors"], 1);
    assert_eq!(json["tests"][0]["test_name"], "row_count");
    assert!(json["tests"][0].get("column").is_none());
    assert_eq!(json["tests"][1]["status"], "ERROR");
    assert_eq!(json["tests"][1]["details"]["error"], "query failed");
    assert_eq!(json["run"]["phases"], serde_json::json!(["INIT", "FINALIZE"]));
    assert!(json["timestamp"].is_string());
}
