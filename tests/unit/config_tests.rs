//! Configuration loading from files

use statdiff::config::{CompareConfig, FdrMethod};
use statdiff::report::TiePolicy;
use statdiff::sampler::SamplingStrategy;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("statdiff.yaml");
    fs::write(
        &path,
        r#"
thresholds:
  ks_test_pvalue: 0.01
  fdr_correction:
    enabled: true
    method: by
sampling:
  strategy: percentage
  target_pct: 5
verdict:
  tie_policy: warning
null_equivalents:
  source:
    - semantic_type: categorical
      literal: { text: "N/A" }
"#,
    )
    .unwrap();

    let config = CompareConfig::load(&path).unwrap();
    assert_eq!(config.thresholds.ks_test_pvalue, 0.01);
    assert!(config.thresholds.fdr_correction.enabled);
    assert_eq!(config.thresholds.fdr_correction.method, FdrMethod::BenjaminiYekutieli);
    assert_eq!(config.sampling.strategy, SamplingStrategy::Percentage);
    assert_eq!(config.sampling.target_pct, 5.0);
    assert_eq!(config.verdict.tie_policy, TiePolicy::Warning);
    assert_eq!(config.null_equivalents.source.len(), 1);
    // Untouched sections keep their defaults
    assert_eq!(config.categorical.max_cardinality_for_psi, 100);
}

#[test]
fn test_load_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("statdiff.json");
    fs::write(
        &path,
        r#"{"categorical": {"max_cardinality_for_psi": 40, "max_cardinality_for_chi_square": 20}}"#,
    )
    .unwrap();

    let config = CompareConfig::load(&path).unwrap();
    assert_eq!(config.categorical.max_cardinality_for_psi, 40);
    assert_eq!(config.categorical.max_cardinality_for_chi_square, 20);
}

#[test]
fn test_unsupported_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("statdiff.toml");
    fs::write(&path, "x = 1").unwrap();
    let err = CompareConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Unsupported config format"));
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    assert!(CompareConfig::load(temp_dir.path().join("absent.yaml")).is_err());
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.yaml");
    fs::write(&path, "thresholds:\n  ks_test_pvalue: 1.5\n").unwrap();
    assert!(CompareConfig::load(&path).is_err());

    fs::write(&path, "sampling:\n  min_size: 10\n  max_size: 5\n").unwrap();
    assert!(CompareConfig::load(&path).is_err());
}

#[test]
fn test_config_round_trips_through_yaml() {
    let config = CompareConfig::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert_eq!(CompareConfig::from_yaml(&yaml).unwrap(), config);
}
