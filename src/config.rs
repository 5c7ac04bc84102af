//! Comparison configuration: thresholds, sampling, categorical ceilings
//!
//! Configuration is an explicit value handed to [`crate::Comparator::new`].
//! Files may be JSON or YAML; a handful of environment variables override
//! individual keys after loading.

use crate::duckdb_config::DuckDbConfig;
use crate::error::{Result, StatdiffError};
use crate::null_normalizer::NullPattern;
use crate::report::TiePolicy;
use crate::sampler::{SampleSpec, SamplingStrategy};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level configuration consumed by the comparator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub thresholds: Thresholds,
    pub sampling: SamplingConfig,
    pub categorical: CategoricalConfig,
    pub verdict: VerdictConfig,
    pub null_equivalents: NullEquivalents,
    pub cache: DuckDbConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub row_count_tolerance_pct: f64,
    pub null_rate_tolerance_pct: f64,
    pub ks_test_pvalue: f64,
    pub t_test_pvalue: f64,
    pub chi_square_pvalue: f64,
    /// PSI below this passes
    pub psi_threshold: f64,
    /// PSI at or above this fails; in between warns
    pub psi_fail_threshold: f64,
    pub fdr_correction: FdrConfig,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            row_count_tolerance_pct: 0.1,
            null_rate_tolerance_pct: 2.0,
            ks_test_pvalue: 0.05,
            t_test_pvalue: 0.05,
            chi_square_pvalue: 0.05,
            psi_threshold: 0.1,
            psi_fail_threshold: 0.25,
            fdr_correction: FdrConfig::default(),
        }
    }
}

/// False-discovery-rate procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FdrMethod {
    #[default]
    #[serde(rename = "bh", alias = "fdr_bh", alias = "benjamini_hochberg")]
    BenjaminiHochberg,
    #[serde(rename = "by", alias = "fdr_by", alias = "benjamini_yekutieli")]
    BenjaminiYekutieli,
}

impl FdrMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BenjaminiHochberg => "fdr_bh",
            Self::BenjaminiYekutieli => "fdr_by",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdrConfig {
    pub enabled: bool,
    pub method: FdrMethod,
    pub alpha: f64,
    /// Correct each test type separately instead of all p-values together
    pub apply_per_test_type: bool,
}

impl Default for FdrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: FdrMethod::BenjaminiHochberg,
            alpha: 0.05,
            apply_per_test_type: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub enabled: bool,
    pub strategy: SamplingStrategy,
    /// Row limit for fixed and random sampling
    pub max_sample_size: u64,
    /// Minimum non-null values per side before a statistical test runs
    pub min_sample_size: usize,
    pub target_pct: f64,
    pub min_size: u64,
    pub max_size: u64,
    pub seed: u64,
    pub hash_column: Option<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: SamplingStrategy::Hash,
            max_sample_size: 50_000,
            min_sample_size: 30,
            target_pct: 10.0,
            min_size: 1_000,
            max_size: 100_000,
            seed: 0,
            hash_column: None,
        }
    }
}

impl SamplingConfig {
    /// The sample spec used for the whole run
    pub fn sample_spec(&self) -> SampleSpec {
        SampleSpec {
            strategy: if self.enabled {
                self.strategy
            } else {
                SamplingStrategy::None
            },
            target_size: self.max_sample_size,
            target_pct: self.target_pct,
            min_size: self.min_size,
            max_size: self.max_size,
            seed: self.seed,
            hash_column: self.hash_column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoricalConfig {
    pub max_cardinality_for_psi: u64,
    pub max_cardinality_for_chi_square: u64,
}

impl Default for CategoricalConfig {
    fn default() -> Self {
        Self {
            max_cardinality_for_psi: 100,
            max_cardinality_for_chi_square: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    pub tie_policy: TiePolicy,
}

/// Extra null-equivalent values on top of each dialect's built-ins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullEquivalents {
    pub source: Vec<NullPattern>,
    pub dest: Vec<NullPattern>,
}

impl CompareConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file, then apply env overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StatdiffError::config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        let mut config = match extension.as_deref() {
            Some("json") => Self::from_json(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => {
                return Err(StatdiffError::config(format!(
                    "Unsupported config format: {}",
                    path.display()
                )))
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Override individual keys from the environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_number("ROW_COUNT_THRESHOLD_PCT")? {
            self.thresholds.row_count_tolerance_pct = v;
        }
        if let Some(v) = env_number("NULL_RATE_THRESHOLD_PCT")? {
            self.thresholds.null_rate_tolerance_pct = v;
        }
        if let Some(v) = env_number("KS_TEST_PVALUE")? {
            self.thresholds.ks_test_pvalue = v;
        }
        if let Some(v) = env_number("PSI_THRESHOLD")? {
            self.thresholds.psi_threshold = v;
        }
        if let Some(v) = env_number::<u64>("SAMPLE_SIZE")? {
            self.sampling.max_sample_size = v;
        }
        if let Ok(path) = env::var("STATDIFF_CACHE_PATH") {
            self.cache.path = Some(path.into());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (key, value) in [
            ("thresholds.row_count_tolerance_pct", t.row_count_tolerance_pct),
            ("thresholds.null_rate_tolerance_pct", t.null_rate_tolerance_pct),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(StatdiffError::config(format!(
                    "{} must be between 0 and 100, got {}",
                    key, value
                )));
            }
        }

        for (key, value) in [
            ("thresholds.ks_test_pvalue", t.ks_test_pvalue),
            ("thresholds.t_test_pvalue", t.t_test_pvalue),
            ("thresholds.chi_square_pvalue", t.chi_square_pvalue),
            ("thresholds.fdr_correction.alpha", t.fdr_correction.alpha),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(StatdiffError::config(format!(
                    "{} must be in (0, 1), got {}",
                    key, value
                )));
            }
        }

        if t.psi_threshold <= 0.0 || t.psi_fail_threshold < t.psi_threshold {
            return Err(StatdiffError::config(
                "thresholds.psi_fail_threshold must be >= psi_threshold > 0",
            ));
        }

        let s = &self.sampling;
        if !(s.target_pct > 0.0 && s.target_pct <= 100.0) {
            return Err(StatdiffError::config(format!(
                "sampling.target_pct must be in (0, 100], got {}",
                s.target_pct
            )));
        }
        if s.min_size > s.max_size {
            return Err(StatdiffError::config(format!(
                "sampling.min_size ({}) exceeds sampling.max_size ({})",
                s.min_size, s.max_size
            )));
        }
        if s.max_sample_size == 0 {
            return Err(StatdiffError::config("sampling.max_sample_size must be at least 1"));
        }

        self.cache.validate()?;

        let c = &self.categorical;
        if c.max_cardinality_for_chi_square > c.max_cardinality_for_psi {
            log::warn!(
                "categorical.max_cardinality_for_chi_square ({}) exceeds max_cardinality_for_psi ({}); \
                 chi-square only runs where PSI does",
                c.max_cardinality_for_chi_square,
                c.max_cardinality_for_psi
            );
        }

        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StatdiffError::config(format!("Environment variable {}='{}' is not a number", key, raw))),
        Err(_) => Ok(None),
    }
}
