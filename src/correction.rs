//! False discovery rate correction over p-valued results
//!
//! Within a group, only the p-values of FAIL results below alpha go through
//! the step-up procedure. A candidate can move to PASS, never the reverse.

use crate::config::{FdrConfig, FdrMethod};
use crate::report::{TestResult, TestStatus};
use indexmap::IndexMap;

/// Apply FDR correction, returning the results in their original order
pub fn correct(mut results: Vec<TestResult>, config: &FdrConfig) -> Vec<TestResult> {
    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (index, result) in results.iter().enumerate() {
        if result.p_value().is_none() {
            continue;
        }
        let key = if config.apply_per_test_type {
            result.test_name.clone()
        } else {
            String::from("all")
        };
        groups.entry(key).or_default().push(index);
    }

    for (group, members) in groups {
        if members.len() <= 1 {
            continue;
        }
        let candidates: Vec<(usize, f64)> = members
            .iter()
            .filter(|&&i| results[i].status == TestStatus::Fail)
            .filter_map(|&i| results[i].p_value().map(|p| (i, p)))
            .filter(|&(_, p)| p < config.alpha)
            .collect();
        if candidates.is_empty() {
            continue;
        }

        let p_values: Vec<f64> = candidates.iter().map(|&(_, p)| p).collect();
        let adjusted = adjust_p_values(&p_values, config.method);

        let mut flipped = 0;
        for (&(index, _), adjusted_p) in candidates.iter().zip(adjusted) {
            let result = &mut results[index];
            if adjusted_p >= config.alpha {
                result.status = TestStatus::Pass;
                result
                    .details
                    .insert("fdr_original_status".into(), TestStatus::Fail.as_str().into());
                flipped += 1;
            } else {
                result.details.insert("fdr_corrected".into(), true.into());
            }
            result.details.insert("fdr_method".into(), config.method.as_str().into());
            result.details.insert("fdr_alpha".into(), config.alpha.into());
            result.details.insert("fdr_adjusted_p_value".into(), adjusted_p.into());
        }

        if flipped > 0 {
            log::info!(
                "FDR ({}) on group '{}': {} of {} failures no longer significant",
                config.method.as_str(),
                group,
                flipped,
                candidates.len()
            );
        }
    }

    results
}

/// Step-up adjusted p-values, in input order
pub fn adjust_p_values(p_values: &[f64], method: FdrMethod) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }
    let c_m = match method {
        FdrMethod::BenjaminiHochberg => 1.0,
        FdrMethod::BenjaminiYekutieli => (1..=m).map(|i| 1.0 / i as f64).sum(),
    };

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running_min = f64::INFINITY;
    for (rank_index, &original) in order.iter().enumerate().rev() {
        let rank = (rank_index + 1) as f64;
        let value = (p_values[original] * m as f64 * c_m / rank).min(1.0);
        running_min = running_min.min(value);
        adjusted[original] = running_min;
    }
    adjusted
}
