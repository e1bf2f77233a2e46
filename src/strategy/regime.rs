//! Regime Classifier
//!
//! Cross-sectional context computed once per tick over every active pool in
//! the venue family: z-scores of short-horizon ATR%, trade density and CVD
//! pressure. The classifier produces one immutable map per tick; evaluators
//! read that snapshot and never observe a half-updated regime vector.

use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{FeatureVector, RegimeVector};

/// One pool's inputs to the cross-section.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeInputs {
    pub atr_pct_15m: Option<f64>,
    pub swaps_per_min: Option<f64>,
    pub cvd_slope_abs: Option<f64>,
}

impl RegimeInputs {
    pub fn from_features(f: &FeatureVector) -> Self {
        Self {
            atr_pct_15m: f.atr_pct_15m,
            swaps_per_min: f.swaps_per_min,
            cvd_slope_abs: f.cvd_slope_60m.map(f64::abs),
        }
    }
}

/// The immutable per-tick cross-section result.
#[derive(Debug, Default)]
pub struct RegimeMap {
    vectors: HashMap<String, RegimeVector>,
}

impl RegimeMap {
    pub fn get(&self, pool: &str) -> Option<&RegimeVector> {
        self.vectors.get(pool)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Cross-sectional z-score classifier.
pub struct RegimeClassifier;

impl RegimeClassifier {
    /// Classify all active pools in one pass. A pool missing an input gets a
    /// neutral 0.0 for that dimension; a degenerate cross-section (fewer
    /// than two reporting pools, or zero dispersion) is neutral for
    /// everyone.
    pub fn classify(inputs: &[(String, RegimeInputs)]) -> Arc<RegimeMap> {
        let cr = zscores(inputs, |i| i.atr_pct_15m);
        let td = zscores(inputs, |i| i.swaps_per_min);
        let cp = zscores(inputs, |i| i.cvd_slope_abs);

        let mut vectors = HashMap::with_capacity(inputs.len());
        for (pool, _) in inputs {
            vectors.insert(
                pool.clone(),
                RegimeVector {
                    cr: cr.get(pool).copied().unwrap_or(0.0),
                    td: td.get(pool).copied().unwrap_or(0.0),
                    cp: cp.get(pool).copied().unwrap_or(0.0),
                },
            );
        }
        Arc::new(RegimeMap { vectors })
    }
}

fn zscores<F>(inputs: &[(String, RegimeInputs)], pick: F) -> HashMap<String, f64>
where
    F: Fn(&RegimeInputs) -> Option<f64>,
{
    let present: Vec<(&String, f64)> = inputs
        .iter()
        .filter_map(|(pool, i)| pick(i).map(|v| (pool, v)))
        .collect();

    let mut out = HashMap::new();
    if present.len() < 2 {
        return out;
    }
    let values: Vec<f64> = present.iter().map(|(_, v)| *v).collect();
    let mean = values.as_slice().mean();
    let std = values.as_slice().std_dev();
    if !std.is_finite() || std < 1e-12 {
        return out;
    }
    for (pool, v) in present {
        out.insert(pool.clone(), (v - mean) / std);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs(pool: &str, atr: f64, spm: f64, cvd: f64) -> (String, RegimeInputs) {
        (
            pool.to_string(),
            RegimeInputs {
                atr_pct_15m: Some(atr),
                swaps_per_min: Some(spm),
                cvd_slope_abs: Some(cvd),
            },
        )
    }

    #[test]
    fn zscores_center_the_cross_section() {
        let pools = vec![
            inputs("A", 1.0, 10.0, 5.0),
            inputs("B", 2.0, 10.0, 5.0),
            inputs("C", 3.0, 10.0, 5.0),
        ];
        let map = RegimeClassifier::classify(&pools);
        let a = map.get("A").unwrap();
        let c = map.get("C").unwrap();
        assert_relative_eq!(a.cr, -1.0, epsilon = 1e-9);
        assert_relative_eq!(c.cr, 1.0, epsilon = 1e-9);
        // Identical trade density: zero dispersion is neutral, not NaN.
        assert_relative_eq!(a.td, 0.0);
        assert_relative_eq!(a.cp, 0.0);
    }

    #[test]
    fn single_pool_cross_section_is_neutral() {
        let pools = vec![inputs("A", 1.0, 10.0, 5.0)];
        let map = RegimeClassifier::classify(&pools);
        let a = map.get("A").unwrap();
        assert_relative_eq!(a.cr, 0.0);
        assert_relative_eq!(a.td, 0.0);
    }

    #[test]
    fn missing_inputs_are_neutral_for_that_pool_only() {
        let mut pools = vec![
            inputs("A", 1.0, 5.0, 1.0),
            inputs("B", 3.0, 15.0, 3.0),
            inputs("C", 2.0, 10.0, 2.0),
        ];
        pools.push((
            "D".to_string(),
            RegimeInputs {
                atr_pct_15m: None,
                swaps_per_min: Some(10.0),
                cvd_slope_abs: None,
            },
        ));
        let map = RegimeClassifier::classify(&pools);
        assert_relative_eq!(map.get("D").unwrap().cr, 0.0);
        assert!(map.get("B").unwrap().cr > 0.0);
        assert_eq!(map.len(), 4);
    }
}
