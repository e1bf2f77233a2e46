//! Detection Thresholds
//!
//! One immutable `ThresholdConfig` value is passed into the evaluators and
//! the state machine each tick. Hot reload works by constructing a fresh
//! config (file base + `SCF_*` environment overrides) and swapping it in;
//! shared config is never mutated in place. A malformed override falls back
//! to the last-known-good config at the call site.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::WindowConfig;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("invalid value for {var}: {value:?}")]
    BadEnvValue { var: &'static str, value: String },

    #[error("threshold validation failed: {0}")]
    Invalid(String),
}

/// Relative weights of the five primitive scores in the composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrimitiveWeights {
    #[serde(default = "default_weight")]
    pub vc: f64,
    #[serde(default = "default_weight")]
    pub ofs: f64,
    #[serde(default = "default_weight")]
    pub lt: f64,
    #[serde(default = "default_weight")]
    pub wc: f64,
    #[serde(default = "default_weight")]
    pub rq: f64,
}

fn default_weight() -> f64 {
    0.2
}

impl Default for PrimitiveWeights {
    fn default() -> Self {
        Self {
            vc: 0.2,
            ofs: 0.2,
            lt: 0.2,
            wc: 0.2,
            rq: 0.2,
        }
    }
}

impl PrimitiveWeights {
    pub fn sum(&self) -> f64 {
        self.vc + self.ofs + self.lt + self.wc + self.rq
    }
}

/// All tunables for the primitive evaluators, the regime gate and the coil
/// state machine. Maps to the `[thresholds]` section of config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    // ===== Volatility Compression =====
    /// Maximum ATR%15m / ATR%24h ratio for compression.
    #[serde(default = "default_vc_max")]
    pub vc_max: f64,

    // ===== Order-Flow Stillness =====
    /// Maximum |CVD slope| over 60m, quote units per minute.
    #[serde(default = "default_ofs_cvd_slope_max")]
    pub ofs_cvd_slope_max: f64,
    /// Maximum 15m swap-size coefficient of variation.
    #[serde(default = "default_ofs_size_cv_max")]
    pub ofs_size_cv_max: f64,
    /// Minimum 15m buy/sell alternation index.
    #[serde(default = "default_ofs_alternation_min")]
    pub ofs_alternation_min: f64,

    // ===== Liquidity Thinness =====
    /// Maximum quote notional that moves price 1%.
    #[serde(default = "default_lt_depth_max")]
    pub lt_depth_max: f64,
    /// Minimum depth-ladder continuity.
    #[serde(default = "default_lt_continuity_min")]
    pub lt_continuity_min: f64,
    /// Maximum top-10-holder LP share, enforced only when the holder feed
    /// supplied a value (or when `lt_require_lp_share` is set).
    #[serde(default = "default_lt_lp_share_max")]
    pub lt_lp_share_max: f64,
    /// Fail LT whenever no LP-share figure is available.
    #[serde(default)]
    pub lt_require_lp_share: bool,
    /// Depth ladder steps as price-move fractions.
    #[serde(default = "default_depth_steps")]
    pub depth_steps: Vec<f64>,

    // ===== Wallet Convergence =====
    /// Minimum qualified first-buys per minute.
    #[serde(default = "default_wc_arrivals_min")]
    pub wc_arrivals_min: f64,
    /// Maximum (most negative allowed is unbounded) signed Gini change;
    /// broadening means the change is at or below this.
    #[serde(default = "default_wc_gini_delta_max")]
    pub wc_gini_delta_max: f64,
    /// Minimum Jaccard overlap with the prior-winners cohort.
    #[serde(default = "default_wc_jaccard_min")]
    pub wc_jaccard_min: f64,
    /// Maximum single-buyer share of new inflow.
    #[serde(default = "default_wc_whale_share_max")]
    pub wc_whale_share_max: f64,
    /// Composite WC score floor (SCF_WC_MIN).
    #[serde(default = "default_wc_score_min")]
    pub wc_score_min: f64,

    // ===== Retail Quiet =====
    /// Maximum trade-density z-score while watchers rise (SCF_RQ_MAX).
    #[serde(default = "default_rq_td_z_max")]
    pub rq_td_z_max: f64,
    /// Watcher slope (per minute) that maps to a full RQ sub-score.
    #[serde(default = "default_rq_watcher_slope_ref")]
    pub rq_watcher_slope_ref: f64,

    // ===== State machine windows =====
    /// Core-three primitives must hold this long before QUIET -> COIL.
    #[serde(default = "default_confirmation_window_secs")]
    pub confirmation_window_secs: u64,
    /// ARMED expires back to QUIET after this long without RQ.
    #[serde(default = "default_armed_window_secs")]
    pub armed_window_secs: u64,
    /// Signal dedup window per pool (SCF_DETECTOR_DEDUP_SEC).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    // ===== Cohort / aggregator tuning =====
    /// Minimum wallet quality score for cohort admission.
    #[serde(default = "default_qs_min")]
    pub qs_min: f64,
    /// Quote notional below which a first buy is a watcher, not a trade.
    #[serde(default = "default_dust_notional")]
    pub dust_notional: f64,
    /// Qualified-wallet cohort window in seconds.
    #[serde(default = "default_cohort_window_secs")]
    pub cohort_window_secs: u64,
    /// New-buyer distribution size for Gini / whale share.
    #[serde(default = "default_top_n_buyers")]
    pub top_n_buyers: usize,
    /// Baseline lag in seconds for the signed Gini change.
    #[serde(default = "default_gini_lag_secs")]
    pub gini_lag_secs: u64,
    /// Swaps required before a pool's features are computable.
    #[serde(default = "default_min_swaps")]
    pub min_swaps: u64,

    // ===== Gates =====
    /// Suppress ARMED -> ENTER outside compressive regimes.
    #[serde(default)]
    pub regime_gate_enabled: bool,
    /// Compression z-score above which the regime gate holds ENTER back.
    #[serde(default = "default_regime_cr_max")]
    pub regime_cr_max: f64,
    /// Suppress ENTER while the mint has a known-live tax or mint authority.
    #[serde(default = "default_require_clean_authority")]
    pub require_clean_authority: bool,

    #[serde(default)]
    pub weights: PrimitiveWeights,
}

fn default_vc_max() -> f64 {
    0.75
}
fn default_ofs_cvd_slope_max() -> f64 {
    100.0
}
fn default_ofs_size_cv_max() -> f64 {
    1.0
}
fn default_ofs_alternation_min() -> f64 {
    0.4
}
fn default_lt_depth_max() -> f64 {
    5_000.0
}
fn default_lt_continuity_min() -> f64 {
    // Closed-form constant-product ladders with the default doubling steps
    // sit near 0.47; the floor only bites when a richer depth source
    // reports a cliff.
    0.4
}
fn default_lt_lp_share_max() -> f64 {
    0.6
}
fn default_depth_steps() -> Vec<f64> {
    vec![0.005, 0.01, 0.02, 0.05]
}
fn default_wc_arrivals_min() -> f64 {
    3.0
}
fn default_wc_gini_delta_max() -> f64 {
    -0.05
}
fn default_wc_jaccard_min() -> f64 {
    0.12
}
fn default_wc_whale_share_max() -> f64 {
    0.25
}
fn default_wc_score_min() -> f64 {
    0.6
}
fn default_rq_td_z_max() -> f64 {
    0.5
}
fn default_rq_watcher_slope_ref() -> f64 {
    1.0
}
fn default_confirmation_window_secs() -> u64 {
    60
}
fn default_armed_window_secs() -> u64 {
    180
}
fn default_cooldown_secs() -> u64 {
    300
}
fn default_qs_min() -> f64 {
    0.40
}
fn default_dust_notional() -> f64 {
    5.0
}
fn default_cohort_window_secs() -> u64 {
    900
}
fn default_top_n_buyers() -> usize {
    10
}
fn default_gini_lag_secs() -> u64 {
    120
}
fn default_min_swaps() -> u64 {
    5
}
fn default_regime_cr_max() -> f64 {
    0.5
}
fn default_require_clean_authority() -> bool {
    true
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        // serde defaults are the single source of truth.
        toml::from_str("").expect("empty thresholds deserialize")
    }
}

impl ThresholdConfig {
    /// Validate ranges; called once on load and after every override pass.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.vc_max <= 0.0 {
            return Err(ThresholdError::Invalid(format!(
                "vc_max must be > 0, got {}",
                self.vc_max
            )));
        }
        if self.ofs_cvd_slope_max < 0.0 {
            return Err(ThresholdError::Invalid(
                "ofs_cvd_slope_max must be >= 0".into(),
            ));
        }
        if self.lt_depth_max <= 0.0 {
            return Err(ThresholdError::Invalid("lt_depth_max must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.lt_continuity_min) {
            return Err(ThresholdError::Invalid(
                "lt_continuity_min must be in [0, 1]".into(),
            ));
        }
        if self.depth_steps.len() < 2 || self.depth_steps.iter().any(|s| *s <= 0.0) {
            return Err(ThresholdError::Invalid(
                "depth_steps needs at least two positive rungs".into(),
            ));
        }
        if self.wc_gini_delta_max > 0.0 {
            return Err(ThresholdError::Invalid(
                "wc_gini_delta_max must be <= 0 (broadening)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.qs_min) {
            return Err(ThresholdError::Invalid("qs_min must be in [0, 1]".into()));
        }
        if self.confirmation_window_secs == 0 || self.armed_window_secs == 0 {
            return Err(ThresholdError::Invalid(
                "confirmation and armed windows must be > 0".into(),
            ));
        }
        if self.weights.sum() <= 0.0 {
            return Err(ThresholdError::Invalid(
                "primitive weights must sum to > 0".into(),
            ));
        }
        Ok(())
    }

    /// Apply `SCF_*` environment overrides onto a copy of this config.
    ///
    /// Returns the overridden config, or the first bad variable so the
    /// caller can keep its last-known-good value.
    pub fn with_env_overrides(&self) -> Result<Self, ThresholdError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Same as `with_env_overrides`, with an injectable variable source.
    pub fn with_overrides_from<F>(&self, lookup: F) -> Result<Self, ThresholdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = self.clone();
        read_f64(&lookup, "SCF_VC_MAX", &mut cfg.vc_max)?;
        read_f64(&lookup, "SCF_OFS_MAX", &mut cfg.ofs_cvd_slope_max)?;
        read_f64(&lookup, "SCF_LT_MAX", &mut cfg.lt_depth_max)?;
        read_f64(&lookup, "SCF_WC_MIN", &mut cfg.wc_score_min)?;
        read_f64(&lookup, "SCF_RQ_MAX", &mut cfg.rq_td_z_max)?;
        read_u64(&lookup, "SCF_DETECTOR_DEDUP_SEC", &mut cfg.cooldown_secs)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::seconds(self.confirmation_window_secs as i64)
    }

    pub fn armed_window(&self) -> Duration {
        Duration::seconds(self.armed_window_secs as i64)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }

    /// Aggregator tuning derived from this config.
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            qs_min: self.qs_min,
            dust_notional: self.dust_notional,
            cohort_window: Duration::seconds(self.cohort_window_secs as i64),
            watcher_window: Duration::minutes(30),
            depth_steps: self.depth_steps.clone(),
            top_n_buyers: self.top_n_buyers,
            gini_lag: Duration::seconds(self.gini_lag_secs as i64),
            min_swaps: self.min_swaps,
        }
    }
}

fn read_f64<F>(lookup: &F, var: &'static str, slot: &mut f64) -> Result<(), ThresholdError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ThresholdError::BadEnvValue { var, value: raw })?;
    }
    Ok(())
}

fn read_u64<F>(lookup: &F, var: &'static str, slot: &mut u64) -> Result<(), ThresholdError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ThresholdError::BadEnvValue { var, value: raw })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ThresholdConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.weights.sum() - 1.0).abs() < 1e-12);
        assert_eq!(cfg.cooldown_secs, 300);
    }

    #[test]
    fn toml_section_overrides_defaults() {
        let cfg: ThresholdConfig = toml::from_str(
            r#"
            vc_max = 0.5
            wc_arrivals_min = 4.0
            [weights]
            vc = 0.4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.vc_max, 0.5);
        assert_eq!(cfg.wc_arrivals_min, 4.0);
        assert_eq!(cfg.weights.vc, 0.4);
        assert_eq!(cfg.weights.ofs, 0.2);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.lt_depth_max, 5_000.0);
    }

    #[test]
    fn bad_gini_threshold_rejected() {
        let mut cfg = ThresholdConfig::default();
        cfg.wc_gini_delta_max = 0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_map_env_names_onto_fields() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("SCF_VC_MAX", "0.5"),
            ("SCF_OFS_MAX", "42.0"),
            ("SCF_LT_MAX", "1234"),
            ("SCF_WC_MIN", "0.7"),
            ("SCF_RQ_MAX", "0.1"),
            ("SCF_DETECTOR_DEDUP_SEC", "600"),
        ]
        .into_iter()
        .collect();

        let cfg = ThresholdConfig::default()
            .with_overrides_from(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.vc_max, 0.5);
        assert_eq!(cfg.ofs_cvd_slope_max, 42.0);
        assert_eq!(cfg.lt_depth_max, 1234.0);
        assert_eq!(cfg.wc_score_min, 0.7);
        assert_eq!(cfg.rq_td_z_max, 0.1);
        assert_eq!(cfg.cooldown_secs, 600);
        // Unrelated fields untouched.
        assert_eq!(cfg.wc_arrivals_min, 3.0);
    }

    #[test]
    fn malformed_override_reports_the_variable() {
        let err = ThresholdConfig::default()
            .with_overrides_from(|var| (var == "SCF_VC_MAX").then(|| "not-a-number".to_string()))
            .unwrap_err();
        match err {
            ThresholdError::BadEnvValue { var, .. } => assert_eq!(var, "SCF_VC_MAX"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn out_of_range_override_fails_validation() {
        let err = ThresholdConfig::default()
            .with_overrides_from(|var| (var == "SCF_VC_MAX").then(|| "-1.0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ThresholdError::Invalid(_)));
    }
}
