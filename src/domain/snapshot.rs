//! Feature Snapshots and Signals
//!
//! Data records exchanged between the aggregator, the evaluators and the
//! persistence boundary. A `FeatureSnapshot` is latest-only per pool
//! (upserted, never appended); a `DetectorSignal` is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detection phase of a pool. `Enter` appears only on the tick that pulses a
/// signal; the machine itself immediately resets to `Quiet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoilState {
    Quiet,
    Coil,
    Armed,
    Enter,
}

impl CoilState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoilState::Quiet => "QUIET",
            CoilState::Coil => "COIL",
            CoilState::Armed => "ARMED",
            CoilState::Enter => "ENTER",
        }
    }
}

/// Outcome of one primitive evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveOutcome {
    pub passed: bool,
    /// Strength in [0, 1]; 0 when the inputs were missing.
    pub score: f64,
}

impl PrimitiveOutcome {
    pub fn fail() -> Self {
        Self {
            passed: false,
            score: 0.0,
        }
    }
}

/// The five primitive outcomes for one pool at one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrimitiveSet {
    pub vc: PrimitiveOutcome,
    pub ofs: PrimitiveOutcome,
    pub lt: PrimitiveOutcome,
    pub wc: PrimitiveOutcome,
    pub rq: PrimitiveOutcome,
}

impl PrimitiveSet {
    pub fn core_three(&self) -> bool {
        self.vc.passed && self.ofs.passed && self.lt.passed
    }

    pub fn all_five(&self) -> bool {
        self.core_three() && self.wc.passed && self.rq.passed
    }
}

/// Cross-sectional regime context attached to every snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegimeVector {
    /// Compression z-score (ATR% 15m across active pools).
    pub cr: f64,
    /// Trade-density z-score (swaps per minute).
    pub td: f64,
    /// CVD-pressure z-score (|CVD slope|).
    pub cp: f64,
}

/// Latest authority knowledge for a pool's mint. Flags stay None until an
/// authority event reports them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuthorityFlags {
    pub fee_switch: Option<bool>,
    pub tax_flag: Option<bool>,
    pub mint_auth: Option<bool>,
    pub freeze_auth: Option<bool>,
}

impl AuthorityFlags {
    /// True when nothing known disqualifies the mint. Unknown flags do not
    /// disqualify; a known-true tax or mint authority does.
    pub fn is_clean(&self) -> bool {
        self.tax_flag != Some(true) && self.mint_auth != Some(true)
    }
}

/// Everything the primitive evaluators read for one pool at one tick.
///
/// Fields are None when the pool is too young or the input never arrived;
/// evaluators degrade those to failed primitives rather than erroring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub price: Option<f64>,
    pub atr_pct_15m: Option<f64>,
    pub atr_pct_24h: Option<f64>,
    pub vc_ratio: Option<f64>,
    pub ret_std_15m: Option<f64>,
    /// Prior tick's value, for the contraction check.
    pub ret_std_15m_prev: Option<f64>,
    /// Inter-trade-time EMA slope over 15m, seconds per minute.
    pub itt_slope: Option<f64>,
    pub cvd: f64,
    /// CVD slope over 60m, quote units per minute.
    pub cvd_slope_60m: Option<f64>,
    pub swap_size_cv_15m: Option<f64>,
    pub alternation_15m: Option<f64>,
    pub swaps_per_min: Option<f64>,
    pub depth_1pct: Option<f64>,
    pub depth_continuity: Option<f64>,
    pub lp_top10_share: Option<f64>,
    pub arrivals_per_min: Option<f64>,
    pub inflow_gini: Option<f64>,
    /// Signed change in inflow Gini versus the lagged baseline; negative
    /// means inflow is broadening across distinct buyers.
    pub gini_delta: Option<f64>,
    pub prior_cohort_jaccard: Option<f64>,
    pub whale_share: Option<f64>,
    /// Watcher-proxy slope, watchers per minute.
    pub watcher_slope: Option<f64>,
    pub watcher_count: u64,
    pub authority: AuthorityFlags,
    /// Swaps folded since pool creation.
    pub obs: u64,
}

/// One completed recompute tick for one pool. Always written whole; a
/// partially-computed tick is never observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub ts: DateTime<Utc>,
    pub pool: String,
    pub token: Option<String>,
    pub features: FeatureVector,
    pub regime: RegimeVector,
    pub primitives: PrimitiveSet,
    pub state: CoilState,
}

/// Emitted trade signal. One row per actionable ENTER, deduplicated by the
/// cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSignal {
    pub ts: DateTime<Utc>,
    pub pool: String,
    pub token: Option<String>,
    /// Long-only for now.
    pub signal_type: String,
    /// Weighted composite of the five primitive scores.
    pub score: f64,
    /// Human-readable threshold summary.
    pub reason: String,
    /// Per-primitive contributions, JSON for the audit trail.
    pub reasons: serde_json::Value,
    pub state: CoilState,
}
