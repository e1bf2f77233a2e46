//! Primitive Evaluators
//!
//! The five coil primitives, each a pure function of the tick-time feature
//! vector and the threshold config. Missing or insufficient inputs degrade
//! to `passed = false, score = 0`: a failing primitive is a normal outcome,
//! never an error, and nothing here mutates state.

use serde_json::json;

use super::thresholds::ThresholdConfig;
use crate::domain::stats::clip01;
use crate::domain::{FeatureVector, PrimitiveOutcome, PrimitiveSet, RegimeVector};

/// Volatility Compression: short-horizon ATR% collapsed relative to the
/// long horizon, trades spacing out, and return dispersion still shrinking.
pub fn eval_vc(f: &FeatureVector, t: &ThresholdConfig) -> PrimitiveOutcome {
    let (Some(ratio), Some(itt_slope), Some(std), Some(std_prev)) =
        (f.vc_ratio, f.itt_slope, f.ret_std_15m, f.ret_std_15m_prev)
    else {
        return PrimitiveOutcome::fail();
    };

    let compressed = ratio <= t.vc_max;
    let slowing = itt_slope > 0.0;
    let contracting = std < std_prev;

    let sub_ratio = clip01(1.0 - ratio / t.vc_max);
    let sub_slow = if slowing { 1.0 } else { 0.0 };
    let sub_contract = if std_prev > 1e-12 {
        clip01((std_prev - std) / std_prev)
    } else {
        0.0
    };

    PrimitiveOutcome {
        passed: compressed && slowing && contracting,
        score: (sub_ratio + sub_slow + sub_contract) / 3.0,
    }
}

/// Order-Flow Stillness: flat CVD, uniform swap sizes, high buy/sell
/// alternation.
pub fn eval_ofs(f: &FeatureVector, t: &ThresholdConfig) -> PrimitiveOutcome {
    let (Some(slope), Some(cv), Some(alt)) =
        (f.cvd_slope_60m, f.swap_size_cv_15m, f.alternation_15m)
    else {
        return PrimitiveOutcome::fail();
    };

    let still = slope.abs() <= t.ofs_cvd_slope_max;
    let uniform = cv <= t.ofs_size_cv_max;
    let alternating = alt >= t.ofs_alternation_min;

    let sub_still = if t.ofs_cvd_slope_max > 0.0 {
        clip01(1.0 - slope.abs() / t.ofs_cvd_slope_max)
    } else if slope.abs() <= 1e-12 {
        1.0
    } else {
        0.0
    };
    let sub_uniform = if t.ofs_size_cv_max > 0.0 {
        clip01(1.0 - cv / t.ofs_size_cv_max)
    } else {
        0.0
    };
    let sub_alt = if t.ofs_alternation_min > 0.0 {
        clip01(alt / t.ofs_alternation_min)
    } else {
        clip01(alt)
    };

    PrimitiveOutcome {
        passed: still && uniform && alternating,
        score: (sub_still + sub_uniform + sub_alt) / 3.0,
    }
}

/// Liquidity Thinness: cheap to move price 1%, even depth ladder, and LP
/// supply not parked in a few hands (when the holder feed reports it).
pub fn eval_lt(f: &FeatureVector, t: &ThresholdConfig) -> PrimitiveOutcome {
    let (Some(depth), Some(continuity)) = (f.depth_1pct, f.depth_continuity) else {
        return PrimitiveOutcome::fail();
    };

    let share_ok = match f.lp_top10_share {
        Some(share) => share <= t.lt_lp_share_max,
        None => !t.lt_require_lp_share,
    };

    let thin = depth <= t.lt_depth_max;
    let even = continuity >= t.lt_continuity_min;

    let sub_thin = clip01(1.0 - depth / t.lt_depth_max);
    let sub_even = if t.lt_continuity_min < 1.0 {
        clip01((continuity - t.lt_continuity_min) / (1.0 - t.lt_continuity_min))
    } else {
        clip01(continuity)
    };
    let sub_share = match f.lp_top10_share {
        Some(share) if t.lt_lp_share_max > 0.0 => clip01(1.0 - share / t.lt_lp_share_max),
        Some(_) => 0.0,
        None if !t.lt_require_lp_share => 1.0,
        None => 0.0,
    };

    PrimitiveOutcome {
        passed: thin && even && share_ok,
        score: (sub_thin + sub_even + sub_share) / 3.0,
    }
}

/// Wallet Convergence: qualified wallets arriving, inflow broadening across
/// buyers, overlap with the prior-winners cohort, and no dominant whale.
///
/// The composite score uses the fixed reference scales 5 arrivals/min,
/// -0.08 Gini change and 0.2 Jaccard.
pub fn eval_wc(f: &FeatureVector, t: &ThresholdConfig) -> PrimitiveOutcome {
    let (Some(arrivals), Some(gini_delta), Some(jaccard), Some(whale)) = (
        f.arrivals_per_min,
        f.gini_delta,
        f.prior_cohort_jaccard,
        f.whale_share,
    ) else {
        return PrimitiveOutcome::fail();
    };

    let score = 0.45 * clip01(arrivals / 5.0)
        + 0.25 * clip01(-gini_delta / 0.08)
        + 0.30 * clip01(jaccard / 0.2);

    let passed = arrivals >= t.wc_arrivals_min
        && gini_delta <= t.wc_gini_delta_max
        && jaccard >= t.wc_jaccard_min
        && whale <= t.wc_whale_share_max
        && score >= t.wc_score_min;

    PrimitiveOutcome { passed, score }
}

/// Retail Quiet: watcher proxy climbing while trade density stays below the
/// cross-sectional norm.
pub fn eval_rq(
    f: &FeatureVector,
    regime: Option<&RegimeVector>,
    t: &ThresholdConfig,
) -> PrimitiveOutcome {
    let (Some(slope), Some(regime)) = (f.watcher_slope, regime) else {
        return PrimitiveOutcome::fail();
    };

    let watching = slope > 0.0;
    let quiet = regime.td <= t.rq_td_z_max;

    let sub_watch = if t.rq_watcher_slope_ref > 0.0 {
        clip01(slope / t.rq_watcher_slope_ref)
    } else if watching {
        1.0
    } else {
        0.0
    };
    let sub_quiet = if t.rq_td_z_max.abs() > 1e-12 {
        clip01(1.0 - regime.td / t.rq_td_z_max)
    } else if quiet {
        1.0
    } else {
        0.0
    };

    PrimitiveOutcome {
        passed: watching && quiet,
        score: (sub_watch + sub_quiet) / 2.0,
    }
}

/// Evaluate all five primitives for one pool at one tick.
pub fn evaluate_all(
    f: &FeatureVector,
    regime: Option<&RegimeVector>,
    t: &ThresholdConfig,
) -> PrimitiveSet {
    PrimitiveSet {
        vc: eval_vc(f, t),
        ofs: eval_ofs(f, t),
        lt: eval_lt(f, t),
        wc: eval_wc(f, t),
        rq: eval_rq(f, regime, t),
    }
}

/// Weighted composite of the five primitive scores.
pub fn composite_score(set: &PrimitiveSet, t: &ThresholdConfig) -> f64 {
    let w = &t.weights;
    let total = w.sum();
    if total <= 0.0 {
        return 0.0;
    }
    (w.vc * set.vc.score
        + w.ofs * set.ofs.score
        + w.lt * set.lt.score
        + w.wc * set.wc.score
        + w.rq * set.rq.score)
        / total
}

/// Human-readable threshold summary stored alongside each signal.
pub fn reason_line(t: &ThresholdConfig) -> String {
    format!(
        "SCF5:vc<={},|ofs|<={},lt<={},wc>={},rq<={}",
        t.vc_max, t.ofs_cvd_slope_max, t.lt_depth_max, t.wc_score_min, t.rq_td_z_max
    )
}

/// Per-primitive audit payload: which primitives passed, their scores and
/// the thresholds in force.
pub fn reasons_json(set: &PrimitiveSet, t: &ThresholdConfig) -> serde_json::Value {
    json!({
        "vc": { "passed": set.vc.passed, "score": set.vc.score, "max_ratio": t.vc_max },
        "ofs": { "passed": set.ofs.passed, "score": set.ofs.score, "max_cvd_slope": t.ofs_cvd_slope_max },
        "lt": { "passed": set.lt.passed, "score": set.lt.score, "max_depth_1pct": t.lt_depth_max },
        "wc": { "passed": set.wc.passed, "score": set.wc.score, "min_score": t.wc_score_min },
        "rq": { "passed": set.rq.passed, "score": set.rq.score, "max_td_z": t.rq_td_z_max },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coiled_features() -> FeatureVector {
        FeatureVector {
            price: Some(1.0),
            atr_pct_15m: Some(0.2),
            atr_pct_24h: Some(0.8),
            vc_ratio: Some(0.25),
            ret_std_15m: Some(0.002),
            ret_std_15m_prev: Some(0.004),
            itt_slope: Some(0.5),
            cvd: 1000.0,
            cvd_slope_60m: Some(5.0),
            swap_size_cv_15m: Some(0.3),
            alternation_15m: Some(0.7),
            swaps_per_min: Some(1.0),
            depth_1pct: Some(800.0),
            depth_continuity: Some(0.9),
            lp_top10_share: None,
            arrivals_per_min: Some(4.0),
            inflow_gini: Some(0.3),
            gini_delta: Some(-0.10),
            prior_cohort_jaccard: Some(0.2),
            whale_share: Some(0.15),
            watcher_slope: Some(2.0),
            watcher_count: 40,
            authority: Default::default(),
            obs: 100,
        }
    }

    fn quiet_regime() -> RegimeVector {
        RegimeVector {
            cr: -0.5,
            td: -0.2,
            cp: 0.0,
        }
    }

    #[test]
    fn all_five_pass_on_coiled_inputs() {
        let t = ThresholdConfig::default();
        let set = evaluate_all(&coiled_features(), Some(&quiet_regime()), &t);
        assert!(set.vc.passed, "vc {:?}", set.vc);
        assert!(set.ofs.passed, "ofs {:?}", set.ofs);
        assert!(set.lt.passed, "lt {:?}", set.lt);
        assert!(set.wc.passed, "wc {:?}", set.wc);
        assert!(set.rq.passed, "rq {:?}", set.rq);
        assert!(set.all_five());
    }

    #[test]
    fn empty_vector_fails_everything_without_error() {
        let t = ThresholdConfig::default();
        let set = evaluate_all(&FeatureVector::default(), None, &t);
        assert!(!set.vc.passed && set.vc.score == 0.0);
        assert!(!set.ofs.passed && set.ofs.score == 0.0);
        assert!(!set.lt.passed && set.lt.score == 0.0);
        assert!(!set.wc.passed && set.wc.score == 0.0);
        assert!(!set.rq.passed && set.rq.score == 0.0);
    }

    #[test]
    fn vc_fails_when_dispersion_expands() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.ret_std_15m = Some(0.006);
        f.ret_std_15m_prev = Some(0.004);
        assert!(!eval_vc(&f, &t).passed);
    }

    #[test]
    fn vc_fails_when_trades_accelerate() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.itt_slope = Some(-0.1);
        assert!(!eval_vc(&f, &t).passed);
    }

    #[test]
    fn ofs_fails_on_drifting_cvd() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.cvd_slope_60m = Some(-500.0);
        assert!(!eval_ofs(&f, &t).passed);
    }

    #[test]
    fn lt_respects_lp_share_when_known() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.lp_top10_share = Some(0.9);
        assert!(!eval_lt(&f, &t).passed);
        f.lp_top10_share = Some(0.3);
        assert!(eval_lt(&f, &t).passed);
    }

    #[test]
    fn lt_missing_share_fails_only_when_required() {
        let mut t = ThresholdConfig::default();
        let f = coiled_features();
        assert!(eval_lt(&f, &t).passed);
        t.lt_require_lp_share = true;
        assert!(!eval_lt(&f, &t).passed);
    }

    #[test]
    fn wc_score_matches_reference_formula() {
        let t = ThresholdConfig::default();
        let f = coiled_features();
        let out = eval_wc(&f, &t);
        // 0.45*min(1,4/5) + 0.25*min(1,0.10/0.08) + 0.30*min(1,0.2/0.2)
        let expected = 0.45 * 0.8 + 0.25 * 1.0 + 0.30 * 1.0;
        assert_relative_eq!(out.score, expected, epsilon = 1e-12);
        assert!(out.passed);
    }

    #[test]
    fn wc_fails_on_concentrating_inflow() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.gini_delta = Some(0.02);
        assert!(!eval_wc(&f, &t).passed);
    }

    #[test]
    fn wc_fails_on_whale_dominance() {
        let t = ThresholdConfig::default();
        let mut f = coiled_features();
        f.whale_share = Some(0.6);
        assert!(!eval_wc(&f, &t).passed);
    }

    #[test]
    fn rq_needs_regime_context() {
        let t = ThresholdConfig::default();
        let f = coiled_features();
        assert!(!eval_rq(&f, None, &t).passed);
        assert!(eval_rq(&f, Some(&quiet_regime()), &t).passed);
    }

    #[test]
    fn rq_fails_when_trade_density_is_hot() {
        let t = ThresholdConfig::default();
        let f = coiled_features();
        let hot = RegimeVector {
            td: 2.0,
            ..quiet_regime()
        };
        assert!(!eval_rq(&f, Some(&hot), &t).passed);
    }

    #[test]
    fn composite_uses_weights() {
        let mut t = ThresholdConfig::default();
        let set = evaluate_all(&coiled_features(), Some(&quiet_regime()), &t);
        let equal = composite_score(&set, &t);
        assert!(equal > 0.0 && equal <= 1.0);

        // Shifting all weight onto WC reproduces the WC score.
        t.weights.vc = 0.0;
        t.weights.ofs = 0.0;
        t.weights.lt = 0.0;
        t.weights.rq = 0.0;
        t.weights.wc = 1.0;
        let wc_only = composite_score(&set, &t);
        assert_relative_eq!(wc_only, set.wc.score, epsilon = 1e-12);
    }

    #[test]
    fn reasons_payload_names_all_primitives() {
        let t = ThresholdConfig::default();
        let set = evaluate_all(&coiled_features(), Some(&quiet_regime()), &t);
        let reasons = reasons_json(&set, &t);
        for key in ["vc", "ofs", "lt", "wc", "rq"] {
            assert!(reasons.get(key).is_some(), "missing {key}");
            assert!(reasons[key]["passed"].is_boolean());
            assert!(reasons[key]["score"].is_number());
        }
    }
}
