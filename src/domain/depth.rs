//! AMM Depth Math
//!
//! Stateless constant-product depth computation. Depth is always derived on
//! demand from the latest raw reserves so it can never go stale relative to
//! the reserve snapshot it was computed from.
//!
//! For a constant-product pool with reserves (x, y) and input fee f, spot
//! price is p = y/x and the invariant gives p' = y'^2 / k after a quote-side
//! buy. Pushing price up by a fraction m therefore needs
//! `dy = y * (sqrt(1 + m) - 1)` of effective quote, or `dy / (1 - f)` of
//! input notional once the fee is paid on the way in.

/// Quote notional required to move the pool price up by `move_frac`
/// (0.01 = +1%) from reserves (x, y) with an input fee in basis points.
///
/// Returns None for non-positive reserves, a non-positive move, or a fee at
/// or above 100%.
pub fn depth_quote_notional(x: f64, y: f64, fee_bps: u32, move_frac: f64) -> Option<f64> {
    if x <= 0.0 || y <= 0.0 || move_frac <= 0.0 {
        return None;
    }
    let fee = fee_bps as f64 / 10_000.0;
    if fee >= 1.0 {
        return None;
    }
    let effective = y * ((1.0 + move_frac).sqrt() - 1.0);
    Some(effective / (1.0 - fee))
}

/// Depth at each step of a ladder of price moves, e.g. [0.5%, 1%, 2%, 5%].
pub fn depth_ladder(x: f64, y: f64, fee_bps: u32, steps: &[f64]) -> Option<Vec<f64>> {
    steps
        .iter()
        .map(|m| depth_quote_notional(x, y, fee_bps, *m))
        .collect()
}

/// Smoothness of the ladder: mean of min/max ratios across consecutive
/// steps. 1.0 means perfectly even depth growth; a cliff between two rungs
/// pulls it toward 0.
pub fn depth_continuity(ladder: &[f64]) -> Option<f64> {
    if ladder.len() < 2 {
        return None;
    }
    let mut acc = 0.0;
    for pair in ladder.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a <= 0.0 || b <= 0.0 {
            return None;
        }
        acc += a.min(b) / a.max(b);
    }
    Some(acc / (ladder.len() - 1) as f64)
}
