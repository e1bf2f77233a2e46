//! Wallet Cohorts
//!
//! Tracks which wallets are newly active in a pool, scores their behavioral
//! quality, and maintains the bounded cohorts the wallet-convergence and
//! retail-quiet primitives read: qualified first-buyers, per-buyer net
//! inflow, and the dust-buy watcher proxy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::stats::{clip01, ols_slope_per_min, TimedRing};
use crate::domain::events::Side;

/// Hard cap on remembered first-seen wallets per pool.
const MAX_SEEN_WALLETS: usize = 10_000;

/// Behavioral features for one wallet, each normalized to [0, 1].
///
/// Profiling wallets is an upstream concern; the detector only combines the
/// features into a quality score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalletProfile {
    /// Prior profitable exits.
    pub prior_exits: f64,
    /// How recently the wallet was active elsewhere.
    pub recency: f64,
    /// Execution quality (fill timing, slippage discipline).
    pub execution: f64,
    /// Holding discipline.
    pub holding: f64,
    /// Cross-pool consistency.
    pub consistency: f64,
    /// Bot likelihood; penalized.
    pub bot_likelihood: f64,
}

impl Default for WalletProfile {
    fn default() -> Self {
        Self {
            prior_exits: 0.5,
            recency: 0.5,
            execution: 0.5,
            holding: 0.5,
            consistency: 0.5,
            bot_likelihood: 0.5,
        }
    }
}

/// Composite wallet quality score in [0, 1].
pub fn quality_score(p: &WalletProfile) -> f64 {
    clip01(
        0.28 * p.prior_exits + 0.18 * p.recency + 0.18 * p.execution + 0.14 * p.holding
            + 0.12 * p.consistency
            - 0.10 * p.bot_likelihood,
    )
}

/// What one swap contributed to the cohorts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CohortObservation {
    pub first_buy: bool,
    pub qualified_added: bool,
    pub dust_buy: bool,
}

/// Per-pool cohort state folded from the swap stream.
#[derive(Debug)]
pub struct CohortTracker {
    window: Duration,
    qs_min: f64,
    dust_notional: f64,
    /// First-seen timestamp per wallet, bounded by MAX_SEEN_WALLETS.
    seen: HashMap<String, DateTime<Utc>>,
    /// Qualified first-buyers with admission timestamps.
    qualified: TimedRing<String>,
    /// Signed quote flow attributed to wallets first seen inside the window.
    inflows: TimedRing<(String, f64)>,
}

impl CohortTracker {
    pub fn new(window: Duration, qs_min: f64, dust_notional: f64) -> Self {
        Self {
            window,
            qs_min,
            dust_notional,
            seen: HashMap::new(),
            qualified: TimedRing::new(window),
            inflows: TimedRing::new(window),
        }
    }

    /// Fold one swap into the cohorts.
    ///
    /// `qs` is the wallet's quality score when a profile was available; a
    /// wallet with no score can still count as a first-buyer and dust watcher
    /// but never joins the qualified cohort.
    pub fn observe_swap(
        &mut self,
        ts: DateTime<Utc>,
        wallet: &str,
        side: Side,
        quote_amt: f64,
        qs: Option<f64>,
    ) -> CohortObservation {
        let mut obs = CohortObservation::default();

        let newly_seen = !self.seen.contains_key(wallet);
        if newly_seen {
            if self.seen.len() >= MAX_SEEN_WALLETS {
                self.evict_oldest_seen();
            }
            self.seen.insert(wallet.to_string(), ts);
        }

        if newly_seen && side == Side::Buy {
            obs.first_buy = true;
            obs.dust_buy = quote_amt < self.dust_notional;
            if let Some(qs) = qs {
                if qs >= self.qs_min {
                    self.qualified.push(ts, wallet.to_string());
                    obs.qualified_added = true;
                }
            }
        }

        // Inflow attribution covers every trade by a wallet whose first
        // appearance is still inside the window, not just the first one.
        if let Some(first_seen) = self.seen.get(wallet) {
            if ts - *first_seen <= self.window {
                self.inflows
                    .push(ts, (wallet.to_string(), side.sign() * quote_amt));
            } else {
                self.inflows.prune(ts);
            }
        }

        self.qualified.prune(ts);
        obs
    }

    /// Qualified first-buys per minute over the cohort window.
    pub fn arrivals_per_min(&mut self, now: DateTime<Utc>) -> f64 {
        self.qualified.prune(now);
        let minutes = self.window.num_seconds() as f64 / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.qualified.len() as f64 / minutes
    }

    /// The current qualified cohort as a set.
    pub fn qualified_set(&mut self, now: DateTime<Utc>) -> HashSet<String> {
        self.qualified.prune(now);
        self.qualified.iter().map(|(_, w)| w.clone()).collect()
    }

    /// Net quote inflow per new buyer, descending by magnitude, capped at
    /// `top_n`.
    pub fn top_net_inflows(&mut self, now: DateTime<Utc>, top_n: usize) -> Vec<f64> {
        self.inflows.prune(now);
        let mut by_wallet: HashMap<&str, f64> = HashMap::new();
        for (_, (wallet, signed)) in self.inflows.iter() {
            *by_wallet.entry(wallet.as_str()).or_insert(0.0) += signed;
        }
        let mut flows: Vec<f64> = by_wallet.into_values().collect();
        flows.sort_by(|a, b| b.abs().partial_cmp(&a.abs()).unwrap_or(std::cmp::Ordering::Equal));
        flows.truncate(top_n);
        flows
    }

    /// Largest single buyer's share of total positive inflow.
    pub fn whale_share(&mut self, now: DateTime<Utc>, top_n: usize) -> Option<f64> {
        let flows = self.top_net_inflows(now, top_n);
        let positive: Vec<f64> = flows.iter().copied().filter(|f| *f > 0.0).collect();
        let total: f64 = positive.iter().sum();
        if total <= 0.0 {
            return None;
        }
        positive
            .iter()
            .cloned()
            .fold(None::<f64>, |acc, f| Some(acc.map_or(f, |a| a.max(f))))
            .map(|max| max / total)
    }

    fn evict_oldest_seen(&mut self) {
        if let Some(oldest) = self
            .seen
            .iter()
            .min_by_key(|(_, ts)| **ts)
            .map(|(w, _)| w.clone())
        {
            self.seen.remove(&oldest);
        }
    }
}

/// Dust-buy watcher proxy: a monotone counter sampled into a trailing ring
/// so its slope can be read over 15-30 minutes.
#[derive(Debug)]
pub struct WatcherProxy {
    count: u64,
    track: TimedRing<f64>,
}

impl WatcherProxy {
    pub fn new(window: Duration) -> Self {
        Self {
            count: 0,
            track: TimedRing::new(window),
        }
    }

    pub fn record(&mut self, ts: DateTime<Utc>) {
        self.count += 1;
        self.track.push(ts, self.count as f64);
    }

    /// Sample the current level without incrementing, so slope decays toward
    /// zero when dust buys stop.
    pub fn sample(&mut self, ts: DateTime<Utc>) {
        self.track.push(ts, self.count as f64);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Watchers gained per minute over the tracked window.
    pub fn slope_per_min(&mut self, now: DateTime<Utc>) -> Option<f64> {
        self.track.prune(now);
        ols_slope_per_min(self.track.iter())
    }
}
