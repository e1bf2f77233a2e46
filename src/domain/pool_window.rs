//! Windowed Stat Aggregator
//!
//! One `PoolWindowState` per active pool, owned exclusively by the fold path.
//! `fold` is called exactly once per event in per-pool slot order and is the
//! only mutation point; evaluators read a derived `FeatureVector` produced at
//! tick time. All accumulators are deterministic functions of the event
//! sequence, so replaying a stream reproduces CVD and every EMA bit-for-bit.

use chrono::{DateTime, Duration, Utc};

use super::events::{EventError, LiquidityEvent, NormalizedEvent, Side, SwapEvent};
use super::snapshot::{AuthorityFlags, FeatureSnapshot, FeatureVector};
use super::stats::{coefficient_of_variation, mean_std, ols_slope_per_min, TimeDecayEma, TimedRing};
use super::wallet_cohort::{CohortTracker, WatcherProxy};
use super::depth;
use std::collections::HashSet;

const TAU_15M_SECS: f64 = 900.0;
const TAU_24H_SECS: f64 = 86_400.0;

/// Tuning for the per-pool rolling state.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Minimum quality score for cohort admission.
    pub qs_min: f64,
    /// Quote notional below which a first buy counts as a watcher.
    pub dust_notional: f64,
    /// Qualified-wallet cohort window.
    pub cohort_window: Duration,
    /// Watcher-proxy slope window.
    pub watcher_window: Duration,
    /// Depth ladder steps as price-move fractions.
    pub depth_steps: Vec<f64>,
    /// New-buyer inflow distribution size for Gini/whale share.
    pub top_n_buyers: usize,
    /// Baseline lag for the signed Gini change.
    pub gini_lag: Duration,
    /// Swaps required before features are considered computable.
    pub min_swaps: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            qs_min: 0.40,
            dust_notional: 5.0,
            cohort_window: Duration::minutes(15),
            watcher_window: Duration::minutes(30),
            depth_steps: vec![0.005, 0.01, 0.02, 0.05],
            top_n_buyers: 10,
            gini_lag: Duration::seconds(120),
            min_swaps: 5,
        }
    }
}

/// Latest raw reserves; depth is derived on demand, never cached here.
#[derive(Debug, Clone, Copy)]
pub struct Reserves {
    pub x: f64,
    pub y: f64,
    pub fee_bps: u32,
    pub as_of: DateTime<Utc>,
}

/// Rolling state for one pool.
#[derive(Debug)]
pub struct PoolWindowState {
    pool: String,
    token: Option<String>,
    created_at: DateTime<Utc>,
    last_event_ts: DateTime<Utc>,
    last_slot: u64,
    swaps_folded: u64,
    events_folded: u64,

    ema_close_15m: TimeDecayEma,
    ema_close_24h: TimeDecayEma,
    atr_15m: TimeDecayEma,
    atr_24h: TimeDecayEma,
    last_price: Option<f64>,
    last_swap_ts: Option<DateTime<Utc>>,
    returns_15m: TimedRing<f64>,

    cvd: f64,
    cvd_track: TimedRing<f64>,

    itt_ema: TimeDecayEma,
    itt_track: TimedRing<f64>,

    /// (quote notional, side sign) per swap over 15m.
    sizes_15m: TimedRing<(f64, i8)>,
    swap_times_60m: TimedRing<()>,

    reserves: Option<Reserves>,
    authority: AuthorityFlags,
    /// Supplied by an upstream holder feed when available.
    lp_top10_share: Option<f64>,

    cohort: CohortTracker,
    watchers: WatcherProxy,
    /// Tick-time Gini samples, kept over the baseline lag.
    gini_track: TimedRing<f64>,

    cfg: WindowConfig,
}

impl PoolWindowState {
    pub fn new(pool: impl Into<String>, created_at: DateTime<Utc>, cfg: WindowConfig) -> Self {
        Self {
            pool: pool.into(),
            token: None,
            created_at,
            last_event_ts: created_at,
            last_slot: 0,
            swaps_folded: 0,
            events_folded: 0,
            ema_close_15m: TimeDecayEma::new(TAU_15M_SECS),
            ema_close_24h: TimeDecayEma::new(TAU_24H_SECS),
            atr_15m: TimeDecayEma::new(TAU_15M_SECS),
            atr_24h: TimeDecayEma::new(TAU_24H_SECS),
            last_price: None,
            last_swap_ts: None,
            returns_15m: TimedRing::new(Duration::minutes(15)),
            cvd: 0.0,
            cvd_track: TimedRing::new(Duration::minutes(60)),
            itt_ema: TimeDecayEma::new(TAU_15M_SECS),
            itt_track: TimedRing::new(Duration::minutes(15)),
            sizes_15m: TimedRing::new(Duration::minutes(15)),
            swap_times_60m: TimedRing::new(Duration::minutes(60)),
            reserves: None,
            authority: AuthorityFlags::default(),
            lp_top10_share: None,
            cohort: CohortTracker::new(cfg.cohort_window, cfg.qs_min, cfg.dust_notional),
            watchers: WatcherProxy::new(cfg.watcher_window),
            gini_track: TimedRing::new(cfg.gini_lag),
            cfg,
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_event_ts(&self) -> DateTime<Utc> {
        self.last_event_ts
    }

    pub fn cvd(&self) -> f64 {
        self.cvd
    }

    pub fn events_folded(&self) -> u64 {
        self.events_folded
    }

    /// Provide a holder-feed LP concentration figure for this pool.
    pub fn set_lp_top10_share(&mut self, share: f64) {
        self.lp_top10_share = Some(share);
    }

    /// Fold one event. `qs_lookup` resolves a wallet's quality score when a
    /// behavioral profile exists for it.
    pub fn fold<F>(&mut self, event: &NormalizedEvent, qs_lookup: F) -> Result<(), EventError>
    where
        F: FnOnce(&str) -> Option<f64>,
    {
        if event.pool() != self.pool {
            return Err(EventError::WrongPool {
                expected: self.pool.clone(),
                got: event.pool().to_string(),
            });
        }
        if let Some(slot) = event.slot() {
            if slot < self.last_slot {
                return Err(EventError::StaleSlot {
                    pool: self.pool.clone(),
                    slot,
                    applied: self.last_slot,
                });
            }
            self.last_slot = slot;
        }

        match event {
            NormalizedEvent::Swap(swap) => self.fold_swap(swap, qs_lookup)?,
            NormalizedEvent::Liquidity(lp) => self.fold_liquidity(lp),
            NormalizedEvent::Authority(auth) => {
                // Later reports override earlier ones field-by-field.
                if auth.fee_switch.is_some() {
                    self.authority.fee_switch = auth.fee_switch;
                }
                if auth.tax_flag.is_some() {
                    self.authority.tax_flag = auth.tax_flag;
                }
                if auth.mint_auth.is_some() {
                    self.authority.mint_auth = auth.mint_auth;
                }
                if auth.freeze_auth.is_some() {
                    self.authority.freeze_auth = auth.freeze_auth;
                }
            }
        }

        self.events_folded += 1;
        self.last_event_ts = self.last_event_ts.max(event.ts());
        Ok(())
    }

    fn fold_swap<F>(&mut self, swap: &SwapEvent, qs_lookup: F) -> Result<(), EventError>
    where
        F: FnOnce(&str) -> Option<f64>,
    {
        if swap.price <= 0.0 || swap.base_amt <= 0.0 || swap.quote_amt <= 0.0 {
            return Err(EventError::DegenerateSwap {
                pool: self.pool.clone(),
            });
        }
        let ts = swap.ts;

        if let Some(prev) = self.last_price {
            let tr = (swap.price - prev).abs();
            self.atr_15m.update(ts, tr);
            self.atr_24h.update(ts, tr);
            self.returns_15m.push(ts, swap.price / prev - 1.0);
        }
        self.ema_close_15m.update(ts, swap.price);
        self.ema_close_24h.update(ts, swap.price);
        self.last_price = Some(swap.price);

        if let Some(last) = self.last_swap_ts {
            let dt = (ts - last).num_milliseconds().max(0) as f64 / 1000.0;
            let ema = self.itt_ema.update(ts, dt);
            self.itt_track.push(ts, ema);
        }
        self.last_swap_ts = Some(ts);

        self.cvd += swap.side.sign() * swap.quote_amt;
        self.cvd_track.push(ts, self.cvd);

        let sign = match swap.side {
            Side::Buy => 1i8,
            Side::Sell => -1i8,
        };
        self.sizes_15m.push(ts, (swap.quote_amt, sign));
        self.swap_times_60m.push(ts, ());

        let qs = qs_lookup(&swap.taker);
        let obs = self
            .cohort
            .observe_swap(ts, &swap.taker, swap.side, swap.quote_amt, qs);
        if obs.dust_buy {
            self.watchers.record(ts);
        } else {
            self.watchers.sample(ts);
        }

        self.token = Some(swap.token.clone());
        self.swaps_folded += 1;
        Ok(())
    }

    fn fold_liquidity(&mut self, lp: &LiquidityEvent) {
        if lp.x_reserve > 0.0 && lp.y_reserve > 0.0 {
            self.reserves = Some(Reserves {
                x: lp.x_reserve,
                y: lp.y_reserve,
                fee_bps: lp.fee_bps,
                as_of: lp.ts,
            });
        } else {
            tracing::debug!(pool = %self.pool, "ignoring liquidity event with empty reserves");
        }
    }

    /// Derive the tick-time feature vector. Prior-tick values feed the
    /// contraction and Gini-delta comparisons; the prior-winners cohort
    /// feeds the Jaccard overlap.
    pub fn feature_vector(
        &mut self,
        now: DateTime<Utc>,
        prior: Option<&FeatureSnapshot>,
        prior_winners: &HashSet<String>,
    ) -> FeatureVector {
        let mut out = FeatureVector {
            cvd: self.cvd,
            obs: self.swaps_folded,
            authority: self.authority,
            watcher_count: self.watchers.count(),
            price: self.last_price,
            lp_top10_share: self.lp_top10_share,
            ..FeatureVector::default()
        };

        // A pool with almost no trades degrades to an empty vector; every
        // primitive then fails instead of erroring.
        if self.swaps_folded < self.cfg.min_swaps {
            return out;
        }

        out.atr_pct_15m = atr_pct(self.atr_15m.value(), self.ema_close_15m.value());
        out.atr_pct_24h = atr_pct(self.atr_24h.value(), self.ema_close_24h.value());
        out.vc_ratio = match (out.atr_pct_15m, out.atr_pct_24h) {
            (Some(short), Some(long)) if long > 1e-12 => Some(short / long),
            _ => None,
        };

        self.returns_15m.prune(now);
        let rets: Vec<f64> = self.returns_15m.iter().map(|(_, r)| *r).collect();
        out.ret_std_15m = mean_std(&rets).map(|(_, std)| std);
        out.ret_std_15m_prev = prior.and_then(|p| p.features.ret_std_15m);

        self.itt_track.prune(now);
        out.itt_slope = ols_slope_per_min(self.itt_track.iter());

        self.cvd_track.prune(now);
        out.cvd_slope_60m = ols_slope_per_min(self.cvd_track.iter());

        self.sizes_15m.prune(now);
        let sizes: Vec<f64> = self.sizes_15m.iter().map(|(_, (q, _))| *q).collect();
        out.swap_size_cv_15m = coefficient_of_variation(&sizes);
        out.alternation_15m = alternation_index(
            &self
                .sizes_15m
                .iter()
                .map(|(_, (_, s))| *s)
                .collect::<Vec<i8>>(),
        );

        self.swap_times_60m.prune(now);
        let window_min = self.swap_times_60m.window().num_seconds() as f64 / 60.0;
        out.swaps_per_min = Some(self.swap_times_60m.len() as f64 / window_min);

        if let Some(r) = self.reserves {
            out.depth_1pct = depth::depth_quote_notional(r.x, r.y, r.fee_bps, 0.01);
            out.depth_continuity = depth::depth_ladder(r.x, r.y, r.fee_bps, &self.cfg.depth_steps)
                .as_deref()
                .and_then(depth::depth_continuity);
        }

        out.arrivals_per_min = Some(self.cohort.arrivals_per_min(now));
        let inflows = self.cohort.top_net_inflows(now, self.cfg.top_n_buyers);
        out.inflow_gini = super::stats::gini(&inflows);
        // Directionality against the lagged baseline: a tick-to-tick diff
        // would be indistinguishable from noise at seconds cadence.
        if let Some(cur) = out.inflow_gini {
            self.gini_track.prune(now);
            out.gini_delta = self.gini_track.front().map(|(_, base)| cur - base);
            self.gini_track.push(now, cur);
        }
        out.prior_cohort_jaccard = Some(super::stats::jaccard(
            &self.cohort.qualified_set(now),
            prior_winners,
        ));
        out.whale_share = self.cohort.whale_share(now, self.cfg.top_n_buyers);

        out.watcher_slope = self.watchers.slope_per_min(now);

        out
    }
}

fn atr_pct(atr: Option<f64>, ema_close: Option<f64>) -> Option<f64> {
    match (atr, ema_close) {
        (Some(atr), Some(close)) if close > 1e-12 => Some(atr / close * 100.0),
        _ => None,
    }
}

/// Fraction of consecutive swap pairs whose taker side flipped.
fn alternation_index(signs: &[i8]) -> Option<f64> {
    if signs.len() < 2 {
        return None;
    }
    let flips = signs.windows(2).filter(|w| w[0] != w[1]).count();
    Some(flips as f64 / (signs.len() - 1) as f64)
}
