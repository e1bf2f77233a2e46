//! Detector Engine
//!
//! Owns the tick cadence and the per-pool concurrency discipline. Pools are
//! independent and recompute in parallel, but each pool's fold and its
//! evaluator/state-machine pass are serialized behind one async mutex, so a
//! fold never runs concurrently with another fold or tick pass for the same
//! pool. Thresholds hot-reload from the environment every tick, falling
//! back to the last-known-good config on a malformed override.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinSet;

use super::writer;
use crate::config::DetectorSection;
use crate::domain::{
    quality_score, CoilState, DetectorSignal, EventError, FeatureSnapshot, FeatureVector,
    NormalizedEvent, PoolWindowState, SlotReorderBuffer,
};
use crate::ports::{FeatureStore, SignalStore, WalletScorer};
use crate::strategy::{
    evaluate_all, CoilStateMachine, GateContext, RegimeClassifier, RegimeInputs, ThresholdConfig,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pool pass aborted: {0}")]
    PoolPass(String),
}

/// Monotone engine counters surfaced in the heartbeat line.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub events_folded: AtomicU64,
    pub gaps_dropped: AtomicU64,
    pub signals_emitted: AtomicU64,
    pub suppressed_enters: AtomicU64,
    pub ticks: AtomicU64,
}

/// Everything owned by one pool, guarded by a single lock.
struct PoolCell {
    window: PoolWindowState,
    reorder: SlotReorderBuffer,
    machine: CoilStateMachine,
    last_snapshot: Option<FeatureSnapshot>,
    reorder_dropped_seen: u64,
}

/// The streaming feature/primitive engine and its scheduler.
pub struct DetectorEngine {
    cfg: DetectorSection,
    /// File-derived base; env overrides are reapplied on top every tick.
    base_thresholds: ThresholdConfig,
    thresholds: RwLock<Arc<ThresholdConfig>>,
    pools: RwLock<HashMap<String, Arc<Mutex<PoolCell>>>>,
    features: Arc<dyn FeatureStore>,
    signals: Arc<dyn SignalStore>,
    scorer: Arc<dyn WalletScorer>,
    prior_winners: Arc<HashSet<String>>,
    /// Outstanding fire-and-forget writes, reaped each tick.
    writes: Mutex<JoinSet<()>>,
    pub stats: EngineStats,
}

impl DetectorEngine {
    pub fn new(
        cfg: DetectorSection,
        thresholds: ThresholdConfig,
        features: Arc<dyn FeatureStore>,
        signals: Arc<dyn SignalStore>,
        scorer: Arc<dyn WalletScorer>,
        prior_winners: HashSet<String>,
    ) -> Self {
        Self {
            cfg,
            thresholds: RwLock::new(Arc::new(thresholds.clone())),
            base_thresholds: thresholds,
            pools: RwLock::new(HashMap::new()),
            features,
            signals,
            scorer,
            prior_winners: Arc::new(prior_winners),
            writes: Mutex::new(JoinSet::new()),
            stats: EngineStats::default(),
        }
    }

    /// The threshold config currently in force.
    pub async fn thresholds(&self) -> Arc<ThresholdConfig> {
        self.thresholds.read().await.clone()
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn pool_state(&self, pool: &str) -> Option<CoilState> {
        let cell = self.pools.read().await.get(pool).cloned()?;
        let guard = cell.lock().await;
        Some(guard.machine.phase())
    }

    /// Route one event to its pool, creating state on first sight.
    pub async fn fold_event(&self, event: NormalizedEvent) {
        let cell = self.cell_for(event.pool(), event.ts()).await;
        let mut guard = cell.lock().await;

        let released = guard.reorder.push(event);
        let buffer_dropped = guard.reorder.dropped() - guard.reorder_dropped_seen;
        if buffer_dropped > 0 {
            guard.reorder_dropped_seen += buffer_dropped;
            self.stats
                .gaps_dropped
                .fetch_add(buffer_dropped, Ordering::Relaxed);
        }

        for ev in released {
            let scorer = &self.scorer;
            match guard
                .window
                .fold(&ev, |wallet| scorer.profile(wallet).map(|p| quality_score(&p)))
            {
                Ok(()) => {
                    self.stats.events_folded.fetch_add(1, Ordering::Relaxed);
                }
                Err(err @ EventError::StaleSlot { .. }) => {
                    self.stats.gaps_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%err, "gap recorded");
                }
                Err(err) => {
                    tracing::warn!(%err, "event rejected");
                }
            }
        }
    }

    /// One full recompute pass at `now`: hot-reload thresholds, evict idle
    /// pools, derive features per pool, classify the cross-section, then
    /// evaluate/step/persist per pool.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.reload_thresholds().await;
        self.evict_idle(now).await;
        self.reap_writes().await;

        let thresholds = self.thresholds().await;
        let cells: Vec<(String, Arc<Mutex<PoolCell>>)> = {
            let pools = self.pools.read().await;
            pools.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        if cells.is_empty() {
            self.stats.ticks.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        // Phase A: derive each pool's raw features under its own lock.
        let mut derive: JoinSet<(String, FeatureVector, Option<String>)> = JoinSet::new();
        for (pool, cell) in &cells {
            let pool = pool.clone();
            let cell = cell.clone();
            let winners = self.prior_winners.clone();
            derive.spawn(async move {
                let mut guard = cell.lock().await;
                let prior = guard.last_snapshot.take();
                let fv = guard.window.feature_vector(now, prior.as_ref(), &winners);
                guard.last_snapshot = prior;
                let token = guard.window.token().map(str::to_string);
                (pool, fv, token)
            });
        }
        let mut derived: Vec<(String, FeatureVector, Option<String>)> = Vec::new();
        while let Some(res) = derive.join_next().await {
            derived.push(res.map_err(|e| EngineError::PoolPass(e.to_string()))?);
        }

        // Cross-section over every active pool, one consistent snapshot.
        let regime_inputs: Vec<(String, RegimeInputs)> = derived
            .iter()
            .map(|(pool, fv, _)| (pool.clone(), RegimeInputs::from_features(fv)))
            .collect();
        let regime = RegimeClassifier::classify(&regime_inputs);

        // Phase B: evaluate, step the machine, persist. Tasks return the
        // finished snapshot and any ENTER outcome; writes are spawned on
        // join so the tasks themselves stay engine-free.
        let by_pool: HashMap<String, Arc<Mutex<PoolCell>>> = cells.into_iter().collect();
        let mut passes: JoinSet<(FeatureSnapshot, Option<DetectorSignal>, bool)> = JoinSet::new();
        for (pool, fv, token) in derived {
            let Some(cell) = by_pool.get(&pool).cloned() else {
                continue;
            };
            let regime = regime.clone();
            let thresholds = thresholds.clone();
            passes.spawn(async move {
                let mut guard = cell.lock().await;
                let regime_vec = regime.get(&pool).copied().unwrap_or_default();
                let set = evaluate_all(&fv, Some(&regime_vec), &thresholds);
                let gate = GateContext {
                    regime_cr: Some(regime_vec.cr),
                    authority_clean: fv.authority.is_clean(),
                };
                let step = guard.machine.step(now, &set, &gate, &thresholds);

                let snapshot = FeatureSnapshot {
                    ts: now,
                    pool: pool.clone(),
                    token: token.clone(),
                    features: fv,
                    regime: regime_vec,
                    primitives: set,
                    state: step.state,
                };
                guard.last_snapshot = Some(snapshot.clone());
                drop(guard);

                let (signal, suppressed) = match step.entered {
                    Some(enter) if enter.actionable => (
                        Some(DetectorSignal {
                            ts: now,
                            pool,
                            token,
                            signal_type: "long".to_string(),
                            score: enter.score,
                            reason: enter.reason,
                            reasons: enter.reasons,
                            state: CoilState::Enter,
                        }),
                        false,
                    ),
                    Some(_) => (None, true),
                    None => (None, false),
                };
                (snapshot, signal, suppressed)
            });
        }

        while let Some(res) = passes.join_next().await {
            let (snapshot, signal, suppressed) =
                res.map_err(|e| EngineError::PoolPass(e.to_string()))?;
            self.spawn_snapshot_write(snapshot).await;
            if suppressed {
                self.stats.suppressed_enters.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(signal) = signal {
                self.stats.signals_emitted.fetch_add(1, Ordering::Relaxed);
                self.spawn_signal_write(signal).await;
            }
        }

        let tick = self.stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.cfg.heartbeat_ticks > 0 && tick % self.cfg.heartbeat_ticks == 0 {
            self.heartbeat(tick).await;
        }
        Ok(())
    }

    /// Drive the engine off the wall clock until shutdown: fold events as
    /// they arrive, recompute on the poll cadence.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<NormalizedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs_f64(self.cfg.poll_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut events_open = true;

        tracing::info!(
            poll_secs = self.cfg.poll_secs,
            "detector online"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once(Utc::now()).await?;
                }
                maybe_ev = events.recv(), if events_open => {
                    match maybe_ev {
                        Some(ev) => self.fold_event(ev).await,
                        None => {
                            tracing::info!("event stream closed; detector keeps ticking");
                            events_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means nobody can stop us later.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Bounded grace: one flushing pass so the latest snapshots land,
        // then drain outstanding writes.
        let grace = std::time::Duration::from_secs(self.cfg.shutdown_grace_secs);
        let this = self.clone();
        if tokio::time::timeout(grace, async move {
            let _ = this.tick_once(Utc::now()).await;
            this.flush_writes().await;
        })
        .await
        .is_err()
        {
            tracing::warn!("shutdown grace elapsed with work still in flight");
        }
        tracing::info!("detector stopped");
        Ok(())
    }

    /// Await all outstanding fire-and-forget writes (replay/tests).
    pub async fn flush_writes(&self) {
        let mut writes = self.writes.lock().await;
        while writes.join_next().await.is_some() {}
    }

    async fn spawn_snapshot_write(&self, snapshot: FeatureSnapshot) {
        let store = self.features.clone();
        self.writes
            .lock()
            .await
            .spawn(writer::write_snapshot(store, snapshot));
    }

    async fn spawn_signal_write(&self, signal: DetectorSignal) {
        let store = self.signals.clone();
        self.writes
            .lock()
            .await
            .spawn(writer::write_signal(store, signal));
    }

    async fn reap_writes(&self) {
        let mut writes = self.writes.lock().await;
        while writes.try_join_next().is_some() {}
    }

    async fn reload_thresholds(&self) {
        match self.base_thresholds.with_env_overrides() {
            Ok(next) => {
                let mut current = self.thresholds.write().await;
                *current = Arc::new(next);
            }
            Err(err) => {
                tracing::warn!(%err, "threshold override invalid; keeping last known good");
            }
        }
    }

    async fn evict_idle(&self, now: DateTime<Utc>) {
        let horizon = Duration::seconds(self.cfg.inactivity_horizon_secs as i64);
        let mut stale: Vec<String> = Vec::new();
        {
            let pools = self.pools.read().await;
            for (pool, cell) in pools.iter() {
                let guard = cell.lock().await;
                if now - guard.window.last_event_ts() > horizon {
                    stale.push(pool.clone());
                }
            }
        }
        if stale.is_empty() {
            return;
        }
        let mut pools = self.pools.write().await;
        for pool in stale {
            pools.remove(&pool);
            tracing::info!(%pool, "evicted idle pool state");
        }
    }

    async fn cell_for(&self, pool: &str, first_seen: DateTime<Utc>) -> Arc<Mutex<PoolCell>> {
        if let Some(cell) = self.pools.read().await.get(pool) {
            return cell.clone();
        }
        let thresholds = self.thresholds().await;
        let mut pools = self.pools.write().await;
        pools
            .entry(pool.to_string())
            .or_insert_with(|| {
                tracing::info!(%pool, "tracking new pool");
                Arc::new(Mutex::new(PoolCell {
                    window: PoolWindowState::new(pool, first_seen, thresholds.window_config()),
                    reorder: SlotReorderBuffer::new(
                        self.cfg.reorder_lag_slots,
                        self.cfg.reorder_max_pending,
                    ),
                    machine: CoilStateMachine::new(pool),
                    last_snapshot: None,
                    reorder_dropped_seen: 0,
                }))
            })
            .clone()
    }

    async fn heartbeat(&self, tick: u64) {
        tracing::info!(
            tick,
            pools = self.pool_count().await,
            events = self.stats.events_folded.load(Ordering::Relaxed),
            gaps = self.stats.gaps_dropped.load(Ordering::Relaxed),
            signals = self.stats.signals_emitted.load(Ordering::Relaxed),
            suppressed = self.stats.suppressed_enters.load(Ordering::Relaxed),
            "health"
        );
    }
}
