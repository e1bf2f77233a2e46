//! Replay Driver
//!
//! Drives the engine off event timestamps instead of the wall clock: fold
//! everything up to the virtual tick time, then recompute. Because every
//! accumulator and the state machine take `now` as a parameter, replaying
//! the same file reproduces the same snapshots and signals exactly.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::detector_engine::{DetectorEngine, EngineError};
use crate::domain::NormalizedEvent;

/// Summary of one replay run.
#[derive(Debug, Clone, Copy)]
pub struct ReplayReport {
    pub events: u64,
    pub ticks: u64,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
}

/// Replay an ordered event stream at a virtual tick cadence.
pub async fn drive(
    engine: &Arc<DetectorEngine>,
    events: Vec<NormalizedEvent>,
    tick_secs: f64,
) -> Result<ReplayReport, EngineError> {
    assert!(tick_secs > 0.0, "tick cadence must be positive");
    let first_ts = events.first().map(|e| e.ts()).unwrap_or_else(Utc::now);
    let last_ts = events.last().map(|e| e.ts()).unwrap_or(first_ts);
    let tick = Duration::milliseconds((tick_secs * 1000.0) as i64);

    let mut clock = first_ts;
    let mut folded = 0u64;
    let mut ticks = 0u64;
    let mut pending = events.into_iter().peekable();

    while clock <= last_ts + tick {
        while let Some(ev) = pending.peek() {
            if ev.ts() <= clock {
                let ev = pending.next().expect("peeked");
                engine.fold_event(ev).await;
                folded += 1;
            } else {
                break;
            }
        }
        engine.tick_once(clock).await?;
        ticks += 1;
        clock += tick;
    }

    engine.flush_writes().await;
    Ok(ReplayReport {
        events: folded,
        ticks,
        first_ts,
        last_ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::{InMemoryFeatureStore, InMemorySignalStore};
    use crate::adapters::stream::coil_scenario;
    use crate::adapters::wallet::NeutralWalletScorer;
    use crate::config::DetectorSection;
    use crate::strategy::ThresholdConfig;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[tokio::test]
    async fn replay_covers_the_whole_stream() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let scenario = coil_scenario("POOL1", start);
        let total = scenario.events.len() as u64;

        let engine = Arc::new(DetectorEngine::new(
            DetectorSection {
                reorder_lag_slots: 0,
                ..Default::default()
            },
            ThresholdConfig::default(),
            Arc::new(InMemoryFeatureStore::new()),
            Arc::new(InMemorySignalStore::new()),
            Arc::new(NeutralWalletScorer),
            HashSet::new(),
        ));

        let report = drive(&engine, scenario.events, 10.0).await.unwrap();
        assert_eq!(report.events, total);
        assert!(report.ticks >= 180, "ticks {}", report.ticks);
        assert!(report.last_ts > report.first_ts);
    }
}
