//! Persistence Writer
//!
//! Storage writes are fire-and-forget with bounded retry: a slow or failing
//! store must never stall the tick loop for other pools. Failed writes are
//! logged with pool context and dropped once the retries are spent.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{DetectorSignal, FeatureSnapshot};
use crate::ports::{FeatureStore, SignalStore};

const WRITE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 100;

/// Upsert a snapshot with bounded retry.
pub async fn write_snapshot(store: Arc<dyn FeatureStore>, snapshot: FeatureSnapshot) {
    for attempt in 0..WRITE_ATTEMPTS {
        match store.upsert_latest(&snapshot).await {
            Ok(()) => return,
            Err(err) if attempt + 1 < WRITE_ATTEMPTS => {
                tracing::debug!(pool = %snapshot.pool, %err, attempt, "snapshot write retrying");
                tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS << attempt)).await;
            }
            Err(err) => {
                tracing::warn!(pool = %snapshot.pool, %err, "snapshot write dropped after retries");
            }
        }
    }
}

/// Append a signal with bounded retry.
pub async fn write_signal(store: Arc<dyn SignalStore>, signal: DetectorSignal) {
    for attempt in 0..WRITE_ATTEMPTS {
        match store.append(&signal).await {
            Ok(()) => return,
            Err(err) if attempt + 1 < WRITE_ATTEMPTS => {
                tracing::debug!(pool = %signal.pool, %err, attempt, "signal write retrying");
                tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS << attempt)).await;
            }
            Err(err) => {
                tracing::error!(pool = %signal.pool, %err, "signal write dropped after retries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CoilState;
    use crate::ports::storage::{mocks::MockSignalStoreImpl, StorageError};
    use chrono::Utc;

    fn signal() -> DetectorSignal {
        DetectorSignal {
            ts: Utc::now(),
            pool: "P1".into(),
            token: None,
            signal_type: "long".into(),
            score: 0.5,
            reason: String::new(),
            reasons: serde_json::json!({}),
            state: CoilState::Enter,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_then_succeeds() {
        let mut store = MockSignalStoreImpl::new();
        let mut calls = 0;
        store.expect_append().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(StorageError::Unavailable("busy".into()))
            } else {
                Ok(())
            }
        });
        write_signal(Arc::new(store), signal()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_gives_up_after_retries() {
        let mut store = MockSignalStoreImpl::new();
        store
            .expect_append()
            .times(3)
            .returning(|_| Err(StorageError::Unavailable("down".into())));
        // Must return rather than loop forever.
        write_signal(Arc::new(store), signal()).await;
    }
}
