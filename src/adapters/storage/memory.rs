//! In-Memory Stores
//!
//! Default stores for paper runs, replay and tests: a keyed map with upsert
//! semantics for snapshots and an append-only vector for signals.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{DetectorSignal, FeatureSnapshot};
use crate::ports::storage::{FeatureStore, SignalStore, StorageError};

/// Latest snapshot per pool, held in memory.
#[derive(Default)]
pub struct InMemoryFeatureStore {
    rows: RwLock<HashMap<String, FeatureSnapshot>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self, pool: &str) -> Option<FeatureSnapshot> {
        self.rows.read().await.get(pool).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn upsert_latest(&self, snapshot: &FeatureSnapshot) -> Result<(), StorageError> {
        self.rows
            .write()
            .await
            .insert(snapshot.pool.clone(), snapshot.clone());
        Ok(())
    }
}

/// Append-only signal log, held in memory.
#[derive(Default)]
pub struct InMemorySignalStore {
    rows: RwLock<Vec<DetectorSignal>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<DetectorSignal> {
        self.rows.read().await.clone()
    }

    pub async fn for_pool(&self, pool: &str) -> Vec<DetectorSignal> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|s| s.pool == pool)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn append(&self, signal: &DetectorSignal) -> Result<(), StorageError> {
        self.rows.write().await.push(signal.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CoilState, FeatureVector, PrimitiveOutcome, PrimitiveSet, RegimeVector};
    use chrono::Utc;

    fn snapshot(pool: &str, cvd: f64) -> FeatureSnapshot {
        let fail = PrimitiveOutcome::fail();
        FeatureSnapshot {
            ts: Utc::now(),
            pool: pool.to_string(),
            token: None,
            features: FeatureVector {
                cvd,
                ..Default::default()
            },
            regime: RegimeVector::default(),
            primitives: PrimitiveSet {
                vc: fail,
                ofs: fail,
                lt: fail,
                wc: fail,
                rq: fail,
            },
            state: CoilState::Quiet,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_pool() {
        let store = InMemoryFeatureStore::new();
        store.upsert_latest(&snapshot("P1", 1.0)).await.unwrap();
        store.upsert_latest(&snapshot("P1", 2.0)).await.unwrap();
        store.upsert_latest(&snapshot("P2", 3.0)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.latest("P1").await.unwrap().features.cvd, 2.0);
    }

    #[tokio::test]
    async fn signals_append_in_order() {
        let store = InMemorySignalStore::new();
        for i in 0..3 {
            let sig = DetectorSignal {
                ts: Utc::now(),
                pool: "P1".into(),
                token: None,
                signal_type: "long".into(),
                score: i as f64,
                reason: String::new(),
                reasons: serde_json::json!({}),
                state: CoilState::Enter,
            };
            store.append(&sig).await.unwrap();
        }
        let rows = store.for_pool("P1").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].score, 2.0);
    }
}
