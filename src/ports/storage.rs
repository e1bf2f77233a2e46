//! Storage Ports
//!
//! Persistence seams for the two detector outputs: the latest-only feature
//! snapshot per pool (upsert semantics) and the append-only signal log.
//! Implementations live in the adapters layer; a relational store upstream
//! maps these onto `features_latest` and `detector_signal`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DetectorSignal, FeatureSnapshot};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Latest-only snapshot store, keyed by pool.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Replace the pool's snapshot with this one. Writes are whole-row; a
    /// reader never sees a partially-updated snapshot.
    async fn upsert_latest(&self, snapshot: &FeatureSnapshot) -> Result<(), StorageError>;
}

/// Append-only signal store.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn append(&self, signal: &DetectorSignal) -> Result<(), StorageError>;
}

#[cfg(test)]
pub mod mocks {
    //! Mock stores for engine tests.

    use super::*;
    use mockall::mock;

    mock! {
        pub FeatureStoreImpl {}

        #[async_trait]
        impl FeatureStore for FeatureStoreImpl {
            async fn upsert_latest(&self, snapshot: &FeatureSnapshot) -> Result<(), StorageError>;
        }
    }

    mock! {
        pub SignalStoreImpl {}

        #[async_trait]
        impl SignalStore for SignalStoreImpl {
            async fn append(&self, signal: &DetectorSignal) -> Result<(), StorageError>;
        }
    }
}
