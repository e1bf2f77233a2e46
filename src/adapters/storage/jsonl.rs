//! JSONL File Stores
//!
//! File-backed persistence for long paper runs: signals append to a JSONL
//! log, snapshots rewrite a small latest-per-pool JSON document. The
//! relational adapter upstream replaces these in production.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{DetectorSignal, FeatureSnapshot};
use crate::ports::storage::{FeatureStore, SignalStore, StorageError};

/// Appends one JSON line per signal to `detector_signal.jsonl`.
pub struct JsonlSignalStore {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlSignalStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join("detector_signal.jsonl");
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SignalStore for JsonlSignalStore {
    async fn append(&self, signal: &DetectorSignal) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(signal)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Latest snapshot per pool, mirrored to `features_latest.json` on every
/// upsert. The write replaces the whole document so a reader never sees a
/// half-updated row.
pub struct JsonFeatureStore {
    path: PathBuf,
    rows: Mutex<HashMap<String, FeatureSnapshot>>,
}

impl JsonFeatureStore {
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            path: dir.join("features_latest.json"),
            rows: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl FeatureStore for JsonFeatureStore {
    async fn upsert_latest(&self, snapshot: &FeatureSnapshot) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.insert(snapshot.pool.clone(), snapshot.clone());
        let body = serde_json::to_vec_pretty(&*rows)?;
        // Write-then-rename keeps the visible document whole.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
