//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Snapshot and signal persistence (the relational store boundary)
//! - Wallet behavioral profiles (the upstream scoring feed)

pub mod storage;
pub mod wallet;

pub use storage::{FeatureStore, SignalStore, StorageError};
pub use wallet::WalletScorer;
