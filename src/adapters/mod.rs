//! Adapters Layer - External System Implementations
//!
//! Implementations of the port traits plus the process edges:
//! - Storage: in-memory and JSONL file stores
//! - Wallet: file-backed and neutral behavioral scorers
//! - Stream: JSONL event sources and the synthetic scenario generator
//! - CLI: command-line argument shapes

pub mod cli;
pub mod storage;
pub mod stream;
pub mod wallet;

pub use cli::CliApp;
pub use storage::{InMemoryFeatureStore, InMemorySignalStore, JsonFeatureStore, JsonlSignalStore};
pub use wallet::{FileWalletScorer, NeutralWalletScorer};
