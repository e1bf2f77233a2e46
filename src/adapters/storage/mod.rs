//! Storage Adapters
//!
//! In-memory stores (tests, replay) and JSONL file stores (paper runs).

pub mod jsonl;
pub mod memory;

pub use jsonl::{JsonFeatureStore, JsonlSignalStore};
pub use memory::{InMemoryFeatureStore, InMemorySignalStore};
