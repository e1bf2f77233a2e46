//! Application Layer - Scheduler and drivers
//!
//! The detector engine (tick cadence, per-pool serialization, persistence)
//! plus the replay driver and the retrying storage writer.

pub mod detector_engine;
pub mod replay;
pub mod writer;

pub use detector_engine::{DetectorEngine, EngineError, EngineStats};
pub use replay::{drive, ReplayReport};
