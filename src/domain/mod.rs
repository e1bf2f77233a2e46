//! Domain Layer - Core detection logic
//!
//! Pure domain types and accumulators with no external dependencies: the
//! normalized event contract, per-pool rolling window state, on-demand AMM
//! depth math, wallet cohort tracking, and the snapshot/signal records the
//! rest of the system exchanges. All external interactions happen through
//! the ports layer.

pub mod depth;
pub mod events;
pub mod pool_window;
pub mod snapshot;
pub mod stats;
pub mod wallet_cohort;

pub use events::{
    AuthorityEvent, EventError, LiquidityEvent, LiquidityKind, NormalizedEvent, Side,
    SlotReorderBuffer, SwapEvent,
};
pub use pool_window::{PoolWindowState, Reserves, WindowConfig};
pub use snapshot::{
    AuthorityFlags, CoilState, DetectorSignal, FeatureSnapshot, FeatureVector, PrimitiveOutcome,
    PrimitiveSet, RegimeVector,
};
pub use wallet_cohort::{quality_score, CohortTracker, WalletProfile, WatcherProxy};
