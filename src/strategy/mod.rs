//! Strategy Layer - Coil Detection over the Five Primitives
//!
//! Pure evaluation logic on top of the aggregator's feature vectors:
//! - Threshold configuration with env-style hot overrides
//! - The five primitive evaluators (VC / OFS / LT / WC / RQ)
//! - Cross-sectional regime z-scores
//! - The per-pool QUIET -> COIL -> ARMED -> ENTER state machine

pub mod coil_machine;
pub mod primitives;
pub mod regime;
pub mod thresholds;

pub use coil_machine::{CoilStateMachine, EnterEvent, GateContext, StepResult};
pub use primitives::{composite_score, evaluate_all, reason_line, reasons_json};
pub use regime::{RegimeClassifier, RegimeInputs, RegimeMap};
pub use thresholds::{PrimitiveWeights, ThresholdConfig, ThresholdError};
