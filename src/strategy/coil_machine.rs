//! Coil State Machine
//!
//! Per-pool phase tracking over the primitive outcomes:
//! QUIET -> COIL (core three sustained) -> ARMED (+WC) -> ENTER (+RQ inside
//! the armed window). Coil conditions are fragile: any core-three failure
//! drops straight back to QUIET. ENTER is a pulse, not a resting state: the
//! machine emits, starts the cooldown and resets to QUIET in the same step.
//! While a pool is cooling down an ENTER is still computed and reported for
//! observability, but it is not actionable and does not restart the
//! cooldown.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::primitives::{composite_score, reason_line, reasons_json};
use super::thresholds::ThresholdConfig;
use crate::domain::{CoilState, PrimitiveSet};

/// Tick-time context the machine gates on beyond the primitives.
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    /// Cross-sectional compression z-score, when the classifier had one.
    pub regime_cr: Option<f64>,
    /// Nothing known-bad about the mint's authorities.
    pub authority_clean: bool,
}

impl Default for GateContext {
    fn default() -> Self {
        Self {
            regime_cr: None,
            authority_clean: true,
        }
    }
}

/// An ENTER pulse produced by one step.
#[derive(Debug, Clone)]
pub struct EnterEvent {
    /// False while the pool is cooling down: observable, not emittable.
    pub actionable: bool,
    pub score: f64,
    pub reason: String,
    pub reasons: Value,
}

/// Outcome of one step: the phase to record on the snapshot and an ENTER
/// pulse when one fired.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub state: CoilState,
    pub entered: Option<EnterEvent>,
}

/// One pool's detection cycle.
#[derive(Debug)]
pub struct CoilStateMachine {
    pool: String,
    phase: CoilState,
    /// First tick at which the core three all passed, while QUIET.
    core3_since: Option<DateTime<Utc>>,
    /// When the current phase was entered; drives the armed-window timeout.
    entered_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl CoilStateMachine {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            phase: CoilState::Quiet,
            core3_since: None,
            entered_at: None,
            cooldown_until: None,
        }
    }

    pub fn phase(&self) -> CoilState {
        self.phase
    }

    /// When the current phase was entered (None while resting in QUIET
    /// since startup or a pulse).
    pub fn entered_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    /// Advance one tick. Never skips a phase and never errors; a tick with
    /// degraded data simply fails primitives and falls toward QUIET.
    pub fn step(
        &mut self,
        now: DateTime<Utc>,
        set: &PrimitiveSet,
        gate: &GateContext,
        t: &ThresholdConfig,
    ) -> StepResult {
        let core3 = set.core_three();

        match self.phase {
            CoilState::Quiet => {
                if core3 {
                    let since = *self.core3_since.get_or_insert(now);
                    if now - since >= t.confirmation_window() {
                        self.transition(CoilState::Coil, now);
                    }
                } else {
                    self.core3_since = None;
                }
            }
            CoilState::Coil => {
                if !core3 {
                    self.reset(now, "core primitives failed");
                } else if set.wc.passed {
                    self.transition(CoilState::Armed, now);
                }
            }
            CoilState::Armed => {
                if !core3 {
                    self.reset(now, "core primitives failed");
                } else if self
                    .entered_at
                    .is_some_and(|at| now - at > t.armed_window())
                {
                    self.reset(now, "armed window elapsed without confirmation");
                } else if set.wc.passed && set.rq.passed {
                    // All five concurrently true; a WC dropout keeps the
                    // pool ARMED on its original window rather than
                    // restarting the clock through COIL.
                    return self.enter(now, set, gate, t);
                }
            }
            // The resting phase is never Enter; normalize defensively.
            CoilState::Enter => {
                self.reset(now, "normalized out of pulse state");
            }
        }

        StepResult {
            state: self.phase,
            entered: None,
        }
    }

    fn enter(
        &mut self,
        now: DateTime<Utc>,
        set: &PrimitiveSet,
        gate: &GateContext,
        t: &ThresholdConfig,
    ) -> StepResult {
        // Configuration-driven gates hold the pool in ARMED: the setup is
        // intact, the environment is not.
        if t.regime_gate_enabled {
            if let Some(cr) = gate.regime_cr {
                if cr > t.regime_cr_max {
                    tracing::debug!(pool = %self.pool, cr, "regime gate holding ENTER");
                    return StepResult {
                        state: self.phase,
                        entered: None,
                    };
                }
            }
        }
        if t.require_clean_authority && !gate.authority_clean {
            tracing::debug!(pool = %self.pool, "authority gate holding ENTER");
            return StepResult {
                state: self.phase,
                entered: None,
            };
        }

        let actionable = self.cooldown_until.map_or(true, |until| now >= until);
        if actionable {
            self.cooldown_until = Some(now + t.cooldown());
        }

        let event = EnterEvent {
            actionable,
            score: composite_score(set, t),
            reason: reason_line(t),
            reasons: reasons_json(set, t),
        };
        tracing::info!(
            pool = %self.pool,
            score = event.score,
            actionable,
            "coil ENTER"
        );

        // Pulse: the detection cycle restarts immediately.
        self.phase = CoilState::Quiet;
        self.core3_since = None;
        self.entered_at = None;

        StepResult {
            state: CoilState::Enter,
            entered: Some(event),
        }
    }

    fn transition(&mut self, to: CoilState, now: DateTime<Utc>) {
        tracing::info!(pool = %self.pool, from = self.phase.as_str(), to = to.as_str(), ts = %now, "state transition");
        self.phase = to;
        self.entered_at = Some(now);
    }

    fn reset(&mut self, now: DateTime<Utc>, why: &str) {
        if self.phase != CoilState::Quiet {
            tracing::info!(pool = %self.pool, from = self.phase.as_str(), ts = %now, why, "reset to QUIET");
        }
        self.phase = CoilState::Quiet;
        self.core3_since = None;
        self.entered_at = None;
    }
}
