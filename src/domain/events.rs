//! Normalized On-Chain Events
//!
//! Input contract with the upstream parsers: swap, liquidity and authority
//! rows, already decoded from raw transactions. Events for a pool arrive in
//! non-decreasing slot order; the reorder buffer below absorbs bounded
//! out-of-order delivery and drops anything older than its release watermark
//! rather than letting it corrupt cumulative statistics.
//!
//! Upstream guarantees no synthetic zero amounts; a zero-amount swap here is
//! a contract violation and is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use thiserror::Error;

/// Taker direction of a swap.
///
/// The wire form accepts both the string spelling and the upstream parsers'
/// signed convention (+1 buy, -1 sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to quote notional when accumulating CVD.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(i8),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) if n > 0 => Ok(Side::Buy),
            Repr::Num(n) if n < 0 => Ok(Side::Sell),
            Repr::Num(_) => Err(serde::de::Error::custom("side sign must be non-zero")),
            Repr::Text(s) => match s.as_str() {
                "buy" => Ok(Side::Buy),
                "sell" => Ok(Side::Sell),
                other => Err(serde::de::Error::custom(format!(
                    "unknown side: {other}"
                ))),
            },
        }
    }
}

/// A decoded swap against an AMM pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub ts: DateTime<Utc>,
    pub slot: u64,
    pub pool: String,
    /// Base token mint.
    pub token: String,
    pub side: Side,
    /// Quote per base.
    pub price: f64,
    pub base_amt: f64,
    pub quote_amt: f64,
    /// Aggressor wallet.
    pub taker: String,
    #[serde(default)]
    pub maker: Option<String>,
    #[serde(default)]
    pub router: Option<String>,
    /// Transaction signature, if the parser kept it.
    #[serde(default)]
    pub sig: Option<String>,
}

/// Kind of liquidity change observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityKind {
    Add,
    Remove,
    Update,
}

/// A reserve snapshot for a pool, from an LP add/remove or a state refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub ts: DateTime<Utc>,
    pub slot: u64,
    pub pool: String,
    pub x_reserve: f64,
    pub y_reserve: f64,
    pub fee_bps: u32,
    pub kind: LiquidityKind,
}

/// Token-authority observation for the pool's mint.
///
/// Flags are tri-state: the upstream parser writes None when it could not
/// determine the value, and the detector treats unknown as unknown rather
/// than clean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityEvent {
    pub ts: DateTime<Utc>,
    pub mint: String,
    pub pool: String,
    #[serde(default)]
    pub fee_switch: Option<bool>,
    #[serde(default)]
    pub tax_flag: Option<bool>,
    #[serde(default)]
    pub mint_auth: Option<bool>,
    #[serde(default)]
    pub freeze_auth: Option<bool>,
}

/// The normalized event stream fed into the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEvent {
    Swap(SwapEvent),
    Liquidity(LiquidityEvent),
    Authority(AuthorityEvent),
}

impl NormalizedEvent {
    pub fn pool(&self) -> &str {
        match self {
            NormalizedEvent::Swap(e) => &e.pool,
            NormalizedEvent::Liquidity(e) => &e.pool,
            NormalizedEvent::Authority(e) => &e.pool,
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            NormalizedEvent::Swap(e) => e.ts,
            NormalizedEvent::Liquidity(e) => e.ts,
            NormalizedEvent::Authority(e) => e.ts,
        }
    }

    /// Authority rows carry no slot; ordering applies to swap/LP rows only.
    pub fn slot(&self) -> Option<u64> {
        match self {
            NormalizedEvent::Swap(e) => Some(e.slot),
            NormalizedEvent::Liquidity(e) => Some(e.slot),
            NormalizedEvent::Authority(_) => None,
        }
    }
}

/// Event-level contract violations.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event for pool {pool} regressed to slot {slot} behind applied slot {applied}")]
    StaleSlot {
        pool: String,
        slot: u64,
        applied: u64,
    },

    #[error("event routed to wrong pool state: expected {expected}, got {got}")]
    WrongPool { expected: String, got: String },

    #[error("swap for pool {pool} carries non-positive amounts or price")]
    DegenerateSwap { pool: String },
}

/// Per-pool slot reordering with a bounded lag.
///
/// Events are held until the stream has advanced `lag_slots` past them (or
/// the buffer hits `max_pending`), then released in slot order. An event
/// arriving behind the release watermark can no longer be applied in order
/// and is counted as a gap.
#[derive(Debug)]
pub struct SlotReorderBuffer {
    lag_slots: u64,
    max_pending: usize,
    pending: BTreeMap<u64, VecDeque<NormalizedEvent>>,
    pending_len: usize,
    newest_slot: u64,
    watermark: u64,
    dropped: u64,
}

impl SlotReorderBuffer {
    pub fn new(lag_slots: u64, max_pending: usize) -> Self {
        Self {
            lag_slots,
            max_pending,
            pending: BTreeMap::new(),
            pending_len: 0,
            newest_slot: 0,
            watermark: 0,
            dropped: 0,
        }
    }

    /// Offer one event; returns the events now releasable in slot order.
    ///
    /// Slotless events (authority rows) pass straight through.
    pub fn push(&mut self, event: NormalizedEvent) -> Vec<NormalizedEvent> {
        let slot = match event.slot() {
            Some(s) => s,
            None => return vec![event],
        };

        if slot < self.watermark {
            self.dropped += 1;
            tracing::warn!(
                pool = event.pool(),
                slot,
                watermark = self.watermark,
                "dropping late event behind reorder watermark"
            );
            return Vec::new();
        }

        self.pending.entry(slot).or_default().push_back(event);
        self.pending_len += 1;
        self.newest_slot = self.newest_slot.max(slot);
        self.drain(false)
    }

    /// Release everything still pending (shutdown / end of replay).
    pub fn flush(&mut self) -> Vec<NormalizedEvent> {
        self.drain(true)
    }

    /// Count of events dropped behind the watermark.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    fn drain(&mut self, all: bool) -> Vec<NormalizedEvent> {
        let mut out = Vec::new();
        loop {
            let over_capacity = self.pending_len > self.max_pending;
            let Some((&slot, _)) = self.pending.first_key_value() else {
                break;
            };
            let ripe = all || over_capacity || slot + self.lag_slots <= self.newest_slot;
            if !ripe {
                break;
            }
            let (slot, mut events) = self.pending.pop_first().expect("non-empty");
            self.pending_len -= events.len();
            self.watermark = self.watermark.max(slot);
            out.extend(events.drain(..));
        }
        out
    }
}
