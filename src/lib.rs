//! Coil detection core for Solana memecoin liquidity pools.
//!
//! Turns an ordered stream of normalized on-chain events into per-pool
//! rolling statistics, evaluates the five coil primitives (volatility
//! compression, order-flow stillness, liquidity thinness, wallet
//! convergence, retail quiet) against configurable thresholds, and advances
//! a per-pool QUIET -> COIL -> ARMED -> ENTER state machine that emits
//! deduplicated trade signals.
//!
//! # Modules
//!
//! - `domain`: events, per-pool rolling state, depth math, cohorts, records
//! - `strategy`: primitive evaluators, regime classifier, state machine
//! - `ports`: trait seams (storage, wallet profiles)
//! - `adapters`: stores, scorers, stream sources, CLI shapes
//! - `config`: TOML configuration with env overrides
//! - `application`: the tick engine, replay driver, retrying writer

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;
