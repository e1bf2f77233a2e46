//! Wallet Scorer Port
//!
//! Behavioral wallet profiling is an upstream concern; the aggregator only
//! needs a synchronous lookup from wallet address to profile at fold time.

use crate::domain::WalletProfile;

/// Resolves a wallet's behavioral profile, when one exists.
pub trait WalletScorer: Send + Sync {
    fn profile(&self, wallet: &str) -> Option<WalletProfile>;
}
