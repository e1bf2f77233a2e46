//! Wallet Scorer Adapters
//!
//! Two `WalletScorer` implementations: a JSON-file-backed profile map from
//! an upstream behavioral feed, and a neutral fallback that hands every
//! wallet the midpoint profile. The midpoint quality score sits exactly at
//! the default admission floor, so neutral-scored wallets are admitted
//! unless the floor is raised above 0.40.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::WalletProfile;
use crate::ports::WalletScorer;

#[derive(Debug, Error)]
pub enum WalletScorerError {
    #[error("failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse profile file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Profiles loaded once from a JSON map of wallet address to features.
pub struct FileWalletScorer {
    profiles: HashMap<String, WalletProfile>,
}

impl FileWalletScorer {
    pub fn load(path: &Path) -> Result<Self, WalletScorerError> {
        #[derive(Deserialize)]
        struct FileProfile {
            #[serde(default)]
            prior_exits: f64,
            #[serde(default)]
            recency: f64,
            #[serde(default)]
            execution: f64,
            #[serde(default)]
            holding: f64,
            #[serde(default)]
            consistency: f64,
            #[serde(default)]
            bot_likelihood: f64,
        }

        let body = std::fs::read_to_string(path)?;
        let raw: HashMap<String, FileProfile> = serde_json::from_str(&body)?;
        let profiles = raw
            .into_iter()
            .map(|(wallet, p)| {
                (
                    wallet,
                    WalletProfile {
                        prior_exits: p.prior_exits.clamp(0.0, 1.0),
                        recency: p.recency.clamp(0.0, 1.0),
                        execution: p.execution.clamp(0.0, 1.0),
                        holding: p.holding.clamp(0.0, 1.0),
                        consistency: p.consistency.clamp(0.0, 1.0),
                        bot_likelihood: p.bot_likelihood.clamp(0.0, 1.0),
                    },
                )
            })
            .collect();
        Ok(Self { profiles })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl WalletScorer for FileWalletScorer {
    fn profile(&self, wallet: &str) -> Option<WalletProfile> {
        self.profiles.get(wallet).copied()
    }
}

/// Every wallet gets the midpoint profile.
pub struct NeutralWalletScorer;

impl WalletScorer for NeutralWalletScorer {
    fn profile(&self, _wallet: &str) -> Option<WalletProfile> {
        Some(WalletProfile::default())
    }
}
