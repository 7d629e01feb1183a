//! Protocol parameters and service configuration.
//!
//! Planner and validator must be built from the same [`ProtocolParams`];
//! a mismatch in `period_ms` or `validity_window_ms` makes every plan fail
//! validation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sdk::ledger::ScriptHash;

/// 30 days.
pub const DEFAULT_PERIOD_MS: u64 = 30 * 24 * 60 * 60 * 1000;
/// 10 minutes.
pub const DEFAULT_VALIDITY_WINDOW_MS: u64 = 10 * 60 * 1000;
/// 2 ADA attached to every payout output.
pub const DEFAULT_MIN_PAYOUT_LOVELACE: u64 = 2_000_000;

const MARKER_POLICY_ID: &str = "efd550741e3110fe49eab48f76b92e80b0676b4435c8e282810552eb";
const MARKER_ASSET_NAME: &str = "4147454e545f5355425f4e4654";
const AGENT_POLICY_ID: &str = "97bbb7db0baef89caefce61b8107ac74c7a7340166b39d906f174bec";
const AGENT_ASSET_NAME: &str = "54616c6f73";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Native asset identifier, both parts hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClass {
    pub policy_id: String,
    pub asset_name: String,
}

impl AssetClass {
    pub fn new(policy_id: &str, asset_name: &str) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            asset_name: asset_name.to_string(),
        }
    }

    /// `policy.name` form used by ledger tooling.
    pub fn unit(&self) -> String {
        format!("{}.{}", self.policy_id, self.asset_name)
    }

    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let policy = hex::decode(&self.policy_id)
            .map_err(|e| ConfigError::Validation(format!("{label}.policy_id: {e}")))?;
        if policy.len() != 28 {
            return Err(ConfigError::Validation(format!(
                "{label}.policy_id must be 28 bytes, got {}",
                policy.len()
            )));
        }
        let name = hex::decode(&self.asset_name)
            .map_err(|e| ConfigError::Validation(format!("{label}.asset_name: {e}")))?;
        if name.len() > 32 {
            return Err(ConfigError::Validation(format!(
                "{label}.asset_name must be at most 32 bytes, got {}",
                name.len()
            )));
        }
        Ok(())
    }
}

/// What a terminal action does with the marker token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerDisposal {
    #[default]
    Burn,
    ReturnToSubscriber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Escrow spending script.
    pub script_hash: ScriptHash,
    #[serde(default = "default_marker")]
    pub marker: AssetClass,
    #[serde(default = "default_agent")]
    pub agent: AssetClass,
    /// Service time bought by one `service_fee`.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Widest validity interval accepted for time-sensitive actions.
    #[serde(default = "default_validity_window_ms")]
    pub validity_window_ms: u64,
    #[serde(default = "default_min_payout_lovelace")]
    pub min_payout_lovelace: u64,
    /// Used by the planner; the validator accepts either disposal.
    #[serde(default)]
    pub marker_disposal: MarkerDisposal,
}

fn default_marker() -> AssetClass {
    AssetClass::new(MARKER_POLICY_ID, MARKER_ASSET_NAME)
}

fn default_agent() -> AssetClass {
    AssetClass::new(AGENT_POLICY_ID, AGENT_ASSET_NAME)
}

fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}

fn default_validity_window_ms() -> u64 {
    DEFAULT_VALIDITY_WINDOW_MS
}

fn default_min_payout_lovelace() -> u64 {
    DEFAULT_MIN_PAYOUT_LOVELACE
}

impl ProtocolParams {
    /// Parameters for `script_hash` with the deployed asset classes and
    /// default timings.
    pub fn new(script_hash: ScriptHash) -> Self {
        Self {
            script_hash,
            marker: default_marker(),
            agent: default_agent(),
            period_ms: DEFAULT_PERIOD_MS,
            validity_window_ms: DEFAULT_VALIDITY_WINDOW_MS,
            min_payout_lovelace: DEFAULT_MIN_PAYOUT_LOVELACE,
            marker_disposal: MarkerDisposal::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::Validation("period_ms must be > 0".into()));
        }
        if self.validity_window_ms == 0 {
            return Err(ConfigError::Validation(
                "validity_window_ms must be > 0".into(),
            ));
        }
        self.marker.validate("marker")?;
        self.agent.validate("agent")?;
        if self.marker == self.agent {
            return Err(ConfigError::Validation(
                "marker and agent must be different assets".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

/// Top-level configuration of the API service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub params: ProtocolParams,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.params.validate()?;
        Ok(config)
    }
}
