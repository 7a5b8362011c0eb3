//! JSON configuration file loading.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, UptimeError};

fn default_quorum_percentage() -> u32 {
    67
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_epoch() -> String {
    "663".to_string()
}

fn default_rewards_batch_delay_seconds() -> u64 {
    4
}

/// Service configuration, loaded from a JSON file. Missing keys fall back
/// to their defaults; unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Validator-node RPC endpoints for the observation fan-out.
    pub avalanche_api_list: Vec<String>,
    /// Signature aggregator base URL.
    pub aggregator_url: String,
    /// Indexer endpoint for reconciliation and delegation listing.
    pub graphql_endpoint: String,
    /// Subnet whose validator set signs the uptime payload.
    pub signing_subnet_id: String,
    /// Chain the signed payload originates from.
    pub source_chain_id: String,
    /// Network the signed payload targets.
    pub network_id: u32,
    /// Quorum threshold for the aggregation step (percent).
    #[serde(default = "default_quorum_percentage")]
    pub quorum_percentage: u32,
    /// RPC endpoint of the chain hosting the staking manager.
    pub beam_rpc: String,
    /// Staking-manager contract address.
    pub contract_address: String,
    /// Warp messenger precompile address the proofs are delivered through.
    pub warp_messenger_address: String,
    /// Signing key for on-chain submission.
    pub private_key: String,
    /// `info` or `error`; anything else falls back to `info`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Proof store connection string; a `sqlite:` URL selects the SQLite
    /// backend, anything else Postgres.
    pub database_url: String,
    /// Validators excluded from automated proof generation.
    pub bootstrap_validators: Vec<String>,
    /// Epoch checked by `submit-missing-uptime-proofs`.
    #[serde(default = "default_epoch")]
    pub epoch: String,
    /// Pause between `resolveRewards` batches, in seconds.
    #[serde(default = "default_rewards_batch_delay_seconds")]
    pub rewards_batch_delay_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            avalanche_api_list: Vec::new(),
            aggregator_url: String::new(),
            graphql_endpoint: String::new(),
            signing_subnet_id: String::new(),
            source_chain_id: String::new(),
            network_id: 0,
            quorum_percentage: default_quorum_percentage(),
            beam_rpc: String::new(),
            contract_address: String::new(),
            warp_messenger_address: String::new(),
            private_key: String::new(),
            log_level: default_log_level(),
            database_url: String::new(),
            bootstrap_validators: Vec::new(),
            epoch: default_epoch(),
            rewards_batch_delay_seconds: default_rewards_batch_delay_seconds(),
        }
    }
}

impl Config {
    /// Reads and decodes a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            UptimeError::Configuration(format!("open config {}: {e}", path.display()))
        })?;
        let cfg: Config = serde_json::from_str(&raw).map_err(|e| {
            UptimeError::Configuration(format!("decode config {}: {e}", path.display()))
        })?;
        Ok(cfg)
    }
}
