//! Staking-manager contract client.
//!
//! Submits signed uptime proofs and batched reward resolutions to the
//! staking manager over the configured EVM RPC.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, FixedBytes};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::{SignedUptimeMessage, ValidationId};
use crate::error::{Result, UptimeError};
use crate::traits::ProofSubmitter;

// The revert reason the staking manager emits when the quorum signature
// inside a submitted message has expired on-chain.
const STALE_MESSAGE_MARKER: &str = "invalid warp message";

sol! {
    #[sol(rpc)]
    interface IStakingManager {
        function submitUptimeProof(bytes signedMessage) external;

        function resolveRewards(bytes32[] delegationIDs) external;
    }
}

/// Transaction-submitting client for the staking manager.
pub struct StakingManagerClient {
    rpc_url: String,
    contract_address: Address,
    private_key: String,
}

impl StakingManagerClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.beam_rpc.is_empty() {
            return Err(UptimeError::Configuration(
                "beam_rpc cannot be empty".to_string(),
            ));
        }
        if cfg.private_key.is_empty() {
            return Err(UptimeError::Configuration(
                "private_key cannot be empty".to_string(),
            ));
        }
        let contract_address: Address = cfg.contract_address.parse().map_err(|e| {
            UptimeError::Configuration(format!(
                "invalid contract_address {:?}: {e}",
                cfg.contract_address
            ))
        })?;
        // The messenger address is fixed per network; proofs are delivered
        // through it and validated by the staking manager.
        debug!(
            staking_manager = %contract_address,
            warp_messenger = %cfg.warp_messenger_address,
            "contract client ready"
        );
        Ok(Self {
            rpc_url: cfg.beam_rpc.clone(),
            contract_address,
            private_key: cfg.private_key.clone(),
        })
    }

    fn signer(&self) -> Result<PrivateKeySigner> {
        self.private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| UptimeError::Configuration(format!("invalid private key: {e}")))
    }

    fn rpc_url(&self) -> Result<reqwest::Url> {
        self.rpc_url
            .parse()
            .map_err(|e| UptimeError::Configuration(format!("invalid beam_rpc url: {e}")))
    }
}

#[async_trait]
impl ProofSubmitter for StakingManagerClient {
    async fn submit_uptime_proof(
        &self,
        validation_id: ValidationId,
        signed_message: &SignedUptimeMessage,
    ) -> Result<()> {
        if signed_message.is_empty() {
            return Err(UptimeError::Contract(
                "signed message cannot be empty".to_string(),
            ));
        }

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer()?))
            .on_http(self.rpc_url()?);
        let contract = IStakingManager::new(self.contract_address, &provider);

        let pending = contract
            .submitUptimeProof(Bytes::copy_from_slice(signed_message.as_bytes()))
            .send()
            .await
            .map_err(|e| classify_submit_error(validation_id, e.to_string()))?;

        debug!(validator = %validation_id, tx = %pending.tx_hash(), "uptime proof transaction sent");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| classify_submit_error(validation_id, e.to_string()))?;

        info!(
            validator = %validation_id,
            tx = %receipt.transaction_hash,
            block = receipt.block_number.unwrap_or(0),
            "uptime proof submitted"
        );
        Ok(())
    }

    async fn resolve_rewards(&self, delegation_ids: &[[u8; 32]]) -> Result<()> {
        if delegation_ids.is_empty() {
            return Ok(());
        }

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer()?))
            .on_http(self.rpc_url()?);
        let contract = IStakingManager::new(self.contract_address, &provider);

        let ids: Vec<FixedBytes<32>> = delegation_ids
            .iter()
            .map(|id| FixedBytes::from_slice(id))
            .collect();

        let pending = contract
            .resolveRewards(ids)
            .send()
            .await
            .map_err(|e| UptimeError::Contract(format!("send resolveRewards: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| UptimeError::Contract(format!("resolveRewards receipt: {e}")))?;

        info!(
            delegations = delegation_ids.len(),
            tx = %receipt.transaction_hash,
            "resolveRewards batch submitted"
        );
        Ok(())
    }
}

/// Maps the staking manager's expired-signature revert onto the typed
/// stale-signature variant so callers never have to string-match.
fn classify_submit_error(validation_id: ValidationId, message: String) -> UptimeError {
    if message.contains(STALE_MESSAGE_MARKER) {
        UptimeError::StaleSignature { validation_id }
    } else {
        UptimeError::Contract(format!("submit uptime proof: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            beam_rpc: "http://localhost:9650/ext/bc/C/rpc".to_string(),
            contract_address: "0x0000000000000000000000000000000000000001".to_string(),
            warp_messenger_address: "0x0200000000000000000000000000000000000005".to_string(),
            private_key: "2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6"
                .to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn builds_from_valid_config() {
        let client = StakingManagerClient::new(&base_config()).unwrap();
        assert!(client.signer().is_ok());
        assert!(client.rpc_url().is_ok());
    }

    #[test]
    fn rejects_missing_rpc_or_key() {
        let mut cfg = base_config();
        cfg.beam_rpc.clear();
        assert!(StakingManagerClient::new(&cfg).is_err());

        let mut cfg = base_config();
        cfg.private_key.clear();
        assert!(StakingManagerClient::new(&cfg).is_err());
    }

    #[test]
    fn rejects_malformed_contract_address() {
        let mut cfg = base_config();
        cfg.contract_address = "not-an-address".to_string();
        assert!(StakingManagerClient::new(&cfg).is_err());
    }

    #[test]
    fn prefixed_private_key_is_accepted() {
        let mut cfg = base_config();
        cfg.private_key = format!("0x{}", cfg.private_key);
        let client = StakingManagerClient::new(&cfg).unwrap();
        assert!(client.signer().is_ok());
    }

    #[test]
    fn expired_message_revert_becomes_stale_signature() {
        let id = ValidationId::from_bytes([9u8; 32]);
        let err = classify_submit_error(id, "execution reverted: invalid warp message".to_string());
        assert!(err.is_stale_signature());

        let err = classify_submit_error(id, "nonce too low".to_string());
        assert!(!err.is_stale_signature());
    }
}
