//! Shared fixtures and in-memory fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use uptime_service::config::Config;
use uptime_service::domain::{Delegation, SignedUptimeMessage, ValidationId};
use uptime_service::error::{Result, UptimeError};
use uptime_service::message::pack_uptime_payload;
use uptime_service::store::SqliteProofStore;
use uptime_service::traits::{ProofStore, ProofSubmitter, UptimeIndexer, UptimeSigner};
use uptime_service::UptimeService;

pub fn vid(byte: u8) -> ValidationId {
    ValidationId::from_bytes([byte; 32])
}

/// Deterministic signed message for `(validator, uptime)`: the canonical
/// payload itself, so tests can decode what was "signed".
pub fn signed_message(validation_id: ValidationId, uptime_seconds: u64) -> SignedUptimeMessage {
    SignedUptimeMessage::from_bytes(pack_uptime_payload(validation_id, uptime_seconds).to_vec())
}

pub fn test_config() -> Config {
    Config {
        rewards_batch_delay_seconds: 0,
        ..Config::default()
    }
}

pub async fn memory_store() -> Arc<dyn ProofStore> {
    Arc::new(SqliteProofStore::in_memory().await.unwrap())
}

/// Signs exactly the configured uptime values and records every attempt.
pub struct ScriptedSigner {
    signable: HashSet<u64>,
    attempts: Mutex<Vec<(ValidationId, u64)>>,
}

impl ScriptedSigner {
    pub fn signing(uptimes: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            signable: uptimes.iter().copied().collect(),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<(ValidationId, u64)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl UptimeSigner for ScriptedSigner {
    async fn sign_uptime(
        &self,
        validation_id: ValidationId,
        uptime_seconds: u64,
    ) -> Result<SignedUptimeMessage> {
        self.attempts
            .lock()
            .unwrap()
            .push((validation_id, uptime_seconds));
        if self.signable.contains(&uptime_seconds) {
            Ok(signed_message(validation_id, uptime_seconds))
        } else {
            Err(UptimeError::Aggregator("quorum miss".to_string()))
        }
    }
}

/// Records submissions; selected messages can be marked stale or the whole
/// submitter set to reject everything.
#[derive(Default)]
pub struct RecordingSubmitter {
    stale_messages: Mutex<HashSet<Vec<u8>>>,
    reject_all: Mutex<bool>,
    submissions: Mutex<Vec<(ValidationId, Vec<u8>)>>,
    reward_batches: Mutex<Vec<Vec<[u8; 32]>>>,
}

impl RecordingSubmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_everything() -> Arc<Self> {
        let submitter = Self::default();
        *submitter.reject_all.lock().unwrap() = true;
        Arc::new(submitter)
    }

    pub fn mark_stale(&self, message: &SignedUptimeMessage) {
        self.stale_messages
            .lock()
            .unwrap()
            .insert(message.as_bytes().to_vec());
    }

    /// Every `submit_uptime_proof` call, accepted or not, in order.
    pub fn submissions(&self) -> Vec<(ValidationId, Vec<u8>)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn reward_batches(&self) -> Vec<Vec<[u8; 32]>> {
        self.reward_batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProofSubmitter for RecordingSubmitter {
    async fn submit_uptime_proof(
        &self,
        validation_id: ValidationId,
        signed_message: &SignedUptimeMessage,
    ) -> Result<()> {
        self.submissions
            .lock()
            .unwrap()
            .push((validation_id, signed_message.as_bytes().to_vec()));

        if *self.reject_all.lock().unwrap() {
            return Err(UptimeError::Contract("execution reverted".to_string()));
        }
        if self
            .stale_messages
            .lock()
            .unwrap()
            .contains(signed_message.as_bytes())
        {
            return Err(UptimeError::StaleSignature { validation_id });
        }
        Ok(())
    }

    async fn resolve_rewards(&self, delegation_ids: &[[u8; 32]]) -> Result<()> {
        self.reward_batches
            .lock()
            .unwrap()
            .push(delegation_ids.to_vec());
        Ok(())
    }
}

/// Serves fixed indexer answers.
#[derive(Default)]
pub struct FixedIndexer {
    pub updates: HashSet<ValidationId>,
    pub delegations: HashMap<ValidationId, Vec<Delegation>>,
}

impl FixedIndexer {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn listing(updates: &[ValidationId]) -> Arc<Self> {
        Arc::new(Self {
            updates: updates.iter().copied().collect(),
            delegations: HashMap::new(),
        })
    }

    pub fn with_delegations(validation_id: ValidationId, count: usize) -> Arc<Self> {
        let delegations = (0..count)
            .map(|i| {
                let mut id = [0u8; 32];
                id[24..].copy_from_slice(&(i as u64).to_be_bytes());
                Delegation { id, validation_id }
            })
            .collect();
        Arc::new(Self {
            updates: HashSet::new(),
            delegations: HashMap::from([(validation_id, delegations)]),
        })
    }
}

#[async_trait]
impl UptimeIndexer for FixedIndexer {
    async fn uptime_updates_for_epoch(&self, _epoch: &str) -> Result<HashSet<ValidationId>> {
        Ok(self.updates.clone())
    }

    async fn delegations_for_validator(
        &self,
        validation_id: ValidationId,
    ) -> Result<Vec<Delegation>> {
        Ok(self
            .delegations
            .get(&validation_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn service(
    cfg: Config,
    store: Arc<dyn ProofStore>,
    signer: Arc<ScriptedSigner>,
    submitter: Arc<RecordingSubmitter>,
    indexer: Arc<FixedIndexer>,
) -> UptimeService {
    UptimeService::new(cfg, store, signer, submitter, indexer)
}
