//! Orchestration of the proof pipeline.
//!
//! Three entry points, one per CLI command: the submit-and-store cycle over
//! the observed validator set, the reconciliation pass against the indexer,
//! and the delegation reward resolution. Validators are processed one at a
//! time; per-validator work is a chain of dependent network calls and
//! serializing across validators bounds nonce pressure on the submitting
//! key without a rate limiter.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{
    Delegation, NegotiationResult, ReconcileReport, RunSummary, SampleMap, UptimeProof,
    ValidationId,
};
use crate::engine::{negotiate_uptime, Negotiated};
use crate::error::{Result, UptimeError};
use crate::observer;
use crate::traits::{ProofStore, ProofSubmitter, UptimeIndexer, UptimeSigner};

/// How many delegation IDs go into one `resolveRewards` transaction.
const REWARDS_BATCH_SIZE: usize = 20;

/// Drives negotiation, submission, persistence, and reconciliation for the
/// whole validator set.
pub struct UptimeService {
    cfg: Config,
    store: Arc<dyn ProofStore>,
    signer: Arc<dyn UptimeSigner>,
    contract: Arc<dyn ProofSubmitter>,
    indexer: Arc<dyn UptimeIndexer>,
}

impl UptimeService {
    pub fn new(
        cfg: Config,
        store: Arc<dyn ProofStore>,
        signer: Arc<dyn UptimeSigner>,
        contract: Arc<dyn ProofSubmitter>,
        indexer: Arc<dyn UptimeIndexer>,
    ) -> Self {
        Self {
            cfg,
            store,
            signer,
            contract,
            indexer,
        }
    }

    fn bootstrap_set(&self) -> HashSet<ValidationId> {
        let mut set = HashSet::with_capacity(self.cfg.bootstrap_validators.len());
        for raw in &self.cfg.bootstrap_validators {
            match ValidationId::from_cb58(raw) {
                Ok(id) => {
                    set.insert(id);
                }
                Err(err) => {
                    warn!(entry = %raw, %err, "ignoring unparseable bootstrap validator");
                }
            }
        }
        set
    }

    /// End-to-end path: observe, negotiate, submit, store.
    pub async fn generate_and_submit(&self) -> Result<RunSummary> {
        info!("starting uptime proof generation and submission");

        let client = observer::http_client()?;
        let observations =
            observer::fetch_aggregated_uptimes(&client, &self.cfg.avalanche_api_list).await;
        info!(
            validators = observations.len(),
            nodes = self.cfg.avalanche_api_list.len(),
            "fetched uptime observations"
        );

        self.submit_cycle(observations).await
    }

    /// One submit-and-store cycle over an already-fetched observation map.
    pub async fn submit_cycle(&self, observations: SampleMap) -> Result<RunSummary> {
        let bootstrap = self.bootstrap_set();
        // One snapshot per cycle; every validator negotiates against it.
        let stored = self.store.get_all().await?;

        let mut summary = RunSummary::default();

        for (validation_id, samples) in &observations {
            summary.processed += 1;

            if bootstrap.contains(validation_id) {
                info!(validator = %validation_id, "skipping bootstrap validator");
                summary.skipped += 1;
                continue;
            }
            if samples.is_empty() {
                info!(validator = %validation_id, "no uptime samples");
                summary.skipped += 1;
                continue;
            }

            let started = Instant::now();
            let stored_uptime = stored
                .get(validation_id)
                .map(|proof| proof.uptime_seconds)
                .unwrap_or(0);

            let result = match self
                .process_validator(*validation_id, samples, stored_uptime)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    summary.failed += 1;
                    error!(validator = %validation_id, %err, "failed to store uptime proof");
                    continue;
                }
            };

            match result {
                NegotiationResult::Advanced { uptime_seconds, .. } => {
                    summary.advanced += 1;
                    info!(
                        validator = %validation_id,
                        uptime = uptime_seconds,
                        elapsed = ?started.elapsed(),
                        "stored and submitted uptime proof"
                    );
                }
                NegotiationResult::RefreshedAtStored { uptime_seconds, .. } => {
                    summary.refreshed += 1;
                    info!(
                        validator = %validation_id,
                        uptime = uptime_seconds,
                        elapsed = ?started.elapsed(),
                        "refreshed uptime proof signature"
                    );
                }
                NegotiationResult::Unsignable => {
                    summary.unsignable += 1;
                    error!(validator = %validation_id, "could not obtain any valid signature");
                }
                NegotiationResult::SubmissionFailed { reason } => {
                    summary.failed += 1;
                    error!(validator = %validation_id, %reason, "submission failed, proof not stored");
                }
            }
        }

        info!(%summary, "submit cycle finished");
        Ok(summary)
    }

    /// Negotiates, submits, and persists one validator's proof.
    ///
    /// Submission happens before the store write, so a persisted proof
    /// always reflects a value the chain accepted at least once this
    /// cycle; a crash in between only costs a duplicate submission, which
    /// the chain absorbs. Only store failures escape as errors; everything
    /// else is folded into the per-validator result.
    async fn process_validator(
        &self,
        validation_id: ValidationId,
        samples: &[u64],
        stored_uptime: u64,
    ) -> Result<NegotiationResult> {
        let Some(Negotiated {
            uptime_seconds,
            signed,
        }) = negotiate_uptime(self.signer.as_ref(), validation_id, samples, stored_uptime).await
        else {
            return Ok(NegotiationResult::Unsignable);
        };

        if let Err(err) = self
            .contract
            .submit_uptime_proof(validation_id, &signed)
            .await
        {
            return Ok(NegotiationResult::SubmissionFailed {
                reason: err.to_string(),
            });
        }

        match self.store.store(validation_id, uptime_seconds, &signed).await {
            Ok(()) => {
                if uptime_seconds > stored_uptime {
                    Ok(NegotiationResult::Advanced {
                        uptime_seconds,
                        signed,
                    })
                } else {
                    Ok(NegotiationResult::RefreshedAtStored {
                        uptime_seconds,
                        signed,
                    })
                }
            }
            Err(err) => match err.refresh_required() {
                // The chain accepted a lower value but the store already
                // holds a higher one: re-sign at the stored uptime so the
                // row keeps a fresh signature.
                Some(stored) => self.refresh_at_stored(validation_id, stored).await,
                None => Err(err),
            },
        }
    }

    async fn refresh_at_stored(
        &self,
        validation_id: ValidationId,
        stored_uptime: u64,
    ) -> Result<NegotiationResult> {
        info!(
            validator = %validation_id,
            uptime = stored_uptime,
            "re-signing at stored higher uptime"
        );

        let signed = self
            .signer
            .sign_uptime(validation_id, stored_uptime)
            .await
            .map_err(|e| UptimeError::Aggregator(format!("refresh signature failed: {e}")))?;

        self.contract
            .submit_uptime_proof(validation_id, &signed)
            .await
            .map_err(|e| UptimeError::Contract(format!("refresh submission failed: {e}")))?;

        self.store
            .store(validation_id, stored_uptime, &signed)
            .await?;

        Ok(NegotiationResult::RefreshedAtStored {
            uptime_seconds: stored_uptime,
            signed,
        })
    }

    /// Reconciliation: finds stored proofs the indexer does not list for
    /// the epoch and resubmits them, re-signing when the chain reports the
    /// persisted signature as stale. Per-validator failures are collected,
    /// never fatal.
    pub async fn submit_missing_uptime_proofs(&self, epoch: &str) -> Result<ReconcileReport> {
        info!(epoch, "checking for missing uptime submissions");

        let stored = self.store.get_all().await?;
        let listed = self.indexer.uptime_updates_for_epoch(epoch).await?;

        let mut missing: Vec<&UptimeProof> = stored
            .values()
            .filter(|proof| !listed.contains(&proof.validation_id))
            .collect();
        missing.sort_by_key(|proof| proof.validation_id);

        let mut report = ReconcileReport {
            checked: stored.len(),
            missing: missing.len(),
            ..ReconcileReport::default()
        };
        info!(
            missing = report.missing,
            checked = report.checked,
            "validators missing from indexer uptime updates"
        );
        if missing.is_empty() {
            info!("all uptime proofs appear to be submitted");
            return Ok(report);
        }

        for proof in missing {
            let validation_id = proof.validation_id;
            match self
                .contract
                .submit_uptime_proof(validation_id, &proof.signed_message)
                .await
            {
                Ok(()) => {
                    report.submitted += 1;
                    info!(validator = %validation_id, "submitted stored proof");
                }
                Err(err) if err.is_stale_signature() => {
                    match self.resign_and_resubmit(proof).await {
                        Ok(()) => {
                            report.submitted += 1;
                            report.resigned += 1;
                            info!(validator = %validation_id, "re-signed and submitted proof");
                        }
                        Err(reason) => {
                            report.failures.insert(validation_id, reason);
                        }
                    }
                }
                Err(err) => {
                    report
                        .failures
                        .insert(validation_id, format!("initial error: {err}"));
                }
            }
        }

        if report.is_clean() {
            info!("all missing uptime proofs successfully submitted");
        } else {
            error!(failures = report.failures.len(), "some validators failed and were skipped");
            for (validation_id, reason) in &report.failures {
                error!(validator = %validation_id, %reason, "reconciliation failure");
            }
        }
        Ok(report)
    }

    /// The stale-signature path of reconciliation: fresh quorum signature
    /// at the stored uptime, resubmit, then persist the refreshed message
    /// at the unchanged uptime. Failure reasons keep the step that failed.
    async fn resign_and_resubmit(&self, proof: &UptimeProof) -> std::result::Result<(), String> {
        let validation_id = proof.validation_id;
        info!(validator = %validation_id, "expired signed message, re-signing");

        let signed = self
            .signer
            .sign_uptime(validation_id, proof.uptime_seconds)
            .await
            .map_err(|e| format!("re-sign error: {e}"))?;

        self.contract
            .submit_uptime_proof(validation_id, &signed)
            .await
            .map_err(|e| format!("resubmit error: {e}"))?;

        self.store
            .store(validation_id, proof.uptime_seconds, &signed)
            .await
            .map_err(|e| format!("store refresh error: {e}"))?;

        Ok(())
    }

    /// Resolves delegator rewards for every validator with a stored proof.
    pub async fn resolve_rewards(&self) -> Result<()> {
        let proofs = self.store.get_all().await?;
        if proofs.is_empty() {
            info!("no uptime proofs in database for resolving rewards");
            return Ok(());
        }

        let mut validators: Vec<ValidationId> = proofs.keys().copied().collect();
        validators.sort();
        info!(validators = validators.len(), "resolving rewards");

        for validation_id in validators {
            let delegations = match self.indexer.delegations_for_validator(validation_id).await {
                Ok(delegations) => delegations,
                Err(err) => {
                    error!(validator = %validation_id, %err, "fetch delegations failed");
                    continue;
                }
            };
            if delegations.is_empty() {
                info!(validator = %validation_id, "no delegations");
                continue;
            }
            info!(
                validator = %validation_id,
                delegations = delegations.len(),
                "submitting resolveRewards"
            );

            if let Err(err) = self.resolve_for_validator(&delegations).await {
                error!(validator = %validation_id, %err, "resolve rewards failed");
                continue;
            }
            info!(validator = %validation_id, "resolved rewards");
        }

        Ok(())
    }

    /// Submits one validator's delegations in fixed-size batches, pausing
    /// between transactions to avoid contending on the submitter's nonce.
    async fn resolve_for_validator(&self, delegations: &[Delegation]) -> Result<()> {
        let batches = delegations.chunks(REWARDS_BATCH_SIZE);
        let total = batches.len();

        for (index, batch) in batches.enumerate() {
            let ids: Vec<[u8; 32]> = batch.iter().map(|d| d.id).collect();
            self.contract.resolve_rewards(&ids).await?;
            info!(
                batch = index + 1,
                batches = total,
                delegations = ids.len(),
                "resolveRewards batch accepted"
            );
            if self.cfg.rewards_batch_delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(self.cfg.rewards_batch_delay_seconds)).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::traits::{
        MockProofStore, MockProofSubmitter, MockUptimeIndexer, MockUptimeSigner,
    };

    fn vid(byte: u8) -> ValidationId {
        ValidationId::from_bytes([byte; 32])
    }

    fn service_with(
        store: MockProofStore,
        signer: MockUptimeSigner,
        contract: MockProofSubmitter,
        indexer: MockUptimeIndexer,
    ) -> UptimeService {
        UptimeService::new(
            Config::default(),
            Arc::new(store),
            Arc::new(signer),
            Arc::new(contract),
            Arc::new(indexer),
        )
    }

    #[tokio::test]
    async fn snapshot_failure_is_fatal_for_the_cycle() {
        let mut store = MockProofStore::new();
        store
            .expect_get_all()
            .returning(|| Err(UptimeError::Internal("connection refused".to_string())));

        let svc = service_with(
            store,
            MockUptimeSigner::new(),
            MockProofSubmitter::new(),
            MockUptimeIndexer::new(),
        );

        let mut observations = BTreeMap::new();
        observations.insert(vid(1), vec![100]);
        assert!(svc.submit_cycle(observations).await.is_err());
    }

    #[tokio::test]
    async fn store_write_failure_skips_the_validator_only() {
        let mut store = MockProofStore::new();
        store.expect_get_all().returning(|| Ok(Default::default()));
        store
            .expect_store()
            .returning(|_, _, _| Err(UptimeError::Internal("disk full".to_string())));

        let mut signer = MockUptimeSigner::new();
        signer.expect_sign_uptime().returning(|id, uptime| {
            if uptime == 100 {
                Ok(crate::domain::SignedUptimeMessage::from_bytes(
                    crate::message::pack_uptime_payload(id, uptime).to_vec(),
                ))
            } else {
                Err(UptimeError::Aggregator("quorum miss".to_string()))
            }
        });

        let mut contract = MockProofSubmitter::new();
        contract
            .expect_submit_uptime_proof()
            .returning(|_, _| Ok(()));

        let svc = service_with(store, signer, contract, MockUptimeIndexer::new());

        let mut observations = BTreeMap::new();
        observations.insert(vid(1), vec![100]);
        let summary = svc.submit_cycle(observations).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
    }
}
