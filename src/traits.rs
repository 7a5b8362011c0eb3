//! Trait definitions for the proof pipeline's external collaborators.
//!
//! Each seam has exactly one production implementation and is swappable for
//! an in-memory fake in tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{Delegation, SignedUptimeMessage, UptimeProof, ValidationId};
use crate::error::Result;

/// Durable map `validationID -> uptime proof` with a monotonic advance
/// contract.
///
/// Invariant: across successful `store` calls for the same validation ID,
/// `uptime_seconds` never decreases. The store is the sole enforcer; callers
/// must not bypass it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Snapshot of every persisted proof, keyed by validation ID.
    async fn get_all(&self) -> Result<HashMap<ValidationId, UptimeProof>>;

    /// Conditional upsert:
    ///
    /// - no existing row, or `uptime_seconds` above the stored value: write;
    /// - equal to the stored value: replace the signed message only
    ///   (signature refresh);
    /// - below the stored value: no write, fails with
    ///   [`UptimeError::RefreshRequired`](crate::error::UptimeError)
    ///   carrying the stored uptime.
    async fn store(
        &self,
        validation_id: ValidationId,
        uptime_seconds: u64,
        signed_message: &SignedUptimeMessage,
    ) -> Result<()>;

    /// Releases the backing connections.
    async fn close(&self);
}

/// Requests an aggregated quorum signature over the canonical uptime payload.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UptimeSigner: Send + Sync {
    /// Returns the signed message, or an error when the quorum cannot be
    /// assembled for this `(validationID, uptime)` pair.
    async fn sign_uptime(
        &self,
        validation_id: ValidationId,
        uptime_seconds: u64,
    ) -> Result<SignedUptimeMessage>;
}

/// Submits transactions to the staking-manager contract.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    /// Submits a signed uptime proof. A signed message the chain no longer
    /// accepts surfaces as
    /// [`UptimeError::StaleSignature`](crate::error::UptimeError), so callers
    /// can re-sign instead of string-matching revert reasons.
    async fn submit_uptime_proof(
        &self,
        validation_id: ValidationId,
        signed_message: &SignedUptimeMessage,
    ) -> Result<()>;

    /// Submits one `resolveRewards` batch. Batching and pacing are the
    /// caller's concern.
    async fn resolve_rewards(&self, delegation_ids: &[[u8; 32]]) -> Result<()>;
}

/// Read-only view of what the chain indexer has already seen.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UptimeIndexer: Send + Sync {
    /// Validation IDs with an uptime update recorded in the given epoch.
    async fn uptime_updates_for_epoch(&self, epoch: &str) -> Result<HashSet<ValidationId>>;

    /// Delegations of a validator that still await reward resolution.
    async fn delegations_for_validator(
        &self,
        validation_id: ValidationId,
    ) -> Result<Vec<Delegation>>;
}
