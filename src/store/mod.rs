//! Durable proof store.
//!
//! One relational table, `uptime_proofs`, created on first connect. The
//! store is the sole enforcer of the monotonic-advance invariant: a write
//! below the persisted uptime never lands and instead signals
//! `RefreshRequired` with the stored value.

mod postgres;
mod sqlite;

use std::sync::Arc;

pub use postgres::PostgresProofStore;
pub use sqlite::SqliteProofStore;

use crate::domain::{SignedUptimeMessage, UptimeProof, ValidationId};
use crate::error::{Result, UptimeError};
use crate::traits::ProofStore;

/// Opens the backend selected by the connection string: `sqlite:` URLs get
/// the SQLite store, everything else Postgres.
pub async fn connect(database_url: &str) -> Result<Arc<dyn ProofStore>> {
    if database_url.is_empty() {
        return Err(UptimeError::Configuration(
            "database_url cannot be empty".to_string(),
        ));
    }
    if database_url.starts_with("sqlite") {
        Ok(Arc::new(SqliteProofStore::connect(database_url).await?))
    } else {
        Ok(Arc::new(PostgresProofStore::connect(database_url).await?))
    }
}

/// Which write the conditional upsert should perform, given the existing
/// row. Shared by both backends so their branching cannot drift apart.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UpsertAction {
    Insert,
    Advance,
    RefreshSignature,
}

pub(crate) fn classify_upsert(
    new_uptime: u64,
    existing_uptime: Option<u64>,
) -> Result<UpsertAction> {
    match existing_uptime {
        None => Ok(UpsertAction::Insert),
        Some(existing) if new_uptime > existing => Ok(UpsertAction::Advance),
        Some(existing) if new_uptime == existing => Ok(UpsertAction::RefreshSignature),
        Some(existing) => Err(UptimeError::RefreshRequired(existing)),
    }
}

/// Re-validates a persisted row. Corrupt state is fatal for the command.
pub(crate) fn decode_row(
    validation_id: &str,
    uptime_seconds: i64,
    signed_message: Vec<u8>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
) -> Result<UptimeProof> {
    let parsed = ValidationId::from_cb58(validation_id).map_err(|e| UptimeError::CorruptProof {
        validation_id: validation_id.to_string(),
        reason: format!("invalid validation id: {e}"),
    })?;
    if signed_message.is_empty() {
        return Err(UptimeError::CorruptProof {
            validation_id: validation_id.to_string(),
            reason: "empty signed message".to_string(),
        });
    }
    Ok(UptimeProof {
        validation_id: parsed,
        uptime_seconds: uptime_seconds as u64,
        signed_message: SignedUptimeMessage::from_bytes(signed_message),
        created_at,
        updated_at,
    })
}
