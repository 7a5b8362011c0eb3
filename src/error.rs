//! Error types for the uptime proof service.

use thiserror::Error;

use crate::domain::ValidationId;

/// Errors that can occur across the proof pipeline.
#[derive(Error, Debug)]
pub enum UptimeError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store holds a higher uptime than the one being written.
    ///
    /// The `Display` form is the stable sentinel `refresh_required:<n>`;
    /// callers are expected to re-sign at the carried uptime and retry.
    #[error("refresh_required:{0}")]
    RefreshRequired(u64),

    /// A persisted row failed re-validation on load.
    #[error("corrupt stored proof for {validation_id}: {reason}")]
    CorruptProof {
        validation_id: String,
        reason: String,
    },

    /// Invalid validation ID encoding (CB58 or hex)
    #[error("invalid validation id {input:?}: {reason}")]
    InvalidValidationId { input: String, reason: String },

    /// Malformed canonical uptime payload
    #[error("invalid uptime payload: {0}")]
    InvalidPayload(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP transport error
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Signature aggregator rejected or failed the request
    #[error("aggregator error: {0}")]
    Aggregator(String),

    /// The contract rejected the signed message as no longer valid.
    #[error("stale signed message for {validation_id}")]
    StaleSignature { validation_id: ValidationId },

    /// Contract submission error
    #[error("contract error: {0}")]
    Contract(String),

    /// Indexer query error
    #[error("indexer error: {0}")]
    Indexer(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl UptimeError {
    /// The stored uptime carried by a `RefreshRequired` signal, if any.
    pub fn refresh_required(&self) -> Option<u64> {
        match self {
            UptimeError::RefreshRequired(stored) => Some(*stored),
            _ => None,
        }
    }

    /// Whether this error marks the signed message as stale on-chain.
    pub fn is_stale_signature(&self) -> bool {
        matches!(self, UptimeError::StaleSignature { .. })
    }
}

/// Result type for uptime service operations
pub type Result<T> = std::result::Result<T, UptimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_required_sentinel_format_is_stable() {
        let err = UptimeError::RefreshRequired(1050);
        assert_eq!(err.to_string(), "refresh_required:1050");
        assert_eq!(err.refresh_required(), Some(1050));
    }

    #[test]
    fn other_errors_carry_no_refresh_signal() {
        let err = UptimeError::Aggregator("quorum miss".to_string());
        assert_eq!(err.refresh_required(), None);
        assert!(!err.is_stale_signature());
    }

    #[test]
    fn stale_signature_is_detectable() {
        let err = UptimeError::StaleSignature {
            validation_id: ValidationId::from_bytes([7u8; 32]),
        };
        assert!(err.is_stale_signature());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UptimeError>();
    }
}
