//! Core domain types: validation IDs, uptime samples, stored proofs, and
//! per-run result types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, UptimeError};

/// Length of the CB58 checksum suffix in bytes.
const CHECKSUM_LEN: usize = 4;

/// 32-byte identifier of a validator registration.
///
/// Two canonical encodings exist: the CB58 form (base58 over the 32 bytes
/// plus a 4-byte SHA-256 checksum suffix) used by the validator RPCs and as
/// the store key, and the lowercase hex form used by the indexer. All
/// comparisons happen on the raw 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidationId([u8; 32]);

impl ValidationId {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses the CB58 form. A `NodeID-` prefix is tolerated, and payloads
    /// shorter than 32 bytes are left-padded with zeros.
    pub fn from_cb58(input: &str) -> Result<Self> {
        let trimmed = input.strip_prefix("NodeID-").unwrap_or(input);

        let decoded = bs58::decode(trimmed).into_vec().map_err(|e| {
            UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: format!("base58 decode: {e}"),
            }
        })?;
        if decoded.len() <= CHECKSUM_LEN {
            return Err(UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: "decoded payload too short".to_string(),
            });
        }

        let (data, checksum) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
        let digest = Sha256::digest(data);
        if checksum != &digest[digest.len() - CHECKSUM_LEN..] {
            return Err(UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: "checksum mismatch".to_string(),
            });
        }
        if data.len() > Self::LEN {
            return Err(UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: format!("payload is {} bytes, exceeds 32", data.len()),
            });
        }

        let mut bytes = [0u8; Self::LEN];
        bytes[Self::LEN - data.len()..].copy_from_slice(data);
        Ok(Self(bytes))
    }

    /// Encodes the CB58 form: base58 over the 32 bytes plus the last four
    /// bytes of their SHA-256 digest.
    pub fn to_cb58(&self) -> String {
        let digest = Sha256::digest(self.0);
        let mut buf = Vec::with_capacity(Self::LEN + CHECKSUM_LEN);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
        bs58::encode(buf).into_string()
    }

    /// Parses the hex form. Case-insensitive, `0x` tolerated, values
    /// shorter than 32 bytes are left-padded with zeros.
    pub fn from_hex(input: &str) -> Result<Self> {
        let normalized = normalize_hex(input);
        let decoded =
            hex::decode(normalized.as_ref()).map_err(|e| UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: format!("hex decode: {e}"),
            })?;
        if decoded.len() > Self::LEN {
            return Err(UptimeError::InvalidValidationId {
                input: input.to_string(),
                reason: format!("payload is {} bytes, exceeds 32", decoded.len()),
            });
        }
        let mut bytes = [0u8; Self::LEN];
        bytes[Self::LEN - decoded.len()..].copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Lowercase hex form without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ValidationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cb58())
    }
}

impl fmt::Debug for ValidationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidationId({})", self.to_cb58())
    }
}

impl FromStr for ValidationId {
    type Err = UptimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_cb58(s)
    }
}

/// Strips an optional `0x` prefix and lowercases the rest.
pub fn normalize_hex(input: &str) -> std::borrow::Cow<'_, str> {
    let stripped = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if stripped.chars().any(|c| c.is_ascii_uppercase()) {
        std::borrow::Cow::Owned(stripped.to_ascii_lowercase())
    } else {
        std::borrow::Cow::Borrowed(stripped)
    }
}

/// One uptime observation from a single validator node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UptimeSample {
    pub validation_id: ValidationId,
    pub uptime_seconds: u64,
    pub node_id: String,
    pub is_active: bool,
}

/// Aggregated observations: per validator, uptime values sorted descending
/// with duplicates preserved (multiplicity is a weak quorum signal).
pub type SampleMap = BTreeMap<ValidationId, Vec<u64>>;

/// An aggregated, quorum-signed uptime message. Opaque to this service;
/// the contract decides whether it is still acceptable.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedUptimeMessage(Vec<u8>);

impl SignedUptimeMessage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SignedUptimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview_len = self.0.len().min(8);
        write!(
            f,
            "SignedUptimeMessage({} bytes, {}..)",
            self.0.len(),
            hex::encode(&self.0[..preview_len])
        )
    }
}

/// A persisted uptime proof row.
#[derive(Debug, Clone)]
pub struct UptimeProof {
    pub validation_id: ValidationId,
    pub uptime_seconds: u64,
    pub signed_message: SignedUptimeMessage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of negotiating and submitting one validator's proof.
#[derive(Debug)]
pub enum NegotiationResult {
    /// The stored uptime advanced to a strictly larger value.
    Advanced {
        uptime_seconds: u64,
        signed: SignedUptimeMessage,
    },
    /// The stored uptime was unchanged but its signature was refreshed.
    RefreshedAtStored {
        uptime_seconds: u64,
        signed: SignedUptimeMessage,
    },
    /// No candidate uptime obtained a quorum signature.
    Unsignable,
    /// A signature was obtained but the chain rejected the submission.
    SubmissionFailed { reason: String },
}

/// A delegation awaiting reward resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub id: [u8; 32],
    pub validation_id: ValidationId,
}

/// Per-run counters for the submit-and-store pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub advanced: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub unsignable: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} advanced={} refreshed={} skipped={} unsignable={} failed={}",
            self.processed, self.advanced, self.refreshed, self.skipped, self.unsignable, self.failed
        )
    }
}

/// Result of a reconciliation pass over one epoch.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Stored proofs examined.
    pub checked: usize,
    /// Proofs absent from the indexer for the epoch.
    pub missing: usize,
    /// Successful submissions (including after a re-sign).
    pub submitted: usize,
    /// Proofs that needed a fresh signature before the chain accepted them.
    pub resigned: usize,
    /// Per-validator failure reasons; an empty map means a clean pass.
    pub failures: BTreeMap<ValidationId, String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> ValidationId {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        ValidationId::from_bytes(bytes)
    }

    #[test]
    fn cb58_round_trip() {
        let id = sample_id();
        let encoded = id.to_cb58();
        let decoded = ValidationId::from_cb58(&encoded).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn hex_round_trip() {
        let id = sample_id();
        let encoded = id.to_hex();
        assert_eq!(encoded.len(), 64);
        let decoded = ValidationId::from_hex(&encoded).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn cross_encoding_identities() {
        let id = sample_id();
        let via_hex = ValidationId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(via_hex.to_cb58(), id.to_cb58());
        let via_cb58 = ValidationId::from_cb58(&id.to_cb58()).unwrap();
        assert_eq!(via_cb58.to_hex(), id.to_hex());
    }

    #[test]
    fn hex_tolerates_prefix_and_case() {
        let id = sample_id();
        let upper = format!("0x{}", id.to_hex().to_ascii_uppercase());
        assert_eq!(ValidationId::from_hex(&upper).unwrap(), id);
    }

    #[test]
    fn short_hex_is_left_padded() {
        let id = ValidationId::from_hex("0xff").unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 0xff;
        assert_eq!(id.as_bytes(), &expected);
    }

    #[test]
    fn cb58_rejects_bad_checksum() {
        let id = sample_id();
        let mut encoded = id.to_cb58();
        // Flip the final character to corrupt the checksum.
        let last = encoded.pop().unwrap();
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(ValidationId::from_cb58(&encoded).is_err());
    }

    #[test]
    fn cb58_rejects_garbage() {
        assert!(ValidationId::from_cb58("not-base58-0OIl").is_err());
        assert!(ValidationId::from_cb58("").is_err());
    }

    #[test]
    fn cb58_tolerates_node_id_prefix() {
        let id = sample_id();
        let prefixed = format!("NodeID-{}", id.to_cb58());
        assert_eq!(ValidationId::from_cb58(&prefixed).unwrap(), id);
    }

    #[test]
    fn normalize_hex_strips_prefix_and_lowercases() {
        assert_eq!(normalize_hex("0xAbCd").as_ref(), "abcd");
        assert_eq!(normalize_hex("abcd").as_ref(), "abcd");
    }

    #[test]
    fn run_summary_display_lists_all_counters() {
        let summary = RunSummary {
            processed: 5,
            advanced: 2,
            refreshed: 1,
            skipped: 1,
            unsignable: 1,
            failed: 0,
        };
        let rendered = summary.to_string();
        assert!(rendered.contains("processed=5"));
        assert!(rendered.contains("advanced=2"));
        assert!(rendered.contains("failed=0"));
    }

    #[test]
    fn signed_message_debug_is_truncated() {
        let msg = SignedUptimeMessage::from_bytes(vec![0xAB; 64]);
        let rendered = format!("{msg:?}");
        assert!(rendered.contains("64 bytes"));
        assert!(rendered.contains("abababab"));
    }
}
