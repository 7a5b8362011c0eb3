//! Canonical uptime payload codec.
//!
//! The payload signed by the aggregation quorum and validated on-chain is a
//! fixed 46-byte, big-endian structure:
//!
//! ```text
//! codecID : u16 = 0
//! typeID  : u32 = 0
//! validationID : 32 bytes
//! uptime  : u64 (seconds)
//! ```
//!
//! The outer envelope (addressed-call framing and the quorum signature) is
//! produced and checked by the aggregator and the contract; this module only
//! deals with the inner payload.

use crate::domain::ValidationId;
use crate::error::{Result, UptimeError};

pub const CODEC_ID: u16 = 0;
pub const TYPE_ID: u32 = 0;
pub const UPTIME_PAYLOAD_LEN: usize = 46;

/// Packs `(validationID, uptimeSeconds)` into the canonical 46-byte payload.
pub fn pack_uptime_payload(
    validation_id: ValidationId,
    uptime_seconds: u64,
) -> [u8; UPTIME_PAYLOAD_LEN] {
    let mut payload = [0u8; UPTIME_PAYLOAD_LEN];
    payload[0..2].copy_from_slice(&CODEC_ID.to_be_bytes());
    payload[2..6].copy_from_slice(&TYPE_ID.to_be_bytes());
    payload[6..38].copy_from_slice(validation_id.as_bytes());
    payload[38..46].copy_from_slice(&uptime_seconds.to_be_bytes());
    payload
}

/// Decodes a canonical payload back into `(validationID, uptimeSeconds)`.
pub fn unpack_uptime_payload(payload: &[u8]) -> Result<(ValidationId, u64)> {
    if payload.len() != UPTIME_PAYLOAD_LEN {
        return Err(UptimeError::InvalidPayload(format!(
            "expected {UPTIME_PAYLOAD_LEN} bytes, got {}",
            payload.len()
        )));
    }

    let codec_id = u16::from_be_bytes(payload[0..2].try_into().expect("fixed slice"));
    if codec_id != CODEC_ID {
        return Err(UptimeError::InvalidPayload(format!(
            "unexpected codec id {codec_id}"
        )));
    }
    let type_id = u32::from_be_bytes(payload[2..6].try_into().expect("fixed slice"));
    if type_id != TYPE_ID {
        return Err(UptimeError::InvalidPayload(format!(
            "unexpected type id {type_id}"
        )));
    }

    let mut id_bytes = [0u8; ValidationId::LEN];
    id_bytes.copy_from_slice(&payload[6..38]);
    let uptime_seconds = u64::from_be_bytes(payload[38..46].try_into().expect("fixed slice"));

    Ok((ValidationId::from_bytes(id_bytes), uptime_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_bit_exact_payload() {
        let mut id_bytes = [0u8; 32];
        id_bytes[0] = 0xDE;
        id_bytes[31] = 0xAD;
        let id = ValidationId::from_bytes(id_bytes);

        let payload = pack_uptime_payload(id, 0x0102030405060708);

        assert_eq!(payload.len(), 46);
        // codecID = 0, typeID = 0
        assert_eq!(&payload[0..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&payload[6..38], &id_bytes);
        assert_eq!(
            &payload[38..46],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn round_trips() {
        let id = ValidationId::from_bytes([0x5A; 32]);
        let payload = pack_uptime_payload(id, u64::MAX);
        let (decoded_id, decoded_uptime) = unpack_uptime_payload(&payload).unwrap();
        assert_eq!(decoded_id, id);
        assert_eq!(decoded_uptime, u64::MAX);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(unpack_uptime_payload(&[0u8; 45]).is_err());
        assert!(unpack_uptime_payload(&[0u8; 47]).is_err());
        assert!(unpack_uptime_payload(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_codec_or_type() {
        let id = ValidationId::from_bytes([1u8; 32]);
        let mut payload = pack_uptime_payload(id, 42);
        payload[1] = 1;
        assert!(unpack_uptime_payload(&payload).is_err());

        let mut payload = pack_uptime_payload(id, 42);
        payload[5] = 9;
        assert!(unpack_uptime_payload(&payload).is_err());
    }
}
