//! Negotiation engine.
//!
//! Searches the one-dimensional space of candidate uptimes for the largest
//! value the aggregation quorum will sign, without ever dropping below the
//! uptime already persisted for the validator. Observed samples are
//! untrusted hints: the engine probes them, ramps upward past the best one,
//! and decays downward when none of them sign.

use tracing::{debug, info};

use crate::domain::{SignedUptimeMessage, ValidationId};
use crate::traits::UptimeSigner;

/// A successfully negotiated `(uptime, signature)` pair.
#[derive(Debug)]
pub struct Negotiated {
    pub uptime_seconds: u64,
    pub signed: SignedUptimeMessage,
}

/// Next candidate on the upward ramp: 5% above the current value, always
/// strictly larger, saturating at `u64::MAX`.
fn ramp_up(current: u64) -> u64 {
    let scaled = (current as f64 * 1.05).ceil() as u64;
    scaled.max(current.saturating_add(1))
}

/// Next candidate on the downward sweep: 5% below the current value.
fn ramp_down(current: u64) -> u64 {
    (current as f64 * 0.95).floor() as u64
}

/// Finds the largest signable uptime for one validator.
///
/// `samples` must be sorted descending (`samples[0]` is the highest
/// observation) and non-empty; `stored_uptime` is the persisted value, `0`
/// when the validator has no proof yet. Returns `None` when no candidate
/// obtains a quorum signature.
pub async fn negotiate_uptime(
    signer: &dyn UptimeSigner,
    validation_id: ValidationId,
    samples: &[u64],
    stored_uptime: u64,
) -> Option<Negotiated> {
    // Forward sweep: first signable sample wins the slot.
    for (idx, &sample) in samples.iter().enumerate() {
        debug!(validator = %validation_id, sample, rank = idx, "trying observed sample");
        let signed = match signer.sign_uptime(validation_id, sample).await {
            Ok(signed) => signed,
            Err(err) => {
                debug!(validator = %validation_id, sample, %err, "sample not signable");
                continue;
            }
        };

        info!(validator = %validation_id, uptime = sample, "initial signature succeeded");
        let mut best = Negotiated {
            uptime_seconds: sample,
            signed,
        };

        // Ramp upward only from the highest sample. Any lower sample that
        // signed already sits under a proven ceiling.
        if idx == 0 {
            let mut current = sample;
            loop {
                let next = ramp_up(current);
                if next == current {
                    break;
                }
                debug!(validator = %validation_id, uptime = next, "trying increased uptime");
                match signer.sign_uptime(validation_id, next).await {
                    Ok(signed) => {
                        current = next;
                        best = Negotiated {
                            uptime_seconds: next,
                            signed,
                        };
                    }
                    Err(err) => {
                        debug!(
                            validator = %validation_id,
                            uptime = next,
                            kept = current,
                            %err,
                            "ramp stopped"
                        );
                        break;
                    }
                }
            }
        }

        return Some(best);
    }

    // Backward sweep from the lowest sample. The stored uptime is a
    // known-good lower bound: it gets one attempt and nothing below it is
    // ever probed.
    let mut current = *samples.last()?;
    info!(
        validator = %validation_id,
        from = current,
        floor = stored_uptime,
        "no sample signed, decreasing by 5%"
    );

    loop {
        current = ramp_down(current);
        if current == 0 {
            info!(validator = %validation_id, "uptime reached 0, giving up");
            return None;
        }

        if stored_uptime > 0 && current <= stored_uptime {
            debug!(validator = %validation_id, uptime = stored_uptime, "trying stored uptime");
            return match signer.sign_uptime(validation_id, stored_uptime).await {
                Ok(signed) => Some(Negotiated {
                    uptime_seconds: stored_uptime,
                    signed,
                }),
                Err(err) => {
                    info!(validator = %validation_id, %err, "stored uptime not signable, giving up");
                    None
                }
            };
        }

        debug!(validator = %validation_id, uptime = current, "trying decreased uptime");
        if let Ok(signed) = signer.sign_uptime(validation_id, current).await {
            return Some(Negotiated {
                uptime_seconds: current,
                signed,
            });
        }
    }
}
