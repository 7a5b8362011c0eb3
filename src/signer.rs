//! Signature aggregator client.
//!
//! Packs the canonical uptime payload and asks the aggregation service for
//! a quorum signature over it. Whether a given `(validationID, uptime)`
//! pair is signable is entirely the quorum's call; a refusal is an ordinary
//! error that the negotiation engine treats as "try another value".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{normalize_hex, SignedUptimeMessage, ValidationId};
use crate::error::{Result, UptimeError};
use crate::message::pack_uptime_payload;
use crate::traits::UptimeSigner;

const AGGREGATE_PATH: &str = "/v1/signatureAggregator/fuji/aggregateSignatures";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct AggregateRequest {
    message: String,
    #[serde(rename = "signing-subnet-id", skip_serializing_if = "Option::is_none")]
    signing_subnet_id: Option<String>,
    #[serde(rename = "quorum-percentage", skip_serializing_if = "Option::is_none")]
    quorum_percentage: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(rename = "signed-message")]
    signed_message: String,
}

#[derive(Debug, Deserialize)]
struct AggregateErrorBody {
    #[serde(default)]
    error: String,
}

/// HTTP client for the signature aggregation service.
pub struct AggregatorClient {
    http: Client,
    base_url: String,
    signing_subnet_id: Option<String>,
    quorum_percentage: Option<u32>,
}

impl AggregatorClient {
    /// `network_id` and `source_chain_id` identify the envelope the
    /// aggregator wraps around the payload; they are fixed per deployment
    /// and only logged here.
    pub fn new(
        base_url: &str,
        network_id: u32,
        signing_subnet_id: &str,
        source_chain_id: &str,
        quorum_percentage: u32,
    ) -> Result<Self> {
        if base_url.is_empty() {
            return Err(UptimeError::Configuration(
                "aggregator_url cannot be empty".to_string(),
            ));
        }
        debug!(
            %base_url,
            network_id,
            source_chain_id,
            "aggregator client ready"
        );
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_subnet_id: (!signing_subnet_id.is_empty())
                .then(|| signing_subnet_id.to_string()),
            quorum_percentage: (quorum_percentage > 0).then_some(quorum_percentage),
        })
    }

    async fn request_aggregate(&self, unsigned_payload: &[u8]) -> Result<SignedUptimeMessage> {
        let request = AggregateRequest {
            message: hex::encode(unsigned_payload),
            signing_subnet_id: self.signing_subnet_id.clone(),
            quorum_percentage: self.quorum_percentage,
        };

        let url = format!("{}{}", self.base_url, AGGREGATE_PATH);
        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<AggregateErrorBody>(&body) {
                if !err.error.is_empty() {
                    return Err(UptimeError::Aggregator(err.error));
                }
            }
            return Err(UptimeError::Aggregator(format!(
                "aggregation failed with status {status}: {body}"
            )));
        }

        let decoded: AggregateResponse = serde_json::from_str(&body)
            .map_err(|e| UptimeError::Aggregator(format!("decode response: {e}")))?;
        let signed_bytes = hex::decode(normalize_hex(&decoded.signed_message).as_ref())
            .map_err(|e| UptimeError::Aggregator(format!("invalid hex in signed-message: {e}")))?;

        debug!(len = signed_bytes.len(), "decoded aggregated signed message");
        Ok(SignedUptimeMessage::from_bytes(signed_bytes))
    }
}

#[async_trait]
impl UptimeSigner for AggregatorClient {
    async fn sign_uptime(
        &self,
        validation_id: ValidationId,
        uptime_seconds: u64,
    ) -> Result<SignedUptimeMessage> {
        let payload = pack_uptime_payload(validation_id, uptime_seconds);
        self.request_aggregate(&payload).await
    }
}
