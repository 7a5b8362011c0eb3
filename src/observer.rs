//! Observation aggregator: fans out one `validators.getCurrentValidators`
//! read per configured node and merges the answers into per-validator
//! sample sequences.

use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{SampleMap, UptimeSample, ValidationId};
use crate::error::{Result, UptimeError};

const RPC_BODY: &str =
    r#"{"jsonrpc":"2.0","id":1,"method":"validators.getCurrentValidators","params":{}}"#;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    validators: Vec<RpcValidator>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcValidator {
    #[serde(rename = "validationID")]
    validation_id: String,
    #[serde(rename = "uptimeSeconds")]
    uptime_seconds: u64,
    #[serde(rename = "nodeID", default)]
    node_id: String,
    #[serde(rename = "isActive", default)]
    is_active: bool,
}

/// Builds the HTTP client shared by one observation cycle.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Reads the current validator set from a single node.
pub async fn fetch_uptimes_from_node(
    client: &Client,
    api_base_url: &str,
) -> Result<Vec<UptimeSample>> {
    let url = format!("{api_base_url}/validators");
    let response = client
        .post(&url)
        .header("content-type", "application/json")
        .body(RPC_BODY)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(UptimeError::Internal(format!(
            "unexpected status {status} from {api_base_url}"
        )));
    }

    let rpc: RpcResponse = response.json().await?;
    if let Some(err) = rpc.error {
        return Err(UptimeError::Internal(format!(
            "validators API error {} from {api_base_url}: {}",
            err.code, err.message
        )));
    }
    let result = rpc.result.ok_or_else(|| {
        UptimeError::Internal(format!("missing result in response from {api_base_url}"))
    })?;

    let mut samples = Vec::with_capacity(result.validators.len());
    for v in result.validators {
        let validation_id = match ValidationId::from_cb58(&v.validation_id) {
            Ok(id) => id,
            Err(err) => {
                warn!(node = %api_base_url, raw = %v.validation_id, %err, "dropping sample with unparseable validation id");
                continue;
            }
        };
        samples.push(UptimeSample {
            validation_id,
            uptime_seconds: v.uptime_seconds,
            node_id: v.node_id,
            is_active: v.is_active,
        });
    }
    Ok(samples)
}

/// Fans out one read per endpoint and merges the samples into
/// `validationID -> descending uptime values`, duplicates preserved.
///
/// Each endpoint is its own failure domain: an unreachable or malformed
/// node drops only its own samples. With every endpoint down the map is
/// empty and the cycle becomes a no-op.
pub async fn fetch_aggregated_uptimes(client: &Client, endpoints: &[String]) -> SampleMap {
    let reads = endpoints.iter().map(|endpoint| {
        let client = client.clone();
        async move {
            match fetch_uptimes_from_node(&client, endpoint).await {
                Ok(samples) => {
                    debug!(node = %endpoint, samples = samples.len(), "fetched validator uptimes");
                    samples
                }
                Err(err) => {
                    warn!(node = %endpoint, %err, "skipping unreachable validator node");
                    Vec::new()
                }
            }
        }
    });

    let mut merged = SampleMap::new();
    for samples in join_all(reads).await {
        for sample in samples {
            merged
                .entry(sample.validation_id)
                .or_default()
                .push(sample.uptime_seconds);
        }
    }

    for values in merged.values_mut() {
        values.sort_unstable_by(|a, b| b.cmp(a));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validators_response() {
        let id = ValidationId::from_bytes([3u8; 32]);
        let raw = format!(
            r#"{{
                "jsonrpc": "2.0",
                "id": 1,
                "result": {{
                    "validators": [
                        {{"validationID": "{}", "uptimeSeconds": 1234, "nodeID": "NodeID-abc", "isActive": true}}
                    ]
                }}
            }}"#,
            id.to_cb58()
        );
        let rpc: RpcResponse = serde_json::from_str(&raw).unwrap();
        let validators = rpc.result.unwrap().validators;
        assert_eq!(validators.len(), 1);
        assert_eq!(validators[0].uptime_seconds, 1234);
        assert!(validators[0].is_active);
        assert_eq!(
            ValidationId::from_cb58(&validators[0].validation_id).unwrap(),
            id
        );
    }

    #[test]
    fn parses_rpc_error() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#;
        let rpc: RpcResponse = serde_json::from_str(raw).unwrap();
        let err = rpc.error.unwrap();
        assert_eq!(err.code, -32601);
        assert!(rpc.result.is_none());
    }

    #[test]
    fn rpc_body_is_the_canonical_request() {
        let value: serde_json::Value = serde_json::from_str(RPC_BODY).unwrap();
        assert_eq!(value["method"], "validators.getCurrentValidators");
        assert_eq!(value["jsonrpc"], "2.0");
    }
}
