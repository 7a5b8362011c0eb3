//! GraphQL indexer client.
//!
//! Two read paths: the uptime updates already visible on-chain for an
//! epoch (reconciliation input) and the delegations of a validator that
//! still await reward resolution. The indexer speaks lowercase hex; the
//! conversion to 32-byte IDs happens here, at the edge.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{normalize_hex, Delegation, ValidationId};
use crate::error::{Result, UptimeError};
use crate::traits::UptimeIndexer;

/// Page size the indexer serves; larger result sets require paging.
const PAGE_SIZE: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct GraphQlRequest {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UptimeUpdatesData {
    #[serde(rename = "uptimeUpdates")]
    uptime_updates: Vec<UptimeUpdateRow>,
}

#[derive(Debug, Deserialize)]
struct UptimeUpdateRow {
    #[serde(rename = "validationID")]
    validation_id: String,
}

#[derive(Debug, Deserialize)]
struct DelegationsData {
    delegations: Vec<DelegationRow>,
}

#[derive(Debug, Deserialize)]
struct DelegationRow {
    id: String,
    #[serde(rename = "validationID")]
    validation_id: String,
}

/// Client for the chain indexer's GraphQL endpoint.
pub struct GraphQlIndexer {
    http: Client,
    endpoint: String,
}

impl GraphQlIndexer {
    pub fn new(endpoint: &str) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(UptimeError::Configuration(
                "graphql_endpoint cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint: endpoint.to_string(),
        })
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: String,
        variables: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UptimeError::Indexer(format!(
                "unexpected status {status} from indexer"
            )));
        }

        let decoded: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| UptimeError::Indexer(format!("decode response: {e}")))?;
        if let Some(err) = decoded.errors.first() {
            return Err(UptimeError::Indexer(err.message.clone()));
        }
        decoded
            .data
            .ok_or_else(|| UptimeError::Indexer("response carried no data".to_string()))
    }
}

#[async_trait]
impl UptimeIndexer for GraphQlIndexer {
    async fn uptime_updates_for_epoch(&self, epoch: &str) -> Result<HashSet<ValidationId>> {
        let mut seen = HashSet::new();
        let mut skip = 0usize;

        loop {
            let query = format!(
                r#"query getUptimeUpdates {{
                    uptimeUpdates(first: {PAGE_SIZE}, skip: {skip}, where: {{ epoch: "{epoch}" }}) {{
                        validationID
                    }}
                }}"#
            );
            let page: UptimeUpdatesData = self.query(query, None).await?;
            let page_len = page.uptime_updates.len();

            for row in page.uptime_updates {
                match ValidationId::from_hex(&row.validation_id) {
                    Ok(id) => {
                        seen.insert(id);
                    }
                    Err(err) => {
                        warn!(raw = %row.validation_id, %err, "skipping unparseable uptime update id");
                    }
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        debug!(epoch, updates = seen.len(), "fetched uptime updates");
        Ok(seen)
    }

    async fn delegations_for_validator(
        &self,
        validation_id: ValidationId,
    ) -> Result<Vec<Delegation>> {
        let mut delegations = Vec::new();
        let mut skip = 0usize;

        loop {
            let query = format!(
                r#"query GetDelegations($validationID: Bytes!) {{
                    delegations(
                        first: {PAGE_SIZE},
                        skip: {skip},
                        where: {{ validationID: $validationID, lastRewardedEpoch: 0 }}
                    ) {{
                        id
                        validationID
                    }}
                }}"#
            );
            let variables = serde_json::json!({
                "validationID": format!("0x{}", validation_id.to_hex()),
            });
            let page: DelegationsData = self.query(query, Some(variables)).await?;
            let page_len = page.delegations.len();

            for row in page.delegations {
                match parse_delegation(&row) {
                    Ok(delegation) => delegations.push(delegation),
                    Err(err) => {
                        warn!(id = %row.id, %err, "skipping unparseable delegation");
                    }
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        Ok(delegations)
    }
}

fn parse_delegation(row: &DelegationRow) -> Result<Delegation> {
    let decoded = hex::decode(normalize_hex(&row.id).as_ref())
        .map_err(|e| UptimeError::Indexer(format!("decode delegation id: {e}")))?;
    if decoded.len() > 32 {
        return Err(UptimeError::Indexer(format!(
            "delegation id is {} bytes, exceeds 32",
            decoded.len()
        )));
    }
    let mut id = [0u8; 32];
    id[32 - decoded.len()..].copy_from_slice(&decoded);

    Ok(Delegation {
        id,
        validation_id: ValidationId::from_hex(&row.validation_id)?,
    })
}
