//! SQLite-backed proof store. Identical contract to the Postgres backend;
//! used for local runs and as the store the test suite exercises.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{classify_upsert, decode_row, UpsertAction};
use crate::domain::{SignedUptimeMessage, UptimeProof, ValidationId};
use crate::error::{Result, UptimeError};
use crate::traits::ProofStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS uptime_proofs (
    validation_id TEXT PRIMARY KEY,
    uptime_seconds INTEGER NOT NULL,
    signed_message BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub struct SqliteProofStore {
    pool: SqlitePool,
}

impl SqliteProofStore {
    /// Connects and creates the schema when absent.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!("connected to database and verified schema");
        Ok(Self { pool })
    }

    /// In-memory store, for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }
}

fn parse_timestamp(raw: &str, validation_id: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| UptimeError::CorruptProof {
            validation_id: validation_id.to_string(),
            reason: format!("invalid timestamp {raw:?}: {e}"),
        })
}

#[async_trait]
impl ProofStore for SqliteProofStore {
    async fn get_all(&self) -> Result<HashMap<ValidationId, UptimeProof>> {
        let rows: Vec<(String, i64, Vec<u8>, String, String)> = sqlx::query_as(
            "SELECT validation_id, uptime_seconds, signed_message, created_at, updated_at \
             FROM uptime_proofs",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut proofs = HashMap::with_capacity(rows.len());
        for (validation_id, uptime_seconds, signed_message, created_at, updated_at) in rows {
            let created_at = parse_timestamp(&created_at, &validation_id)?;
            let updated_at = parse_timestamp(&updated_at, &validation_id)?;
            let proof = decode_row(
                &validation_id,
                uptime_seconds,
                signed_message,
                created_at,
                updated_at,
            )?;
            proofs.insert(proof.validation_id, proof);
        }
        Ok(proofs)
    }

    async fn store(
        &self,
        validation_id: ValidationId,
        uptime_seconds: u64,
        signed_message: &SignedUptimeMessage,
    ) -> Result<()> {
        let key = validation_id.to_cb58();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT uptime_seconds FROM uptime_proofs WHERE validation_id = ?")
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await?;

        match classify_upsert(uptime_seconds, existing.map(|(u,)| u as u64))? {
            UpsertAction::Insert => {
                sqlx::query(
                    "INSERT INTO uptime_proofs \
                     (validation_id, uptime_seconds, signed_message, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&key)
                .bind(uptime_seconds as i64)
                .bind(signed_message.as_bytes())
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
            UpsertAction::Advance => {
                sqlx::query(
                    "UPDATE uptime_proofs \
                     SET uptime_seconds = ?, signed_message = ?, updated_at = ? \
                     WHERE validation_id = ?",
                )
                .bind(uptime_seconds as i64)
                .bind(signed_message.as_bytes())
                .bind(&now)
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            }
            UpsertAction::RefreshSignature => {
                info!(validator = %validation_id, uptime = uptime_seconds, "refreshing signed message at unchanged uptime");
                sqlx::query(
                    "UPDATE uptime_proofs SET signed_message = ?, updated_at = ? \
                     WHERE validation_id = ?",
                )
                .bind(signed_message.as_bytes())
                .bind(&now)
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
