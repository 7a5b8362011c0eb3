//! Postgres-backed proof store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::{classify_upsert, decode_row, UpsertAction};
use crate::domain::{SignedUptimeMessage, UptimeProof, ValidationId};
use crate::error::Result;
use crate::traits::ProofStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS uptime_proofs (
    validation_id TEXT PRIMARY KEY,
    uptime_seconds BIGINT NOT NULL,
    signed_message BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub struct PostgresProofStore {
    pool: PgPool,
}

impl PostgresProofStore {
    /// Connects and creates the schema when absent.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!("connected to database and verified schema");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProofStore for PostgresProofStore {
    async fn get_all(&self) -> Result<HashMap<ValidationId, UptimeProof>> {
        let rows: Vec<(String, i64, Vec<u8>, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT validation_id, uptime_seconds, signed_message, created_at, updated_at \
             FROM uptime_proofs",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut proofs = HashMap::with_capacity(rows.len());
        for (validation_id, uptime_seconds, signed_message, created_at, updated_at) in rows {
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
        let now = Utc::now();

        // Row-level lock makes the read-modify-write atomic per key.
        let mut tx = self.pool.begin().await?;
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT uptime_seconds FROM uptime_proofs WHERE validation_id = $1 FOR UPDATE",
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        match classify_upsert(uptime_seconds, existing.map(|(u,)| u as u64))? {
            UpsertAction::Insert => {
                sqlx::query(
                    "INSERT INTO uptime_proofs \
                     (validation_id, uptime_seconds, signed_message, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $4)",
                )
                .bind(&key)
                .bind(uptime_seconds as i64)
                .bind(signed_message.as_bytes())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            UpsertAction::Advance => {
                sqlx::query(
                    "UPDATE uptime_proofs \
                     SET uptime_seconds = $2, signed_message = $3, updated_at = $4 \
                     WHERE validation_id = $1",
                )
                .bind(&key)
                .bind(uptime_seconds as i64)
                .bind(signed_message.as_bytes())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            UpsertAction::RefreshSignature => {
                info!(validator = %validation_id, uptime = uptime_seconds, "refreshing signed message at unchanged uptime");
                sqlx::query(
                    "UPDATE uptime_proofs SET signed_message = $2, updated_at = $3 \
                     WHERE validation_id = $1",
                )
                .bind(&key)
                .bind(signed_message.as_bytes())
                .bind(now)
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
