use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ports::{AuditError, AuditLogger};

/// Writes every callback to `callback_logs` for later investigation.
#[derive(Clone)]
pub struct PostgresAuditLogger {
    pool: PgPool,
}

impl PostgresAuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogger for PostgresAuditLogger {
    async fn log_callback(
        &self,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO callback_logs (id, conversation_id, payload, created_at) VALUES ($1, $2, $3, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(payload.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;

        Ok(())
    }
}
