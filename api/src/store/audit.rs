use alumline_core::audit::{ActionAuditEntry, AuditSink};
use alumline_core::error::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

/// Append-only writer for `call_actions`. The executor treats appends as
/// fire-and-forget; a failure here is logged upstream, never surfaced.
#[derive(Clone)]
pub struct PgAuditSink {
    db: PgPool,
}

impl PgAuditSink {
    pub fn new(db: PgPool) -> Self {
        PgAuditSink { db }
    }
}

impl AuditSink for PgAuditSink {
    async fn append(&self, entry: ActionAuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO call_actions
                (id, call_session_id, action, endpoint, request_summary,
                 response_status, response_summary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&entry.call_session_id)
        .bind(&entry.action)
        .bind(&entry.endpoint)
        .bind(&entry.request_summary)
        .bind(entry.response_status)
        .bind(&entry.response_summary)
        .bind(entry.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
