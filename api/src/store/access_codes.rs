use alumline_core::auth::{AccessCode, AccessCodeStore};
use alumline_core::error::StoreError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Read-only view of the access-code table and the profile directory. The
/// engine never mutates codes; minting happens in the admin route.
#[derive(Clone)]
pub struct PgAccessCodeStore {
    db: PgPool,
}

impl PgAccessCodeStore {
    pub fn new(db: PgPool) -> Self {
        PgAccessCodeStore { db }
    }
}

impl AccessCodeStore for PgAccessCodeStore {
    async fn lookup(&self, code: &str) -> Result<Option<AccessCode>, StoreError> {
        let row = sqlx::query_as::<_, AccessCodeRow>(
            "SELECT code, user_id, is_active, expires_at FROM access_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(row.map(|r| AccessCode {
            code: r.code,
            user_id: r.user_id,
            is_active: r.is_active,
            expires_at: r.expires_at,
        }))
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        let name: Option<(String,)> =
            sqlx::query_as("SELECT full_name FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(name.map(|(n,)| n))
    }
}

#[derive(sqlx::FromRow)]
struct AccessCodeRow {
    code: String,
    user_id: Uuid,
    is_active: bool,
    expires_at: DateTime<Utc>,
}
