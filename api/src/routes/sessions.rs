use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};

use alumline_core::audit::ActionAuditEntry;
use alumline_core::session::{CallSession, SessionStore};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::PgSessionStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/voice/sessions/{call_id}", get(get_session))
        .route("/v1/voice/sessions/{call_id}/actions", get(list_actions))
}

/// Inspect a call session
///
/// Returns the stored session, including conversation memory and any
/// pending sub-flow. Intended for operators debugging a call, not for
/// the transport.
#[utoipa::path(
    get,
    path = "/v1/voice/sessions/{call_id}",
    params(("call_id" = String, Path, description = "Carrier call SID or browser-session id")),
    responses(
        (status = 200, description = "The stored session", body = CallSession),
        (status = 404, description = "No session with this call_id")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let sessions = PgSessionStore::new(state.db.clone());
    let session = sessions
        .load(&call_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound {
            message: format!("no call session with id '{call_id}'"),
        })?;

    Ok(Json(session))
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    call_session_id: String,
    action: String,
    endpoint: String,
    request_summary: String,
    response_status: i32,
    response_summary: String,
    created_at: DateTime<Utc>,
}

/// List the actions a call performed
///
/// The audit trail for one session, oldest first. Summaries are
/// clamped at write time; this endpoint returns them as stored.
#[utoipa::path(
    get,
    path = "/v1/voice/sessions/{call_id}/actions",
    params(("call_id" = String, Path, description = "Carrier call SID or browser-session id")),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = [ActionAuditEntry])
    ),
    tag = "sessions"
)]
pub async fn list_actions(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, ActionRow>(
        r#"
        SELECT call_session_id, action, endpoint, request_summary,
               response_status, response_summary, created_at
        FROM call_actions
        WHERE call_session_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(&call_id)
    .fetch_all(&state.db)
    .await?;

    let entries: Vec<ActionAuditEntry> = rows
        .into_iter()
        .map(|r| ActionAuditEntry {
            call_session_id: r.call_session_id,
            action: r.action,
            endpoint: r.endpoint,
            request_summary: r.request_summary,
            response_status: r.response_status,
            response_summary: r.response_summary,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(entries))
}
