use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use alumline_core::machine::{TurnRequest, TurnResponse};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/voice/turn", post(voice_turn))
        .route("/v1/voice/ended", post(voice_ended))
}

fn validate_turn(req: &TurnRequest) -> Result<(), AppError> {
    if req.call_id.trim().is_empty() {
        return Err(AppError::Validation {
            message: "call_id must not be empty".to_string(),
            field: Some("call_id".to_string()),
            received: Some(Value::String(req.call_id.clone())),
            docs_hint: Some(
                "Use the carrier call SID, or generate a stable id per browser session."
                    .to_string(),
            ),
        });
    }
    Ok(())
}

/// Process one conversation turn
///
/// The transport (carrier webhook, browser client) posts the caller's
/// latest speech or keypad digits; the engine replies with what to say
/// next and whether to keep listening. Each turn is self-contained —
/// the engine reloads the session from storage, so retries and
/// concurrent webhook deliveries are safe.
#[utoipa::path(
    post,
    path = "/v1/voice/turn",
    request_body = TurnRequest,
    responses(
        (status = 200, description = "Next prompt for the caller", body = TurnResponse),
        (status = 400, description = "Malformed turn"),
        (status = 500, description = "Session storage unavailable")
    ),
    tag = "voice"
)]
pub async fn voice_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_turn(&req)?;

    let response = state.machine.handle_turn(&req).await?;
    tracing::debug!(
        call_id = %req.call_id,
        end_call = response.end_call,
        "turn handled"
    );
    Ok(Json(response))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallEndedRequest {
    pub call_id: String,
}

/// Record that the carrier ended the call
///
/// Finalizes the session if it is still open. Safe to deliver more
/// than once; a session that already completed is left untouched.
#[utoipa::path(
    post,
    path = "/v1/voice/ended",
    request_body = CallEndedRequest,
    responses(
        (status = 204, description = "Session finalized (or already was)"),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Session storage unavailable")
    ),
    tag = "voice"
)]
pub async fn voice_ended(
    State(state): State<AppState>,
    Json(req): Json<CallEndedRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.call_id.trim().is_empty() {
        return Err(AppError::Validation {
            message: "call_id must not be empty".to_string(),
            field: Some("call_id".to_string()),
            received: Some(Value::String(req.call_id.clone())),
            docs_hint: None,
        });
    }

    state.machine.handle_call_ended(&req.call_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
