use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/access-codes", post(mint_access_code))
}

// ──────────────────────────────────────────────
// Code generation
// ──────────────────────────────────────────────

/// Six spoken digits, zero-padded. Collisions are handled by the unique
/// constraint on access_codes.code; the caller retries.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

// ──────────────────────────────────────────────
// POST /v1/access-codes (admin token required)
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MintAccessCodeRequest {
    pub user_id: Uuid,
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
}

fn default_ttl_minutes() -> i64 {
    60
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MintAccessCodeResponse {
    pub code: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::Unauthorized {
            message: "Access code minting is disabled (no admin token configured).".to_string(),
        });
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized {
            message: "A valid admin bearer token is required.".to_string(),
        }),
    }
}

/// Mint a phone access code for a member
///
/// The code is what the member reads out (or keys in) when the voice
/// line asks them to authenticate. Codes are short-lived; mint a fresh
/// one per reminder call or support interaction.
#[utoipa::path(
    post,
    path = "/v1/access-codes",
    request_body = MintAccessCodeRequest,
    responses(
        (status = 201, description = "Code minted", body = MintAccessCodeResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "No such member")
    ),
    security(("bearer_auth" = [])),
    tag = "access-codes"
)]
pub async fn mint_access_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MintAccessCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;

    let ttl = req.ttl_minutes;
    if !(1..=7 * 24 * 60).contains(&ttl) {
        return Err(AppError::Validation {
            message: "ttl_minutes must be between 1 and 10080 (one week)".to_string(),
            field: Some("ttl_minutes".to_string()),
            received: Some(serde_json::json!(ttl)),
            docs_hint: None,
        });
    }

    let member_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1)")
        .bind(req.user_id)
        .fetch_one(&state.db)
        .await?;
    if !member_exists {
        return Err(AppError::NotFound {
            message: format!("no member with id {}", req.user_id),
        });
    }

    let expires_at = Utc::now() + Duration::minutes(ttl);

    // Retry a handful of times on code collision; six digits collide
    // rarely but the unique index makes it loud when they do.
    for _ in 0..5 {
        let code = generate_code();
        let result = sqlx::query(
            "INSERT INTO access_codes (code, user_id, is_active, expires_at) \
             VALUES ($1, $2, TRUE, $3) ON CONFLICT (code) DO NOTHING",
        )
        .bind(&code)
        .bind(req.user_id)
        .bind(expires_at)
        .execute(&state.db)
        .await?;

        if result.rows_affected() == 1 {
            tracing::info!(user_id = %req.user_id, %expires_at, "access code minted");
            return Ok((
                StatusCode::CREATED,
                Json(MintAccessCodeResponse {
                    code,
                    user_id: req.user_id,
                    expires_at,
                }),
            ));
        }
    }

    Err(AppError::Internal(
        "could not mint a unique access code after several attempts".to_string(),
    ))
}
