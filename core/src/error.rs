use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Why an access code was rejected. The caller never hears these directly —
/// the state machine speaks a single retry prompt for all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("access code not found")]
    NotFound,
    #[error("access code is inactive")]
    Inactive,
    #[error("access code expired before call time")]
    Expired,
}

/// Domain gateway failures, mapped one-to-one to distinct spoken messages.
/// Anything a gateway can throw that is not one of the first three collapses
/// into `Transient` — the internal detail is logged, never spoken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("session unauthorized at the gateway")]
    Unauthorized,
    #[error("action forbidden at the gateway")]
    Forbidden,
    #[error("rate limited at the gateway")]
    RateLimited,
    #[error("transient gateway failure: {0}")]
    Transient(String),
}

/// Session persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Lost the read-modify-write race for this call id. The turn is asked
    /// to repeat; the session itself is intact.
    #[error("concurrent write to session for call {0}")]
    Conflict(String),
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
}

/// The full error taxonomy of the call engine. Only `Store(Unavailable)`
/// ever escapes [`crate::machine::CallStateMachine::handle_turn`]; every
/// other variant is recovered in-band as a spoken response.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthFailure),
    /// A turn arrived for an unknown or already-completed call id. There is
    /// no context to resume; the transport is told to end the call cleanly.
    #[error("no live session for call {0}")]
    SessionExpired(String),
    #[error("no intent pattern matched the utterance")]
    UnresolvedIntent,
    #[error("intent execution failed: {0}")]
    ExecutionFailed(#[from] GatewayError),
    /// An ordinal or name reference found no candidate in session context.
    #[error("could not resolve the referenced entity")]
    AmbiguousReference,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Structured error response for the HTTP surface — designed for the
/// operator consoles and transport adapters that call the voice API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const RATE_LIMITED: &str = "rate_limited";
}
