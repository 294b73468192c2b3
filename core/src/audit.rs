//! Append-only record of executed actions, one entry per side-effecting
//! gateway call. Display and debugging only — the state machine never reads
//! it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionAuditEntry {
    pub call_session_id: String,
    /// Intent or action name, e.g. "find_mentors".
    pub action: String,
    /// Tool name or direct endpoint the action hit.
    pub endpoint: String,
    /// Truncated rendering of the request parameters.
    pub request_summary: String,
    /// HTTP-equivalent status of the outcome (200, 401, 403, 429, 502).
    pub response_status: i32,
    /// Truncated rendering of the response or error.
    pub response_summary: String,
    pub created_at: DateTime<Utc>,
}

const SUMMARY_MAX_CHARS: usize = 240;

/// Clamp a payload rendering for audit display without splitting a
/// character boundary.
pub fn summarize(payload: &str) -> String {
    if payload.chars().count() <= SUMMARY_MAX_CHARS {
        return payload.to_string();
    }
    let clamped: String = payload.chars().take(SUMMARY_MAX_CHARS).collect();
    format!("{clamped}…")
}

/// Fire-and-forget sink. A failed append must never fail the user-facing
/// turn; implementations log and swallow, callers do not await-and-check.
pub trait AuditSink {
    async fn append(&self, entry: ActionAuditEntry) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payloads_pass_through() {
        assert_eq!(summarize("{\"ok\":true}"), "{\"ok\":true}");
    }

    #[test]
    fn long_payloads_are_clamped() {
        let long = "x".repeat(500);
        let summary = summarize(&long);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + 1);
        assert!(summary.ends_with('…'));
    }
}
