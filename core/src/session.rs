use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::classifier::Intent;
use crate::error::StoreError;

/// Lifecycle of one call. `auth_failed` is non-terminal — the caller gets
/// exactly one retry. `completed` is terminal: further turns for the same
/// call id are treated as an expired session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Greeting,
    Authenticating,
    Authenticated,
    AuthFailed,
    InIntent,
    Completed,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Inbound,
    Outbound,
    Reminder,
}

/// A mentor offered to the caller. Ordinal references ("the second mentor")
/// resolve against the position in `ConversationMemory::last_mentors`, so
/// the order of that list is load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MentorRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventRef {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OpportunityRef {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Cross-turn conversational state. Each `last_*` list is overwritten
/// wholesale by the next lookup of the same kind, which is what keeps
/// ordinal references session-scoped. `skills_added` is cumulative and never
/// truncated for the life of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_mentors: Vec<MentorRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_opportunities: Vec<OpportunityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_events: Vec<EventRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills_added: Vec<String>,
}

/// Who a pending schedule sub-flow is for. `mentor_id` is absent when the
/// classifier fell back to the raw captured text (no ordinal or known name
/// matched); the gateway is then left to resolve the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentor_id: Option<Uuid>,
    pub mentor_name: String,
}

/// The active multi-turn sub-flow, typed per kind so an invalid combination
/// of pending state cannot be represented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubFlow {
    #[default]
    None,
    /// A mentor has been selected; the next utterance is captured verbatim
    /// as the preferred session time.
    AwaitingScheduleTime { target: ScheduleTarget },
}

/// Everything the engine carries across turns besides the lifecycle fields.
/// Discarded in meaning (though not in storage) once the session completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionContext {
    #[serde(default)]
    pub memory: ConversationMemory,
    #[serde(default)]
    pub flow: SubFlow,
}

/// The aggregate root of one phone call or browser voice session.
///
/// Invariant: `user_id` is `Some` for every status after `authenticated`.
/// The machine only sets `Authenticated`/`InIntent` together with a resolved
/// user id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallSession {
    /// Carrier call SID, or a generated id for browser sessions. Opaque.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub status: CallStatus,
    pub call_type: CallType,
    /// Last classified intent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub context: SessionContext,
    /// Consecutive failed authentication attempts. Two ends the call.
    #[serde(default)]
    pub auth_attempts: u8,
    /// Optimistic-concurrency token; bumped by the store on every save.
    #[serde(default)]
    pub turn_seq: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl CallSession {
    pub fn new(id: impl Into<String>, call_type: CallType, now: DateTime<Utc>) -> Self {
        CallSession {
            id: id.into(),
            user_id: None,
            status: CallStatus::Initiated,
            call_type,
            intent: None,
            context: SessionContext::default(),
            auth_attempts: 0,
            turn_seq: 0,
            started_at: now,
            ended_at: None,
            duration_seconds: None,
            recording_url: None,
            summary: None,
        }
    }

    /// Terminal transition. Fixes `ended_at`/`duration_seconds` and records
    /// a one-line summary of how the call ended.
    pub fn complete(&mut self, now: DateTime<Utc>, summary: impl Into<String>) {
        self.status = CallStatus::Completed;
        self.ended_at = Some(now);
        self.duration_seconds = Some((now - self.started_at).num_seconds().max(0));
        self.summary = Some(summary.into());
    }
}

/// Persistence contract for call sessions.
///
/// `save` must compare-and-swap on `turn_seq`: the write succeeds only if
/// the stored record still carries the `turn_seq` the session was loaded
/// with (or does not exist yet, for `turn_seq == 0`), and the stored value
/// is bumped by one. Losing the race is a [`StoreError::Conflict`] — this is
/// how turns of the same call are serialized without any in-process lock.
pub trait SessionStore {
    async fn load(&self, call_id: &str) -> Result<Option<CallSession>, StoreError>;
    async fn save(&self, session: &CallSession) -> Result<(), StoreError>;
}
