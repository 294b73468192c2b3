use alumline_core::classifier::Intent;
use alumline_core::error::StoreError;
use alumline_core::session::{CallSession, CallStatus, CallType, SessionContext, SessionStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Session persistence with compare-and-swap on `turn_seq`. Concurrent
/// turns of the same call serialize on that column: the losing writer gets
/// a `Conflict` and the caller is asked to repeat the turn.
#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        PgSessionStore { db }
    }
}

impl SessionStore for PgSessionStore {
    async fn load(&self, call_id: &str) -> Result<Option<CallSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT call_id, user_id, status, call_type, intent, context, auth_attempts,
                   turn_seq, started_at, ended_at, duration_seconds, recording_url, summary
            FROM call_sessions
            WHERE call_id = $1
            "#,
        )
        .bind(call_id)
        .fetch_optional(&self.db)
        .await
        .map_err(unavailable)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn save(&self, session: &CallSession) -> Result<(), StoreError> {
        let context = serde_json::to_value(&session.context)
            .map_err(|e| StoreError::Unavailable(format!("unserializable context: {e}")))?;

        let result = if session.turn_seq == 0 {
            sqlx::query(
                r#"
                INSERT INTO call_sessions
                    (call_id, user_id, status, call_type, intent, context, auth_attempts,
                     turn_seq, started_at, ended_at, duration_seconds, recording_url, summary)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $9, $10, $11, $12)
                ON CONFLICT (call_id) DO NOTHING
                "#,
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(status_str(session.status))
            .bind(call_type_str(session.call_type))
            .bind(session.intent.map(Intent::tool_name))
            .bind(&context)
            .bind(session.auth_attempts as i32)
            .bind(session.started_at)
            .bind(session.ended_at)
            .bind(session.duration_seconds)
            .bind(&session.recording_url)
            .bind(&session.summary)
            .execute(&self.db)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE call_sessions
                SET user_id = $2, status = $3, intent = $4, context = $5, auth_attempts = $6,
                    turn_seq = turn_seq + 1, ended_at = $7, duration_seconds = $8,
                    recording_url = $9, summary = $10
                WHERE call_id = $1 AND turn_seq = $11
                "#,
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(status_str(session.status))
            .bind(session.intent.map(Intent::tool_name))
            .bind(&context)
            .bind(session.auth_attempts as i32)
            .bind(session.ended_at)
            .bind(session.duration_seconds)
            .bind(&session.recording_url)
            .bind(&session.summary)
            .bind(session.turn_seq)
            .execute(&self.db)
            .await
        };

        let result = result.map_err(unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(session.id.clone()));
        }
        Ok(())
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn status_str(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Initiated => "initiated",
        CallStatus::Greeting => "greeting",
        CallStatus::Authenticating => "authenticating",
        CallStatus::Authenticated => "authenticated",
        CallStatus::AuthFailed => "auth_failed",
        CallStatus::InIntent => "in_intent",
        CallStatus::Completed => "completed",
    }
}

fn parse_status(raw: &str) -> Option<CallStatus> {
    Some(match raw {
        "initiated" => CallStatus::Initiated,
        "greeting" => CallStatus::Greeting,
        "authenticating" => CallStatus::Authenticating,
        "authenticated" => CallStatus::Authenticated,
        "auth_failed" => CallStatus::AuthFailed,
        "in_intent" => CallStatus::InIntent,
        "completed" => CallStatus::Completed,
        _ => return None,
    })
}

fn call_type_str(call_type: CallType) -> &'static str {
    match call_type {
        CallType::Inbound => "inbound",
        CallType::Outbound => "outbound",
        CallType::Reminder => "reminder",
    }
}

fn parse_call_type(raw: &str) -> Option<CallType> {
    Some(match raw {
        "inbound" => CallType::Inbound,
        "outbound" => CallType::Outbound,
        "reminder" => CallType::Reminder,
        _ => return None,
    })
}

fn parse_intent(raw: &str) -> Option<Intent> {
    Some(match raw {
        "update_skills" => Intent::UpdateSkills,
        "find_mentors" => Intent::FindMentors,
        "check_opportunities" => Intent::CheckOpportunities,
        "check_events" => Intent::CheckEvents,
        "schedule_mentorship" => Intent::ScheduleMentorship,
        "send_message" => Intent::SendMessage,
        "rsvp_event" => Intent::RsvpEvent,
        "get_profile" => Intent::GetProfile,
        "create_post" => Intent::CreatePost,
        _ => return None,
    })
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    call_id: String,
    user_id: Option<Uuid>,
    status: String,
    call_type: String,
    intent: Option<String>,
    context: serde_json::Value,
    auth_attempts: i32,
    turn_seq: i64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    recording_url: Option<String>,
    summary: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<CallSession, StoreError> {
        let status = parse_status(&self.status)
            .ok_or_else(|| StoreError::Unavailable(format!("corrupt status '{}'", self.status)))?;
        let call_type = parse_call_type(&self.call_type).ok_or_else(|| {
            StoreError::Unavailable(format!("corrupt call_type '{}'", self.call_type))
        })?;
        // Context predating a schema change deserializes to the default
        // rather than poisoning the call.
        let context: SessionContext = serde_json::from_value(self.context).unwrap_or_default();

        Ok(CallSession {
            id: self.call_id,
            user_id: self.user_id,
            status,
            call_type,
            intent: self.intent.as_deref().and_then(parse_intent),
            context,
            auth_attempts: self.auth_attempts.clamp(0, u8::MAX as i32) as u8,
            turn_seq: self.turn_seq,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds,
            recording_url: self.recording_url,
            summary: self.summary,
        })
    }
}
