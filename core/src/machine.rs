//! Turn sequencing for one call.
//!
//! greeting → authentication → intent loop → (optional sub-flows) →
//! termination. The machine is re-entered fresh on every turn; everything it
//! knows between turns lives in the persisted [`CallSession`].

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{self, AccessCodeStore};
use crate::classifier;
use crate::error::{CallError, StoreError};
use crate::executor::{DomainGateway, IntentExecutor};
use crate::audit::AuditSink;
use crate::session::{CallSession, CallStatus, CallType, SessionStore, SubFlow};

pub const GREETING_PROMPT: &str = "Welcome to the Alumline alumni line. \
     Please say or enter your six digit access code.";
const AUTH_RETRY_PROMPT: &str = "That code didn't work. It may be wrong, inactive, or expired. \
     Please try your access code one more time.";
const AUTH_FAILED_GOODBYE: &str = "Sorry, I still couldn't verify that code. Please check your \
     access code in the Alumline app and call again. Goodbye.";
pub const CAPABILITY_FALLBACK: &str = "I can help you update your skills, find mentors, check \
     opportunities and events, schedule a mentorship session, send a message, RSVP to an event, \
     hear your profile, or publish a post. What would you like to do?";
const GOODBYE_PROMPT: &str = "Thanks for calling Alumline. Goodbye!";
const SESSION_EXPIRED_PROMPT: &str = "This call session has ended. Please call again. Goodbye.";
const REPEAT_PROMPT: &str = "Sorry, I missed that. Could you say it again?";

static FAREWELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:good\s*bye|bye|hang\s+up|that(?:'|’)?s\s+all|see\s+you|i(?:'|’)?m\s+done|end\s+the\s+call)\b",
    )
    .expect("valid farewell regex")
});

/// One inbound exchange from whichever transport drives the call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnRequest {
    /// Carrier call SID or generated browser-session id.
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digits: Option<String>,
    #[serde(default)]
    pub is_first_turn: bool,
    /// Only honored on the first turn; later turns keep the stored type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<CallType>,
}

/// What the transport should say next and whether to keep listening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TurnResponse {
    pub prompt_text: String,
    pub expect_continued_input: bool,
    pub end_call: bool,
}

impl TurnResponse {
    fn listen(prompt_text: impl Into<String>) -> Self {
        TurnResponse {
            prompt_text: prompt_text.into(),
            expect_continued_input: true,
            end_call: false,
        }
    }

    fn hang_up(prompt_text: impl Into<String>) -> Self {
        TurnResponse {
            prompt_text: prompt_text.into(),
            expect_continued_input: false,
            end_call: true,
        }
    }
}

pub struct CallStateMachine<S, C, G, L> {
    sessions: S,
    codes: C,
    executor: IntentExecutor<G, L>,
}

impl<S, C, G, L> CallStateMachine<S, C, G, L>
where
    S: SessionStore,
    C: AccessCodeStore,
    G: DomainGateway,
    L: AuditSink,
{
    pub fn new(sessions: S, codes: C, gateway: G, audit: L) -> Self {
        CallStateMachine {
            sessions,
            codes,
            executor: IntentExecutor::new(gateway, audit),
        }
    }

    /// Process one turn. Every recoverable condition — bad code, unknown
    /// intent, gateway failure, expired session — comes back in-band as a
    /// [`TurnResponse`]; only storage unavailability is an `Err`.
    pub async fn handle_turn(&self, req: &TurnRequest) -> Result<TurnResponse, CallError> {
        let now = Utc::now();

        let mut session = match self.sessions.load(&req.call_id).await? {
            Some(session) if session.status.is_terminal() => {
                tracing::info!(call_id = %req.call_id, "turn for completed session");
                return Ok(TurnResponse::hang_up(SESSION_EXPIRED_PROMPT));
            }
            Some(session) => session,
            None if req.is_first_turn => {
                let mut session = CallSession::new(
                    &req.call_id,
                    req.call_type.unwrap_or(CallType::Inbound),
                    now,
                );
                session.status = CallStatus::Greeting;
                return self.persist(session, TurnResponse::listen(GREETING_PROMPT)).await;
            }
            None => {
                tracing::warn!(call_id = %req.call_id, "turn for unknown session");
                return Ok(TurnResponse::hang_up(SESSION_EXPIRED_PROMPT));
            }
        };

        let spoken = req
            .utterance_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let digits = req.digits.as_deref().map(str::trim).filter(|s| !s.is_empty());

        // No input inside the turn's listen window: the caller is gone.
        let Some(input) = digits.or(spoken) else {
            session.complete(now, "ended after silence");
            return self.persist(session, TurnResponse::hang_up(GOODBYE_PROMPT)).await;
        };

        let response = match session.status {
            CallStatus::Initiated
            | CallStatus::Greeting
            | CallStatus::Authenticating
            | CallStatus::AuthFailed => {
                self.authentication_turn(&mut session, digits.unwrap_or(input), now)
                    .await
            }
            CallStatus::Authenticated | CallStatus::InIntent => {
                let utterance = spoken.unwrap_or(input);
                self.intent_turn(&mut session, utterance, now).await
            }
            // Terminal sessions were rejected on load; if one slips through,
            // end cleanly rather than process the turn.
            CallStatus::Completed => return Ok(TurnResponse::hang_up(SESSION_EXPIRED_PROMPT)),
        };

        self.persist(session, response).await
    }

    /// Out-of-band call-ended signal from the transport. Idempotent.
    pub async fn handle_call_ended(&self, call_id: &str) -> Result<(), CallError> {
        let Some(mut session) = self.sessions.load(call_id).await? else {
            return Ok(());
        };
        if session.status.is_terminal() {
            return Ok(());
        }
        session.complete(Utc::now(), "carrier reported hangup");
        match self.sessions.save(&session).await {
            Ok(()) | Err(StoreError::Conflict(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn authentication_turn(
        &self,
        session: &mut CallSession,
        input: &str,
        now: chrono::DateTime<Utc>,
    ) -> TurnResponse {
        // DTMF arrives clean; spoken codes come through as words and
        // punctuation around the digits.
        let candidate: String = input.chars().filter(char::is_ascii_digit).collect();

        match auth::authenticate(&self.codes, &candidate, now).await {
            Ok(caller) => {
                session.user_id = Some(caller.user_id);
                session.status = CallStatus::Authenticated;
                session.auth_attempts = 0;
                session.context.memory.user_id = Some(caller.user_id);
                session.context.memory.user_name = Some(caller.display_name.clone());
                TurnResponse::listen(format!(
                    "Hi {}! {}",
                    caller.display_name, CAPABILITY_FALLBACK
                ))
            }
            Err(failure) => {
                session.auth_attempts = session.auth_attempts.saturating_add(1);
                tracing::info!(
                    call_id = %session.id,
                    attempts = session.auth_attempts,
                    failure = %failure,
                    "authentication attempt failed"
                );
                if session.auth_attempts >= 2 {
                    session.complete(now, "authentication failed");
                    TurnResponse::hang_up(AUTH_FAILED_GOODBYE)
                } else {
                    session.status = CallStatus::AuthFailed;
                    TurnResponse::listen(AUTH_RETRY_PROMPT)
                }
            }
        }
    }

    async fn intent_turn(
        &self,
        session: &mut CallSession,
        utterance: &str,
        now: chrono::DateTime<Utc>,
    ) -> TurnResponse {
        if FAREWELL_RE.is_match(utterance) {
            let summary = match session.intent {
                Some(intent) => format!("completed; last intent {}", intent.tool_name()),
                None => "completed; no intent handled".to_string(),
            };
            session.complete(now, summary);
            return TurnResponse::hang_up(GOODBYE_PROMPT);
        }

        // A pending sub-flow consumes the turn before classification.
        if let SubFlow::AwaitingScheduleTime { target } = session.context.flow.clone() {
            session.context.flow = SubFlow::None;
            let outcome = self
                .executor
                .schedule_session(&session.id, &mut session.context.memory, &target, utterance)
                .await;
            session.status = CallStatus::InIntent;
            return TurnResponse::listen(outcome.response);
        }

        session.status = CallStatus::InIntent;
        match classifier::classify(utterance, &session.context.memory) {
            None => TurnResponse::listen(CAPABILITY_FALLBACK),
            Some(classified) => {
                session.intent = Some(classified.intent);
                let outcome = self
                    .executor
                    .execute(&session.id, &classified, &mut session.context.memory)
                    .await;
                session.context.flow = outcome.next_flow;
                TurnResponse::listen(outcome.response)
            }
        }
    }

    /// Save and hand the response back. Losing the per-call write race is a
    /// recoverable turn: the caller is asked to repeat rather than the call
    /// being torn down.
    async fn persist(
        &self,
        session: CallSession,
        response: TurnResponse,
    ) -> Result<TurnResponse, CallError> {
        match self.sessions.save(&session).await {
            Ok(()) => Ok(response),
            Err(StoreError::Conflict(call_id)) => {
                tracing::warn!(%call_id, "lost session write race; asking caller to repeat");
                Ok(TurnResponse::listen(REPEAT_PROMPT))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farewell_vocabulary_matches() {
        for utterance in ["thank you, bye", "goodbye", "that's all", "please hang up"] {
            assert!(FAREWELL_RE.is_match(utterance), "missed: {utterance}");
        }
        for utterance in ["maybe later", "find mentors", "goodwill events"] {
            assert!(!FAREWELL_RE.is_match(utterance), "false match: {utterance}");
        }
    }
}
