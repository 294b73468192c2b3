//! Intent execution against the domain gateways.
//!
//! Every transport (phone webhook, browser agent, third-party agent
//! platform) shares one action surface: a named-tool gateway with a single
//! `invoke(tool_name, parameters)` entry point. The one deliberate
//! exception is `create_post`, which writes directly to the content store
//! because it is not part of the shared tool surface used by telephony
//! agents.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::audit::{ActionAuditEntry, AuditSink, summarize};
use crate::classifier::{ClassifiedIntent, Intent, IntentParams};
use crate::error::GatewayError;
use crate::session::{
    ConversationMemory, EventRef, MentorRef, OpportunityRef, ScheduleTarget, SubFlow,
};

/// Single seam to the domain stores (profiles, mentors, opportunities,
/// events, messages, RSVPs). Opaque to the engine.
pub trait DomainGateway {
    async fn invoke(&self, tool_name: &str, parameters: Value) -> Result<Value, GatewayError>;
    /// Direct write to the content store, bypassing the shared tool surface.
    async fn create_post(&self, user_id: Uuid, content: &str) -> Result<Value, GatewayError>;
}

/// What one executed intent produced: the spoken response, whether the
/// action succeeded, and the sub-flow (if any) the turn opens.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub response: String,
    pub success: bool,
    pub next_flow: SubFlow,
}

impl ExecutionOutcome {
    fn reply(response: impl Into<String>, success: bool) -> Self {
        ExecutionOutcome {
            response: response.into(),
            success,
            next_flow: SubFlow::None,
        }
    }
}

/// Spoken message per gateway error class. These are the only words a
/// caller ever hears about a backend failure.
pub fn gateway_failure_message(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::Unauthorized => {
            "Your session is no longer authorized. Please call back and enter your access code again."
        }
        GatewayError::Forbidden => "Sorry, you don't have permission to do that.",
        GatewayError::RateLimited => {
            "You're doing that a little too quickly. Please wait a moment and try again."
        }
        GatewayError::Transient(_) => {
            "Sorry, something went wrong on our side. Please try that again."
        }
    }
}

const NO_MENTORS_FOUND: &str =
    "I couldn't find any mentors for that right now. You could try a different skill area.";
const NO_EVENT_CONTEXT: &str =
    "I'm not sure which event you mean. Ask me to list upcoming events first.";
const NO_MENTOR_CONTEXT: &str =
    "I don't have a mentor list for this call yet. Ask me to find mentors first.";
const WHICH_MENTOR: &str =
    "Which mentor did you mean? You can say the first, the second, or a name from the list.";

/// How many listings are spoken even when the gateway returned more.
const SPOKEN_RESULT_LIMIT: usize = 3;

pub struct IntentExecutor<G, L> {
    gateway: G,
    audit: L,
}

impl<G: DomainGateway, L: AuditSink> IntentExecutor<G, L> {
    pub fn new(gateway: G, audit: L) -> Self {
        IntentExecutor { gateway, audit }
    }

    /// Execute one classified intent. Gateway failures never propagate: the
    /// outcome carries the mapped apologetic response and the call goes on.
    pub async fn execute(
        &self,
        call_id: &str,
        classified: &ClassifiedIntent,
        memory: &mut ConversationMemory,
    ) -> ExecutionOutcome {
        if classified.intent.requires_user_id() || classified.intent == Intent::CreatePost {
            if let Err(err) = self.ensure_user_id(call_id, memory).await {
                return ExecutionOutcome::reply(gateway_failure_message(&err), false);
            }
        }

        match (&classified.intent, &classified.params) {
            (Intent::UpdateSkills, IntentParams::UpdateSkills { new_skills }) => {
                self.update_skills(call_id, memory, new_skills).await
            }
            (Intent::FindMentors, IntentParams::FindMentors { skill_area }) => {
                self.find_mentors(call_id, memory, skill_area.as_deref()).await
            }
            (Intent::CheckOpportunities, _) => self.check_opportunities(call_id, memory).await,
            (Intent::CheckEvents, _) => self.check_events(call_id, memory).await,
            (
                Intent::ScheduleMentorship,
                IntentParams::ScheduleMentorship {
                    mentor_id,
                    mentor_name,
                },
            ) => open_schedule_flow(memory, *mentor_id, mentor_name),
            (
                Intent::SendMessage,
                IntentParams::SendMessage {
                    recipient_name,
                    message,
                },
            ) => self.send_message(call_id, memory, recipient_name, message).await,
            (
                Intent::RsvpEvent,
                IntentParams::RsvpEvent {
                    event_id,
                    event_title,
                },
            ) => self.rsvp_event(call_id, memory, *event_id, event_title.as_deref()).await,
            (Intent::GetProfile, _) => self.get_profile(call_id, memory).await,
            (Intent::CreatePost, IntentParams::CreatePost { content }) => {
                self.create_post(call_id, memory, content).await
            }
            // Intent/params mismatch cannot come out of the classifier; if a
            // transport hands one in, degrade the same way as a backend slip.
            _ => ExecutionOutcome::reply(
                gateway_failure_message(&GatewayError::Transient("param mismatch".into())),
                false,
            ),
        }
    }

    /// Complete a pending schedule sub-flow with the caller's spoken time.
    pub async fn schedule_session(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        target: &ScheduleTarget,
        preferred_time: &str,
    ) -> ExecutionOutcome {
        if let Err(err) = self.ensure_user_id(call_id, memory).await {
            return ExecutionOutcome::reply(gateway_failure_message(&err), false);
        }
        let params = json!({
            "user_id": memory.user_id,
            "mentor_id": target.mentor_id,
            "mentor_name": target.mentor_name,
            "preferred_time": preferred_time,
        });
        match self.dispatch(call_id, "schedule_mentorship", "schedule_mentorship", params).await {
            Ok(_) => ExecutionOutcome::reply(
                format!(
                    "Done — I've requested a mentorship session with {} for {}. \
                     You'll get a confirmation message once they accept.",
                    target.mentor_name, preferred_time
                ),
                true,
            ),
            Err(err) => ExecutionOutcome::reply(gateway_failure_message(&err), false),
        }
    }

    /// Resolve the acting user id once and cache it in memory. Phone calls
    /// arrive with the id already set from authentication; browser sessions
    /// fetch it lazily through the profile tool.
    async fn ensure_user_id(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
    ) -> Result<Uuid, GatewayError> {
        if let Some(user_id) = memory.user_id {
            return Ok(user_id);
        }
        let value = self
            .dispatch(call_id, "resolve_user", "get_profile", json!({}))
            .await?;
        let profile: ProfileHit = serde_json::from_value(value)
            .map_err(|e| GatewayError::Transient(format!("unparseable profile: {e}")))?;
        memory.user_id = Some(profile.id);
        if memory.user_name.is_none() {
            memory.user_name = profile.name;
        }
        Ok(profile.id)
    }

    async fn update_skills(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        new_skills: &[String],
    ) -> ExecutionOutcome {
        if new_skills.is_empty() {
            return ExecutionOutcome::reply(
                "I didn't catch which skills to add. Try something like: I learned Python and SQL.",
                false,
            );
        }
        let params = json!({ "user_id": memory.user_id, "new_skills": new_skills });
        match self.dispatch(call_id, "update_skills", "update_skills", params).await {
            Ok(_) => {
                memory.skills_added.extend(new_skills.iter().cloned());
                ExecutionOutcome::reply(
                    format!("I've added {} to your profile.", join_spoken(new_skills)),
                    true,
                )
            }
            Err(err) => ExecutionOutcome::reply(gateway_failure_message(&err), false),
        }
    }

    async fn find_mentors(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        skill_area: Option<&str>,
    ) -> ExecutionOutcome {
        let params = json!({ "skill_area": skill_area });
        let value = match self.dispatch(call_id, "find_mentors", "find_mentors", params).await {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::reply(gateway_failure_message(&err), false),
        };
        let hits: Vec<MentorHit> = parse_hits(&value, "mentors");
        memory.last_mentors = hits
            .iter()
            .map(|m| MentorRef {
                id: m.id,
                name: m.name.clone(),
                skills: m.skills.clone(),
            })
            .collect();
        memory.last_topic = skill_area.map(str::to_string);

        if hits.is_empty() {
            return ExecutionOutcome::reply(NO_MENTORS_FOUND, true);
        }
        let listing = hits
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}: {}", i + 1, m.spoken_line()))
            .collect::<Vec<_>>()
            .join(". ");
        ExecutionOutcome::reply(
            format!(
                "I found {} mentor{}. {}. Would you like to schedule a session with one of them?",
                hits.len(),
                if hits.len() == 1 { "" } else { "s" },
                listing
            ),
            true,
        )
    }

    async fn check_opportunities(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
    ) -> ExecutionOutcome {
        let value = match self
            .dispatch(call_id, "check_opportunities", "check_opportunities", json!({}))
            .await
        {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::reply(gateway_failure_message(&err), false),
        };
        let hits: Vec<OpportunityHit> = parse_hits(&value, "opportunities");
        memory.last_opportunities = hits
            .iter()
            .map(|o| OpportunityRef {
                id: o.id,
                title: o.title.clone(),
                company: o.company.clone(),
            })
            .collect();

        if hits.is_empty() {
            return ExecutionOutcome::reply("There are no open opportunities right now.", true);
        }
        let spoken = hits
            .iter()
            .take(SPOKEN_RESULT_LIMIT)
            .enumerate()
            .map(|(i, o)| match &o.company {
                Some(company) => format!("{}: {} at {}", i + 1, o.title, company),
                None => format!("{}: {}", i + 1, o.title),
            })
            .collect::<Vec<_>>()
            .join(". ");
        ExecutionOutcome::reply(
            format!("Here are the latest opportunities. {spoken}."),
            true,
        )
    }

    async fn check_events(&self, call_id: &str, memory: &mut ConversationMemory) -> ExecutionOutcome {
        let value = match self
            .dispatch(call_id, "check_events", "check_events", json!({}))
            .await
        {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::reply(gateway_failure_message(&err), false),
        };
        let hits: Vec<EventHit> = parse_hits(&value, "events");
        memory.last_events = hits
            .iter()
            .map(|e| EventRef {
                id: e.id,
                title: e.title.clone(),
                date: e.date.clone(),
            })
            .collect();

        if hits.is_empty() {
            return ExecutionOutcome::reply("There are no upcoming events on the calendar.", true);
        }
        let spoken = hits
            .iter()
            .take(SPOKEN_RESULT_LIMIT)
            .enumerate()
            .map(|(i, e)| match &e.date {
                Some(date) => format!("{}: {} on {}", i + 1, e.title, date),
                None => format!("{}: {}", i + 1, e.title),
            })
            .collect::<Vec<_>>()
            .join(". ");
        ExecutionOutcome::reply(
            format!("Here's what's coming up. {spoken}. Say RSVP to register for one."),
            true,
        )
    }

    async fn send_message(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        recipient_name: &str,
        message: &str,
    ) -> ExecutionOutcome {
        let params = json!({
            "user_id": memory.user_id,
            "recipient_name": recipient_name,
            "message": message,
        });
        match self.dispatch(call_id, "send_message", "send_message", params).await {
            Ok(_) => ExecutionOutcome::reply(
                format!("Okay — I've sent your message to {recipient_name}."),
                true,
            ),
            Err(err) => ExecutionOutcome::reply(gateway_failure_message(&err), false),
        }
    }

    async fn rsvp_event(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        event_id: Option<Uuid>,
        event_title: Option<&str>,
    ) -> ExecutionOutcome {
        let Some(event_id) = event_id else {
            return ExecutionOutcome::reply(NO_EVENT_CONTEXT, false);
        };
        let params = json!({
            "user_id": memory.user_id,
            "event_id": event_id,
            "event_title": event_title,
        });
        match self.dispatch(call_id, "rsvp_event", "rsvp_event", params).await {
            Ok(_) => ExecutionOutcome::reply(
                format!(
                    "You're registered for {}. See you there!",
                    event_title.unwrap_or("the event")
                ),
                true,
            ),
            Err(err) => ExecutionOutcome::reply(gateway_failure_message(&err), false),
        }
    }

    async fn get_profile(&self, call_id: &str, memory: &mut ConversationMemory) -> ExecutionOutcome {
        let params = json!({ "user_id": memory.user_id });
        let value = match self.dispatch(call_id, "get_profile", "get_profile", params).await {
            Ok(value) => value,
            Err(err) => return ExecutionOutcome::reply(gateway_failure_message(&err), false),
        };
        let profile: Result<ProfileHit, _> = serde_json::from_value(value);
        match profile {
            Ok(profile) => {
                let name = profile
                    .name
                    .or_else(|| memory.user_name.clone())
                    .unwrap_or_else(|| "there".to_string());
                let skills = if profile.skills.is_empty() {
                    "no skills listed yet".to_string()
                } else {
                    format!("skills: {}", join_spoken(&profile.skills))
                };
                ExecutionOutcome::reply(format!("Here's your profile, {name}. You have {skills}."), true)
            }
            Err(_) => ExecutionOutcome::reply(
                gateway_failure_message(&GatewayError::Transient("unparseable profile".into())),
                false,
            ),
        }
    }

    async fn create_post(
        &self,
        call_id: &str,
        memory: &mut ConversationMemory,
        content: &str,
    ) -> ExecutionOutcome {
        let Some(user_id) = memory.user_id else {
            return ExecutionOutcome::reply(
                gateway_failure_message(&GatewayError::Unauthorized),
                false,
            );
        };
        let result = self.gateway.create_post(user_id, content).await;
        let (status, summary) = match &result {
            Ok(value) => (200, summarize(&value.to_string())),
            Err(err) => (gateway_status(err), summarize(&err.to_string())),
        };
        self.record(
            call_id,
            "create_post",
            "posts.create",
            &json!({ "user_id": user_id, "content": content }),
            status,
            summary,
        )
        .await;
        match result {
            Ok(_) => ExecutionOutcome::reply("Your post is live on the community feed.", true),
            Err(err) => ExecutionOutcome::reply(gateway_failure_message(&err), false),
        }
    }

    /// Invoke a named tool and write the audit entry for it, success or not.
    async fn dispatch(
        &self,
        call_id: &str,
        action: &str,
        tool_name: &str,
        parameters: Value,
    ) -> Result<Value, GatewayError> {
        let result = self.gateway.invoke(tool_name, parameters.clone()).await;
        let (status, summary) = match &result {
            Ok(value) => (200, summarize(&value.to_string())),
            Err(err) => (gateway_status(err), summarize(&err.to_string())),
        };
        self.record(call_id, action, tool_name, &parameters, status, summary)
            .await;
        result
    }

    async fn record(
        &self,
        call_id: &str,
        action: &str,
        endpoint: &str,
        request: &Value,
        response_status: i32,
        response_summary: String,
    ) {
        let entry = ActionAuditEntry {
            call_session_id: call_id.to_string(),
            action: action.to_string(),
            endpoint: endpoint.to_string(),
            request_summary: summarize(&request.to_string()),
            response_status,
            response_summary,
            created_at: Utc::now(),
        };
        if let Err(err) = self.audit.append(entry).await {
            tracing::warn!(error = %err, call_id, action, "audit append failed; turn continues");
        }
    }
}

/// Scheduling does not hit the gateway on the selection turn; it opens the
/// time-capture sub-flow and the gateway call happens when the time arrives.
fn open_schedule_flow(
    memory: &ConversationMemory,
    mentor_id: Option<Uuid>,
    mentor_name: &str,
) -> ExecutionOutcome {
    let generic = mentor_name.is_empty() || mentor_name.to_lowercase().contains("mentor");
    if mentor_id.is_none() && generic {
        let response = if memory.last_mentors.is_empty() {
            NO_MENTOR_CONTEXT
        } else {
            WHICH_MENTOR
        };
        return ExecutionOutcome::reply(response, false);
    }
    ExecutionOutcome {
        response: format!(
            "Great choice. When would you like to meet {mentor_name}? \
             You can say something like tomorrow at 3 PM."
        ),
        success: true,
        next_flow: SubFlow::AwaitingScheduleTime {
            target: ScheduleTarget {
                mentor_id,
                mentor_name: mentor_name.to_string(),
            },
        },
    }
}

fn gateway_status(err: &GatewayError) -> i32 {
    match err {
        GatewayError::Unauthorized => 401,
        GatewayError::Forbidden => 403,
        GatewayError::RateLimited => 429,
        GatewayError::Transient(_) => 502,
    }
}

/// "A", "A and B", "A, B and C".
fn join_spoken(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

/// Gateways may return either a bare array or an object keyed by kind;
/// anything unparseable degrades to an empty list (logged, not spoken).
fn parse_hits<T: for<'de> Deserialize<'de>>(value: &Value, key: &str) -> Vec<T> {
    let candidate = if value.is_array() {
        value
    } else {
        match value.get(key) {
            Some(inner) => inner,
            None => return Vec::new(),
        }
    };
    match serde_json::from_value(candidate.clone()) {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(error = %err, key, "unparseable gateway result");
            Vec::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct MentorHit {
    id: Uuid,
    name: String,
    #[serde(default)]
    designation: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
}

impl MentorHit {
    fn spoken_line(&self) -> String {
        match (&self.designation, &self.company) {
            (Some(designation), Some(company)) => {
                format!("{}, {} at {}", self.name, designation, company)
            }
            (Some(designation), None) => format!("{}, {}", self.name, designation),
            (None, Some(company)) => format!("{} at {}", self.name, company),
            (None, None) => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventHit {
    id: Uuid,
    title: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpportunityHit {
    id: Uuid,
    title: String,
    #[serde(default)]
    company: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileHit {
    id: Uuid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        invocations: Mutex<Vec<(String, Value)>>,
        posts: Mutex<Vec<(Uuid, String)>>,
        responses: Mutex<Vec<Result<Value, GatewayError>>>,
    }

    impl RecordingGateway {
        fn respond_with(results: Vec<Result<Value, GatewayError>>) -> Self {
            RecordingGateway {
                responses: Mutex::new(results),
                ..Default::default()
            }
        }

        fn next_response(&self) -> Result<Value, GatewayError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(json!({}))
            } else {
                responses.remove(0)
            }
        }
    }

    impl DomainGateway for &RecordingGateway {
        async fn invoke(&self, tool_name: &str, parameters: Value) -> Result<Value, GatewayError> {
            self.invocations
                .lock()
                .unwrap()
                .push((tool_name.to_string(), parameters));
            self.next_response()
        }

        async fn create_post(&self, user_id: Uuid, content: &str) -> Result<Value, GatewayError> {
            self.posts.lock().unwrap().push((user_id, content.to_string()));
            self.next_response()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<ActionAuditEntry>>,
    }

    impl AuditSink for &RecordingSink {
        async fn append(&self, entry: ActionAuditEntry) -> Result<(), StoreError> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    fn authed_memory() -> ConversationMemory {
        ConversationMemory {
            user_id: Some(Uuid::new_v4()),
            user_name: Some("Asha".into()),
            ..Default::default()
        }
    }

    fn mentors_payload() -> Value {
        json!({ "mentors": [
            { "id": Uuid::new_v4(), "name": "Priya Nair", "designation": "Staff Engineer", "company": "Volt", "skills": ["rust"] },
            { "id": Uuid::new_v4(), "name": "Ben Okafor", "designation": "Data Lead", "company": "Gale" },
        ]})
    }

    #[tokio::test]
    async fn find_mentors_updates_memory_and_enumerates() {
        let gateway = RecordingGateway::respond_with(vec![Ok(mentors_payload())]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::FindMentors,
                    params: IntentParams::FindMentors {
                        skill_area: Some("data science".into()),
                    },
                },
                &mut memory,
            )
            .await;

        assert!(outcome.success);
        assert!(outcome.response.contains("Priya Nair, Staff Engineer at Volt"));
        assert!(outcome.response.contains("schedule a session"));
        assert_eq!(memory.last_mentors.len(), 2);
        assert_eq!(memory.last_topic.as_deref(), Some("data science"));
    }

    #[tokio::test]
    async fn zero_mentors_speaks_fixed_message() {
        let gateway = RecordingGateway::respond_with(vec![Ok(json!({ "mentors": [] }))]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::FindMentors,
                    params: IntentParams::FindMentors { skill_area: None },
                },
                &mut memory,
            )
            .await;
        assert_eq!(outcome.response, NO_MENTORS_FOUND);
        assert!(memory.last_mentors.is_empty());
    }

    #[tokio::test]
    async fn opportunities_speak_at_most_three() {
        let many: Vec<Value> = (1..=5)
            .map(|i| json!({ "id": Uuid::new_v4(), "title": format!("Role {i}"), "company": "Volt" }))
            .collect();
        let gateway = RecordingGateway::respond_with(vec![Ok(json!({ "opportunities": many }))]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::CheckOpportunities,
                    params: IntentParams::Empty,
                },
                &mut memory,
            )
            .await;
        assert!(outcome.response.contains("Role 3"));
        assert!(!outcome.response.contains("Role 4"));
        // Memory keeps everything; only the spoken list is clipped.
        assert_eq!(memory.last_opportunities.len(), 5);
    }

    #[tokio::test]
    async fn skills_added_accumulates_across_calls() {
        let gateway = RecordingGateway::respond_with(vec![Ok(json!({})), Ok(json!({}))]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        for skills in [vec!["Python".to_string()], vec!["Go".to_string(), "Rust".to_string()]] {
            executor
                .execute(
                    "CA1",
                    &ClassifiedIntent {
                        intent: Intent::UpdateSkills,
                        params: IntentParams::UpdateSkills { new_skills: skills },
                    },
                    &mut memory,
                )
                .await;
        }
        assert_eq!(memory.skills_added, vec!["Python", "Go", "Rust"]);
    }

    #[tokio::test]
    async fn repeated_intent_appends_independent_audit_entries() {
        let gateway = RecordingGateway::respond_with(vec![Ok(json!({})), Ok(json!({}))]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let intent = ClassifiedIntent {
            intent: Intent::CheckEvents,
            params: IntentParams::Empty,
        };
        executor.execute("CA1", &intent, &mut memory).await;
        executor.execute("CA1", &intent, &mut memory).await;

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == "check_events"));
        assert!(entries.iter().all(|e| e.call_session_id == "CA1"));
    }

    #[tokio::test]
    async fn gateway_error_classes_are_distinguishable() {
        let errors = [
            GatewayError::Unauthorized,
            GatewayError::Forbidden,
            GatewayError::RateLimited,
            GatewayError::Transient("boom".into()),
        ];
        let mut spoken = Vec::new();
        for err in errors {
            let gateway = RecordingGateway::respond_with(vec![Err(err.clone())]);
            let sink = RecordingSink::default();
            let executor = IntentExecutor::new(&gateway, &sink);
            let mut memory = authed_memory();
            let outcome = executor
                .execute(
                    "CA1",
                    &ClassifiedIntent {
                        intent: Intent::CheckEvents,
                        params: IntentParams::Empty,
                    },
                    &mut memory,
                )
                .await;
            assert!(!outcome.success);
            // No raw internal error text reaches the caller.
            assert!(!outcome.response.contains("boom"));
            spoken.push(outcome.response);
        }
        let unique: std::collections::HashSet<_> = spoken.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn user_id_is_resolved_once_and_cached() {
        let user_id = Uuid::new_v4();
        let gateway = RecordingGateway::respond_with(vec![
            Ok(json!({ "id": user_id, "name": "Asha" })),
            Ok(json!({})),
            Ok(json!({})),
        ]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = ConversationMemory::default();

        let intent = ClassifiedIntent {
            intent: Intent::UpdateSkills,
            params: IntentParams::UpdateSkills {
                new_skills: vec!["Python".into()],
            },
        };
        executor.execute("CA1", &intent, &mut memory).await;
        executor.execute("CA1", &intent, &mut memory).await;

        assert_eq!(memory.user_id, Some(user_id));
        let invocations = gateway.invocations.lock().unwrap();
        let profile_calls = invocations.iter().filter(|(t, _)| t == "get_profile").count();
        assert_eq!(profile_calls, 1);
    }

    #[tokio::test]
    async fn create_post_bypasses_the_tool_surface() {
        let gateway = RecordingGateway::respond_with(vec![Ok(json!({ "id": Uuid::new_v4() }))]);
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::CreatePost,
                    params: IntentParams::CreatePost {
                        content: "hiring interns at Volt".into(),
                    },
                },
                &mut memory,
            )
            .await;

        assert!(outcome.success);
        assert!(gateway.invocations.lock().unwrap().is_empty());
        let posts = gateway.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, "hiring interns at Volt");
        // Direct writes are audited too.
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn schedule_intent_opens_time_capture_flow() {
        let gateway = RecordingGateway::default();
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();
        let mentor_id = Uuid::new_v4();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::ScheduleMentorship,
                    params: IntentParams::ScheduleMentorship {
                        mentor_id: Some(mentor_id),
                        mentor_name: "Priya Nair".into(),
                    },
                },
                &mut memory,
            )
            .await;

        assert!(outcome.success);
        assert_eq!(
            outcome.next_flow,
            SubFlow::AwaitingScheduleTime {
                target: ScheduleTarget {
                    mentor_id: Some(mentor_id),
                    mentor_name: "Priya Nair".into(),
                }
            }
        );
        // Selection turn makes no gateway call; that happens on time capture.
        assert!(gateway.invocations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rsvp_without_event_context_does_not_hit_gateway() {
        let gateway = RecordingGateway::default();
        let sink = RecordingSink::default();
        let executor = IntentExecutor::new(&gateway, &sink);
        let mut memory = authed_memory();

        let outcome = executor
            .execute(
                "CA1",
                &ClassifiedIntent {
                    intent: Intent::RsvpEvent,
                    params: IntentParams::RsvpEvent {
                        event_id: None,
                        event_title: None,
                    },
                },
                &mut memory,
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.response, NO_EVENT_CONTEXT);
        assert!(gateway.invocations.lock().unwrap().is_empty());
    }
}
