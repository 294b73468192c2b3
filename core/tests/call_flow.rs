//! Full-call scenarios against in-memory stores: greeting, authentication,
//! the intent loop, the schedule sub-flow, and termination.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use alumline_core::audit::{ActionAuditEntry, AuditSink};
use alumline_core::auth::{AccessCode, AccessCodeStore};
use alumline_core::error::{GatewayError, StoreError};
use alumline_core::executor::DomainGateway;
use alumline_core::machine::{CallStateMachine, TurnRequest, TurnResponse};
use alumline_core::session::{CallSession, CallStatus, SessionStore};

#[derive(Clone, Default)]
struct MemorySessions(Arc<Mutex<HashMap<String, CallSession>>>);

impl MemorySessions {
    fn get(&self, call_id: &str) -> Option<CallSession> {
        self.0.lock().unwrap().get(call_id).cloned()
    }
}

impl SessionStore for MemorySessions {
    async fn load(&self, call_id: &str) -> Result<Option<CallSession>, StoreError> {
        Ok(self.0.lock().unwrap().get(call_id).cloned())
    }

    // Same compare-and-swap contract as the Postgres store: the write only
    // lands if the stored turn_seq still matches the loaded one.
    async fn save(&self, session: &CallSession) -> Result<(), StoreError> {
        let mut map = self.0.lock().unwrap();
        let stored_seq = map.get(&session.id).map(|s| s.turn_seq);
        match stored_seq {
            None if session.turn_seq == 0 => {}
            Some(seq) if seq == session.turn_seq => {}
            _ => return Err(StoreError::Conflict(session.id.clone())),
        }
        let mut persisted = session.clone();
        persisted.turn_seq += 1;
        map.insert(persisted.id.clone(), persisted);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct MemoryCodes {
    codes: Arc<Mutex<HashMap<String, AccessCode>>>,
    names: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl MemoryCodes {
    fn insert(&self, code: AccessCode, name: &str) {
        self.names.lock().unwrap().insert(code.user_id, name.to_string());
        self.codes.lock().unwrap().insert(code.code.clone(), code);
    }
}

impl AccessCodeStore for MemoryCodes {
    async fn lookup(&self, code: &str) -> Result<Option<AccessCode>, StoreError> {
        Ok(self.codes.lock().unwrap().get(code).cloned())
    }

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.names.lock().unwrap().get(&user_id).cloned())
    }
}

#[derive(Clone, Default)]
struct ScriptedGateway {
    responses: Arc<Mutex<Vec<Result<Value, GatewayError>>>>,
    invocations: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ScriptedGateway {
    fn push(&self, response: Result<Value, GatewayError>) {
        self.responses.lock().unwrap().push(response);
    }

    fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

impl DomainGateway for ScriptedGateway {
    async fn invoke(&self, tool_name: &str, parameters: Value) -> Result<Value, GatewayError> {
        self.invocations
            .lock()
            .unwrap()
            .push((tool_name.to_string(), parameters));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(json!({}))
        } else {
            responses.remove(0)
        }
    }

    async fn create_post(&self, _user_id: Uuid, _content: &str) -> Result<Value, GatewayError> {
        Ok(json!({}))
    }
}

#[derive(Clone, Default)]
struct MemorySink(Arc<Mutex<Vec<ActionAuditEntry>>>);

impl AuditSink for MemorySink {
    async fn append(&self, entry: ActionAuditEntry) -> Result<(), StoreError> {
        self.0.lock().unwrap().push(entry);
        Ok(())
    }
}

type TestMachine = CallStateMachine<MemorySessions, MemoryCodes, ScriptedGateway, MemorySink>;

struct Harness {
    machine: TestMachine,
    sessions: MemorySessions,
    gateway: ScriptedGateway,
    sink: MemorySink,
}

fn harness() -> Harness {
    let sessions = MemorySessions::default();
    let codes = MemoryCodes::default();
    codes.insert(
        AccessCode {
            code: "614203".into(),
            user_id: Uuid::new_v4(),
            is_active: true,
            expires_at: Utc::now() + Duration::hours(2),
        },
        "Asha",
    );
    let gateway = ScriptedGateway::default();
    let sink = MemorySink::default();
    let machine = CallStateMachine::new(
        sessions.clone(),
        codes.clone(),
        gateway.clone(),
        sink.clone(),
    );
    Harness {
        machine,
        sessions,
        gateway,
        sink,
    }
}

fn first_turn(call_id: &str) -> TurnRequest {
    TurnRequest {
        call_id: call_id.into(),
        utterance_text: None,
        digits: None,
        is_first_turn: true,
        call_type: None,
    }
}

fn speech(call_id: &str, text: &str) -> TurnRequest {
    TurnRequest {
        call_id: call_id.into(),
        utterance_text: Some(text.into()),
        digits: None,
        is_first_turn: false,
        call_type: None,
    }
}

async fn turn(h: &Harness, req: TurnRequest) -> TurnResponse {
    h.machine.handle_turn(&req).await.expect("storage available")
}

#[tokio::test]
async fn five_turn_call_end_to_end() {
    let h = harness();
    let mentor_id = Uuid::new_v4();
    h.gateway.push(Ok(json!({ "mentors": [
        { "id": mentor_id, "name": "Priya Nair", "designation": "Staff Engineer", "company": "Volt" },
        { "id": Uuid::new_v4(), "name": "Ben Okafor", "designation": "Data Lead", "company": "Gale" },
    ]})));
    h.gateway.push(Ok(json!({ "id": Uuid::new_v4(), "status": "requested" })));

    // Call connects.
    let greeting = turn(&h, first_turn("CA99")).await;
    assert!(greeting.prompt_text.contains("access code"));
    assert!(greeting.expect_continued_input);

    // Turn 1: valid unexpired code.
    let menu = turn(&h, speech("CA99", "614203")).await;
    assert!(menu.prompt_text.starts_with("Hi Asha!"));
    assert_eq!(
        h.sessions.get("CA99").unwrap().status,
        CallStatus::Authenticated
    );

    // Turn 2: mentor discovery.
    let mentors = turn(&h, speech("CA99", "find mentors for data science")).await;
    assert!(mentors.prompt_text.contains("Priya Nair"));
    assert!(mentors.prompt_text.contains("Ben Okafor"));
    let session = h.sessions.get("CA99").unwrap();
    assert_eq!(session.context.memory.last_mentors.len(), 2);
    assert_eq!(
        session.context.memory.last_topic.as_deref(),
        Some("data science")
    );

    // Turn 3: ordinal selection opens the schedule sub-flow.
    let when = turn(&h, speech("CA99", "schedule with the first mentor")).await;
    assert!(when.prompt_text.contains("Priya Nair"));
    assert!(when.expect_continued_input);

    // Turn 4: time capture completes the sub-flow.
    let confirmed = turn(&h, speech("CA99", "tomorrow at 3pm")).await;
    assert!(confirmed.prompt_text.contains("Priya Nair"));
    assert!(confirmed.prompt_text.contains("tomorrow at 3pm"));

    let invocations = h.gateway.invocations();
    assert_eq!(invocations[0].0, "find_mentors");
    assert_eq!(invocations[1].0, "schedule_mentorship");
    assert_eq!(invocations[1].1["mentor_id"], json!(mentor_id));
    assert_eq!(invocations[1].1["preferred_time"], json!("tomorrow at 3pm"));

    // Turn 5: farewell.
    let bye = turn(&h, speech("CA99", "thank you, bye")).await;
    assert!(bye.end_call);
    let session = h.sessions.get("CA99").unwrap();
    assert_eq!(session.status, CallStatus::Completed);
    assert!(session.ended_at.is_some());

    // Two side-effecting actions, two audit entries.
    assert_eq!(h.sink.0.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn two_failed_codes_end_the_call() {
    let h = harness();
    turn(&h, first_turn("CA1")).await;

    let retry = turn(&h, speech("CA1", "000000")).await;
    assert!(!retry.end_call);
    assert_eq!(h.sessions.get("CA1").unwrap().status, CallStatus::AuthFailed);

    let done = turn(&h, speech("CA1", "111111")).await;
    assert!(done.end_call);
    assert_eq!(h.sessions.get("CA1").unwrap().status, CallStatus::Completed);
}

#[tokio::test]
async fn failed_then_valid_code_proceeds() {
    let h = harness();
    turn(&h, first_turn("CA2")).await;
    turn(&h, speech("CA2", "000000")).await;

    let menu = turn(&h, speech("CA2", "614203")).await;
    assert!(!menu.end_call);
    assert!(menu.prompt_text.starts_with("Hi Asha!"));
    assert_eq!(
        h.sessions.get("CA2").unwrap().status,
        CallStatus::Authenticated
    );
}

#[tokio::test]
async fn unknown_intent_never_terminates_the_call() {
    let h = harness();
    turn(&h, first_turn("CA3")).await;
    turn(&h, speech("CA3", "614203")).await;

    let fallback = turn(&h, speech("CA3", "what is the meaning of life")).await;
    assert!(!fallback.end_call);
    assert!(fallback.expect_continued_input);
    assert!(fallback.prompt_text.contains("find mentors"));
    assert_eq!(h.sessions.get("CA3").unwrap().status, CallStatus::InIntent);

    // The loop is still live afterwards.
    h.gateway.push(Ok(json!({ "events": [] })));
    let events = turn(&h, speech("CA3", "show upcoming events")).await;
    assert!(!events.end_call);
}

#[tokio::test]
async fn gateway_failure_keeps_the_session_alive() {
    let h = harness();
    turn(&h, first_turn("CA4")).await;
    turn(&h, speech("CA4", "614203")).await;

    h.gateway.push(Err(GatewayError::Transient("db down".into())));
    let resp = turn(&h, speech("CA4", "show upcoming events")).await;
    assert!(!resp.end_call);
    assert!(!resp.prompt_text.contains("db down"));
    assert_eq!(h.sessions.get("CA4").unwrap().status, CallStatus::InIntent);
}

#[tokio::test]
async fn turn_for_unknown_call_ends_cleanly() {
    let h = harness();
    let resp = turn(&h, speech("CA-GHOST", "find mentors")).await;
    assert!(resp.end_call);
    assert!(!resp.expect_continued_input);
}

#[tokio::test]
async fn turn_after_completion_is_rejected() {
    let h = harness();
    turn(&h, first_turn("CA5")).await;
    turn(&h, speech("CA5", "614203")).await;
    turn(&h, speech("CA5", "goodbye")).await;

    let resp = turn(&h, speech("CA5", "find mentors")).await;
    assert!(resp.end_call);
    // No new processing happened for the dead session.
    assert!(h.gateway.invocations().is_empty());
}

#[tokio::test]
async fn silence_finalizes_the_session() {
    let h = harness();
    turn(&h, first_turn("CA6")).await;
    turn(&h, speech("CA6", "614203")).await;

    let resp = turn(
        &h,
        TurnRequest {
            call_id: "CA6".into(),
            utterance_text: None,
            digits: None,
            is_first_turn: false,
            call_type: None,
        },
    )
    .await;
    assert!(resp.end_call);
    assert_eq!(h.sessions.get("CA6").unwrap().status, CallStatus::Completed);
}

#[tokio::test]
async fn carrier_hangup_signal_completes_idempotently() {
    let h = harness();
    turn(&h, first_turn("CA7")).await;

    h.machine.handle_call_ended("CA7").await.unwrap();
    let session = h.sessions.get("CA7").unwrap();
    assert_eq!(session.status, CallStatus::Completed);
    assert_eq!(session.summary.as_deref(), Some("carrier reported hangup"));

    // Repeat and unknown ids are no-ops.
    h.machine.handle_call_ended("CA7").await.unwrap();
    h.machine.handle_call_ended("CA-GHOST").await.unwrap();
}

#[tokio::test]
async fn session_store_save_is_compare_and_swap() {
    let sessions = MemorySessions::default();
    let session = CallSession::new("CA8", alumline_core::session::CallType::Inbound, Utc::now());
    sessions.save(&session).await.unwrap();

    // A stale copy (same turn_seq) loses the race.
    assert!(matches!(
        sessions.save(&session).await,
        Err(StoreError::Conflict(_))
    ));

    let fresh = sessions.load("CA8").await.unwrap().unwrap();
    assert_eq!(fresh.turn_seq, 1);
    sessions.save(&fresh).await.unwrap();
}
