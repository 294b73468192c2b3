//! Ordered-rule utterance classifier.
//!
//! The rule table order is a first-class contract: rules are tried top to
//! bottom, the first matching pattern wins, and the remaining rules are
//! never consulted — even if a later rule would also match. Keep that in
//! mind before reordering anything here; there are tests pinning it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::ConversationMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    UpdateSkills,
    FindMentors,
    CheckOpportunities,
    CheckEvents,
    ScheduleMentorship,
    SendMessage,
    RsvpEvent,
    GetProfile,
    CreatePost,
}

impl Intent {
    /// The tool name on the shared gateway surface.
    pub fn tool_name(self) -> &'static str {
        match self {
            Intent::UpdateSkills => "update_skills",
            Intent::FindMentors => "find_mentors",
            Intent::CheckOpportunities => "check_opportunities",
            Intent::CheckEvents => "check_events",
            Intent::ScheduleMentorship => "schedule_mentorship",
            Intent::SendMessage => "send_message",
            Intent::RsvpEvent => "rsvp_event",
            Intent::GetProfile => "get_profile",
            Intent::CreatePost => "create_post",
        }
    }

    /// Intents whose gateway call must carry the acting user id.
    pub fn requires_user_id(self) -> bool {
        matches!(
            self,
            Intent::UpdateSkills
                | Intent::ScheduleMentorship
                | Intent::SendMessage
                | Intent::RsvpEvent
                | Intent::GetProfile
        )
    }
}

/// Parameters extracted alongside an intent. Typed per intent so the
/// executor never has to guess what a bag of strings means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentParams {
    Empty,
    UpdateSkills {
        new_skills: Vec<String>,
    },
    FindMentors {
        skill_area: Option<String>,
    },
    /// `mentor_id` is `None` when resolution fell through to the raw
    /// captured text.
    ScheduleMentorship {
        mentor_id: Option<Uuid>,
        mentor_name: String,
    },
    /// `message` is empty when the stricter second-pass regex did not
    /// match — the intent is still returned with this degraded parameter
    /// set rather than hidden behind a clarification turn.
    SendMessage {
        recipient_name: String,
        message: String,
    },
    RsvpEvent {
        event_id: Option<Uuid>,
        event_title: Option<String>,
    },
    CreatePost {
        content: String,
    },
}

/// One classified utterance. Ephemeral — survives only as an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub params: IntentParams,
}

type Extractor = fn(Option<&str>, &str, &ConversationMemory) -> IntentParams;

struct Rule {
    intent: Intent,
    patterns: Vec<Regex>,
    extract: Extractor,
}

impl Rule {
    fn new(intent: Intent, patterns: &[&str], extract: Extractor) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid intent pattern"))
            .collect();
        Rule {
            intent,
            patterns,
            extract,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            Intent::UpdateSkills,
            &[
                r"(?i)\bi\s+(?:just\s+|recently\s+)?(?:learned|learnt|know|added|picked\s+up|studied|completed)\s+(.+)",
                r"(?i)\b(?:add|update)\s+(?:to\s+)?my\s+skills?\s*(?:to|with)?\s*[:,]?\s+(.+)",
                r"(?i)\bnew\s+skills?\s*[:,]?\s*(.+)",
            ],
            extract_update_skills,
        ),
        Rule::new(
            Intent::FindMentors,
            &[
                r"(?i)\b(?:find|search|show|get|look)(?:\s+for)?(?:\s+me)?(?:\s+a)?\s+mentors?\b(?:\s+(?:for|in|about|on)\s+(.+))?",
                r"(?i)\bwho\s+can\s+(?:mentor|teach|help)\s+me(?:\s+(?:in|with)\s+(.+))?",
            ],
            extract_find_mentors,
        ),
        Rule::new(
            Intent::CheckOpportunities,
            &[
                r"(?i)\b(?:list|show|check|see|any|what|find)\b.*\b(?:jobs?|internships?|opportunit(?:y|ies))\b",
                r"(?i)\b(?:jobs?|internships?|opportunities)\s+(?:available|open|for\s+me)\b",
            ],
            extract_empty,
        ),
        Rule::new(
            Intent::CheckEvents,
            &[
                r"(?i)\b(?:list|show|check|see|any|what|find)\b.*\b(?:events?|meetups?|webinars?)\b",
                r"(?i)\bwhat'?s\s+(?:happening|coming\s+up)\b",
            ],
            extract_empty,
        ),
        Rule::new(
            Intent::ScheduleMentorship,
            &[
                r"(?i)\b(?:schedule|book|set\s+up|arrange)\s+(?:a\s+)?(?:mentorship\s+)?(?:session|meeting|call|time)\s+with\s+(.+)",
                r"(?i)\b(?:schedule|book|connect|meet)\s+with\s+(?:the\s+)?(.+)",
            ],
            extract_schedule_mentorship,
        ),
        Rule::new(
            Intent::SendMessage,
            &[
                r"(?i)\b(?:send|write)\s+(?:a\s+)?message\s+to\s+(.+)",
                r"(?i)\b(?:tell|message)\s+(.+)",
            ],
            extract_send_message,
        ),
        Rule::new(
            Intent::RsvpEvent,
            &[
                r"(?i)\b(?:rsvp|register|sign\s*up)\s+(?:to|for)\s+(?:the\s+)?(.+)",
                r"(?i)\b(?:join|attend)\s+the\s+(?:events?|meetups?|webinars?)\b",
            ],
            extract_rsvp_event,
        ),
        Rule::new(
            Intent::GetProfile,
            &[
                r"(?i)\b(?:show|get|read)\s+(?:me\s+)?my\s+profile\b",
                r"(?i)\bwhat'?s\s+my\s+profile\b",
                r"(?i)\bmy\s+(?:profile|info|information|details)\b",
            ],
            extract_empty,
        ),
        Rule::new(
            Intent::CreatePost,
            &[
                r"(?i)\b(?:create|make)\s+a\s+(?:social\s+)?post\s+(?:about|saying|that)\s+(.+)",
                r"(?i)\b(?:post|share|publish)\s+(?:that\s+|about\s+)?(.+)",
            ],
            extract_create_post,
        ),
    ]
});

static SKILL_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|\+|\band\b)\s*").expect("valid skill split regex"));

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(first|1st|second|2nd|third|3rd|fourth|4th|fifth|5th)\b")
        .expect("valid ordinal regex")
});

static SEND_MESSAGE_STRICT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:send|write)\s+(?:a\s+)?message\s+to\s+(.+?)\s+(?:saying|that)\s+(.+)")
            .expect("valid strict send regex"),
        Regex::new(r"(?i)\b(?:tell|message)\s+(.+?)\s+(?:that|to|saying)\s+(.+)")
            .expect("valid strict tell regex"),
    ]
});

/// Map free-form speech to an intent plus extracted parameters.
///
/// Returns `None` when no pattern matches; the caller degrades to the fixed
/// capability-listing fallback and the call continues.
pub fn classify(utterance: &str, memory: &ConversationMemory) -> Option<ClassifiedIntent> {
    let utterance = utterance.trim();
    if utterance.is_empty() {
        return None;
    }
    for rule in RULES.iter() {
        for pattern in &rule.patterns {
            if let Some(caps) = pattern.captures(utterance) {
                let captured = caps.get(1).map(|m| m.as_str());
                let params = (rule.extract)(captured, utterance, memory);
                return Some(ClassifiedIntent {
                    intent: rule.intent,
                    params,
                });
            }
        }
    }
    None
}

/// "the second one" → index 1, resolved against the most recent list of the
/// same kind. Only the first five ordinals are recognized.
pub fn ordinal_index(text: &str) -> Option<usize> {
    let word = ORDINAL_RE.captures(text)?.get(1)?.as_str().to_lowercase();
    match word.as_str() {
        "first" | "1st" => Some(0),
        "second" | "2nd" => Some(1),
        "third" | "3rd" => Some(2),
        "fourth" | "4th" => Some(3),
        "fifth" | "5th" => Some(4),
        _ => None,
    }
}

fn extract_empty(_captured: Option<&str>, _utterance: &str, _memory: &ConversationMemory) -> IntentParams {
    IntentParams::Empty
}

/// Split on commas, the word "and", or "+"; trim; drop empties.
fn extract_update_skills(
    captured: Option<&str>,
    _utterance: &str,
    _memory: &ConversationMemory,
) -> IntentParams {
    let new_skills = captured
        .map(|text| {
            SKILL_SPLIT_RE
                .split(text)
                .map(|s| s.trim().trim_end_matches('.').trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    IntentParams::UpdateSkills { new_skills }
}

fn extract_find_mentors(
    captured: Option<&str>,
    _utterance: &str,
    _memory: &ConversationMemory,
) -> IntentParams {
    let skill_area = captured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    IntentParams::FindMentors { skill_area }
}

/// Mentor resolution order: (a) ordinal against `last_mentors`, (b) known
/// mentor name as a substring of the utterance, (c) raw captured text with
/// no resolved id. Only the first that succeeds is used.
fn extract_schedule_mentorship(
    captured: Option<&str>,
    utterance: &str,
    memory: &ConversationMemory,
) -> IntentParams {
    if let Some(idx) = ordinal_index(utterance) {
        if let Some(mentor) = memory.last_mentors.get(idx) {
            return IntentParams::ScheduleMentorship {
                mentor_id: Some(mentor.id),
                mentor_name: mentor.name.clone(),
            };
        }
    }
    let lowered = utterance.to_lowercase();
    for mentor in &memory.last_mentors {
        if !mentor.name.is_empty() && lowered.contains(&mentor.name.to_lowercase()) {
            return IntentParams::ScheduleMentorship {
                mentor_id: Some(mentor.id),
                mentor_name: mentor.name.clone(),
            };
        }
    }
    IntentParams::ScheduleMentorship {
        mentor_id: None,
        mentor_name: captured.map(str::trim).unwrap_or_default().to_string(),
    }
}

/// A second, more specific pass over the *original* utterance separates
/// recipient from message. When it fails, the intent is still returned with
/// the whole captured text as the recipient and an empty message.
fn extract_send_message(
    captured: Option<&str>,
    utterance: &str,
    _memory: &ConversationMemory,
) -> IntentParams {
    for strict in SEND_MESSAGE_STRICT_RES.iter() {
        if let Some(caps) = strict.captures(utterance) {
            if let (Some(recipient), Some(message)) = (caps.get(1), caps.get(2)) {
                return IntentParams::SendMessage {
                    recipient_name: recipient.as_str().trim().to_string(),
                    message: message.as_str().trim().to_string(),
                };
            }
        }
    }
    IntentParams::SendMessage {
        recipient_name: captured.map(str::trim).unwrap_or_default().to_string(),
        message: String::new(),
    }
}

/// Ordinal against `last_events`, else the first entry of `last_events` if
/// present, else empty params.
fn extract_rsvp_event(
    _captured: Option<&str>,
    utterance: &str,
    memory: &ConversationMemory,
) -> IntentParams {
    let event = ordinal_index(utterance)
        .and_then(|idx| memory.last_events.get(idx))
        .or_else(|| memory.last_events.first());
    IntentParams::RsvpEvent {
        event_id: event.map(|e| e.id),
        event_title: event.map(|e| e.title.clone()),
    }
}

fn extract_create_post(
    captured: Option<&str>,
    _utterance: &str,
    _memory: &ConversationMemory,
) -> IntentParams {
    IntentParams::CreatePost {
        content: captured.map(str::trim).unwrap_or_default().to_string(),
    }
}
