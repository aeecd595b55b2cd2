//! Events, notes and tasks attached to a lead.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::lead::{value_is_truthy, value_text};

/// Kind of a lead event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Lead created.
    LeadAdded,
    /// Lead deleted.
    LeadDeleted,
    /// Inbound call registered by telephony.
    IncomingCall,
    /// Inbound chat message.
    #[serde(rename = "incoming_chat_message")]
    IncomingChat,
    /// Lead merged into another entity.
    EntityMerged,
    /// Outbound call registered by telephony.
    OutgoingCall,
    /// Outbound chat message.
    #[serde(rename = "outgoing_chat_message")]
    OutgoingChat,
    /// Responsible user reassigned.
    #[serde(rename = "entity_responsible_changed")]
    ResponsibleChanged,
    /// Pipeline status changed.
    #[serde(rename = "lead_status_changed")]
    StageChanged,
    /// Anything the engine does not interpret.
    #[serde(other)]
    Other,
}

/// Pipeline coordinate carried by status-change payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRef {
    /// Status id.
    pub id: i64,
    /// Pipeline id.
    pub pipeline_id: i64,
}

/// Chat message metadata carried by chat events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Messenger integration that produced the message.
    #[serde(default)]
    pub origin: Option<String>,
}

/// One before/after payload entry of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventValue {
    /// Status coordinate, for status changes.
    #[serde(default)]
    pub lead_status: Option<StatusRef>,
    /// Message metadata, for chat events.
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

/// A timestamped state transition of a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Epoch seconds.
    pub created_at: i64,
    /// Author user id, `0` for system events.
    #[serde(default)]
    pub created_by: i64,
    /// State before the event.
    #[serde(default)]
    pub value_before: Vec<EventValue>,
    /// State after the event.
    #[serde(default)]
    pub value_after: Vec<EventValue>,
}

impl Event {
    /// Status coordinate before a status change.
    #[must_use]
    pub fn status_before(&self) -> Option<StatusRef> {
        self.value_before.first().and_then(|v| v.lead_status)
    }

    /// Status coordinate after a status change.
    #[must_use]
    pub fn status_after(&self) -> Option<StatusRef> {
        self.value_after.first().and_then(|v| v.lead_status)
    }

    /// Origin of the chat message carried by the event.
    #[must_use]
    pub fn message_origin(&self) -> Option<&str> {
        self.value_after
            .first()
            .and_then(|v| v.message.as_ref())
            .map(|m| m.origin.as_deref().unwrap_or(""))
    }
}

/// Kind of a lead note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Email message.
    #[serde(rename = "amomail_message")]
    Email,
    /// Outbound call.
    CallOut,
    /// Inbound call.
    CallIn,
    /// Free-text note.
    Common,
    /// Anything else.
    #[serde(other)]
    Other,
}

/// Free-form parameters of a note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteParams {
    /// Note text.
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
    /// Telephony provider.
    #[serde(default, deserialize_with = "lenient_text")]
    pub source: Option<String>,
    /// Email subject.
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject: Option<String>,
    /// Whether an email was inbound.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub income: Option<bool>,
    /// Provider call identifier.
    #[serde(default)]
    pub uniq: Option<Value>,
    /// Call duration as reported by the provider.
    #[serde(default)]
    pub duration: Option<Value>,
}

/// Outcome of reading a provider call duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDuration {
    /// A usable number of seconds.
    Seconds(i64),
    /// The provider sent something that is not a number.
    Garbage,
}

impl NoteParams {
    /// Parses the call duration.
    ///
    /// Absent and empty values read as zero seconds.
    #[must_use]
    pub fn call_duration(&self) -> CallDuration {
        match &self.duration {
            None | Some(Value::Null) => CallDuration::Seconds(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map_or(CallDuration::Garbage, CallDuration::Seconds),
            Some(Value::String(s)) if s.is_empty() => CallDuration::Seconds(0),
            Some(Value::String(s)) if s.chars().all(|c| c.is_ascii_digit()) => {
                s.parse().map_or(CallDuration::Garbage, CallDuration::Seconds)
            }
            Some(Value::Bool(false)) => CallDuration::Seconds(0),
            Some(_) => CallDuration::Garbage,
        }
    }

    /// Returns true if the provider call id mentions `needle`.
    #[must_use]
    pub fn uniq_contains(&self, needle: &str) -> bool {
        match &self.uniq {
            Some(Value::String(s)) => s.contains(needle),
            Some(Value::Null) | None => false,
            Some(other) => other.to_string().contains(needle),
        }
    }
}

/// A timestamped annotation of a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note kind.
    pub note_type: NoteKind,
    /// Epoch seconds.
    pub created_at: i64,
    /// Author user id.
    #[serde(default)]
    pub created_by: Option<i64>,
    /// Free-form parameters.
    #[serde(default, deserialize_with = "lenient_params")]
    pub params: NoteParams,
}

/// Scalars of any JSON type read as text; `null` reads as absent.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|v| !v.is_null())
        .map(|v| value_text(&v)))
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(b),
        Some(other) => Some(value_is_truthy(&other)),
    })
}

/// Anything but an object, e.g. `null` or `[]`, reads as empty parameters.
fn lenient_params<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NoteParams, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(NoteParams::default()),
    }
}

/// A task linked to a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Whether the task was closed.
    #[serde(default)]
    pub is_completed: bool,
    /// Epoch seconds of the last update, used as completion time.
    pub updated_at: i64,
    /// Assignee.
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
}
