//! Session event records delivered via the `session.event` notification (§3, §6).
//!
//! `SessionEventType` is a closed set for the variants `spec.md` names
//! explicitly, with an `Other(String)` catch-all so events the CLI adds
//! later still round-trip instead of failing to deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on a session's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: SessionEventType,
    pub data: EventData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Closed set of event types named by §3, with an opaque catch-all for
/// anything else the CLI emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventType {
    AssistantMessage,
    AssistantMessageDelta,
    AssistantReasoningDelta,
    SessionIdle,
    SessionError,
    SessionCompactionStart,
    SessionCompactionComplete,
    /// Any event type not named above, preserved verbatim.
    Other(String),
}

impl SessionEventType {
    fn as_wire_str(&self) -> &str {
        match self {
            Self::AssistantMessage => "assistant.message",
            Self::AssistantMessageDelta => "assistant.message_delta",
            Self::AssistantReasoningDelta => "assistant.reasoning_delta",
            Self::SessionIdle => "session.idle",
            Self::SessionError => "session.error",
            Self::SessionCompactionStart => "session.compaction_start",
            Self::SessionCompactionComplete => "session.compaction_complete",
            Self::Other(s) => s,
        }
    }

    fn from_wire_str(s: &str) -> Self {
        match s {
            "assistant.message" => Self::AssistantMessage,
            "assistant.message_delta" => Self::AssistantMessageDelta,
            "assistant.reasoning_delta" => Self::AssistantReasoningDelta,
            "session.idle" => Self::SessionIdle,
            "session.error" => Self::SessionError,
            "session.compaction_start" => Self::SessionCompactionStart,
            "session.compaction_complete" => Self::SessionCompactionComplete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for SessionEventType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for SessionEventType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire_str(&s))
    }
}

/// Event payload. Field names and presence vary by event type; the fields
/// below cover the ones `spec.md`'s concrete scenarios and design notes
/// reference directly (§8, §9). Anything else is preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// `assistant.message` / `assistant.message_delta`: full or incremental content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// `assistant.message_delta` / `assistant.reasoning_delta`: the incremental chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_content: Option<String>,
    /// `session.error`: human-readable message (§8 scenario 5, §9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `session.error`: optional stack trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Everything else the CLI attaches, preserved unchanged (§9: "preserving
    /// unknown fields is required").
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_event_type_round_trips() {
        let value = json!({"type": "session.idle", "data": {}});
        let event: SessionEvent = serde_json::from_value(value).unwrap();
        assert_eq!(event.event_type, SessionEventType::SessionIdle);
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], "session.idle");
    }

    #[test]
    fn unknown_event_type_preserved_as_other() {
        let value = json!({"type": "hook.start", "data": {"toolName": "shell"}});
        let event: SessionEvent = serde_json::from_value(value).unwrap();
        assert_eq!(event.event_type, SessionEventType::Other("hook.start".into()));
        assert_eq!(event.data.extra.get("toolName").unwrap(), "shell");
    }
}
