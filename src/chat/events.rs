//! Wire types for the chat endpoint

use crate::triage::AgentLabel;
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: Option<&str>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.map(str::to_string),
        }
    }
}

/// Kind of streamed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatEventKind {
    Start,
    Content,
    End,
    Error,
}

/// One server-sent event of a chat turn.
///
/// A turn is always `start`, any number of `content`, then exactly one of
/// `end` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: ChatEventKind,
    pub message: String,
    pub session_id: String,
}

impl ChatEvent {
    /// `message` carries the selected agent label
    pub fn start(session_id: &str, agent: AgentLabel) -> Self {
        Self::new(ChatEventKind::Start, agent.to_string(), session_id)
    }

    pub fn content(session_id: &str, chunk: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Content, chunk, session_id)
    }

    pub fn end(session_id: &str) -> Self {
        Self::new(ChatEventKind::End, "", session_id)
    }

    pub fn error(session_id: &str, message: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Error, message, session_id)
    }

    fn new(kind: ChatEventKind, message: impl Into<String>, session_id: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            session_id: session_id.to_string(),
        }
    }

    /// True for `end` and `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ChatEventKind::End | ChatEventKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = ChatEvent::start("s1", AgentLabel::FoundrySupport);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "start", "message": "foundry-support", "session_id": "s1"})
        );

        let content = serde_json::to_value(ChatEvent::content("s1", "I ")).unwrap();
        assert_eq!(content["type"], "content");
        assert_eq!(content["message"], "I ");
    }

    #[test]
    fn test_request_session_id_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request.message, "hi");
        assert!(request.session_id.is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(ChatEvent::end("s").is_terminal());
        assert!(ChatEvent::error("s", "boom").is_terminal());
        assert!(!ChatEvent::content("s", "x").is_terminal());
    }
}
