//! Conversation turns and per-session summaries

use crate::llm::provider::Message;
use crate::triage::AgentLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message exchange unit within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Agent that produced an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentLabel>,
    /// False when the assistant's stream was cut off before it finished
    #[serde(default = "default_complete")]
    pub complete: bool,
}

fn default_complete() -> bool {
    true
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
            complete: true,
        }
    }

    pub fn assistant(content: impl Into<String>, agent: AgentLabel, complete: bool) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            agent: Some(agent),
            complete,
        }
    }

    /// Convert to a chat message for upstream context
    pub fn to_message(&self) -> Message {
        match self.role {
            TurnRole::User => Message::user(self.content.clone()),
            TurnRole::Assistant => Message::assistant(self.content.clone()),
        }
    }
}

/// Aggregate view of one session's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_turns: usize,
    pub turns_by_role: BTreeMap<TurnRole, usize>,
    pub agents_used: Vec<AgentLabel>,
    pub incomplete_turns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionSummary {
    /// Summarize an ordered turn list (pure function)
    pub fn from_turns(session_id: &str, turns: &[Turn]) -> Self {
        let mut turns_by_role = BTreeMap::new();
        let mut agents_used: Vec<AgentLabel> = Vec::new();

        for turn in turns {
            *turns_by_role.entry(turn.role).or_insert(0) += 1;
            if let Some(agent) = turn.agent {
                if !agents_used.contains(&agent) {
                    agents_used.push(agent);
                }
            }
        }

        Self {
            session_id: session_id.to_string(),
            total_turns: turns.len(),
            turns_by_role,
            agents_used,
            incomplete_turns: turns.iter().filter(|t| !t.complete).count(),
            last_activity: turns.last().map(|t| t.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MessageRole;

    #[test]
    fn test_turn_serialization_shape() {
        let turn = Turn::assistant("hello", AgentLabel::Escalation, false);
        let json = serde_json::to_value(&turn).unwrap();

        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["agent"], "escalation");
        assert_eq!(json["complete"], false);
        assert!(json["timestamp"].is_string());

        let user = serde_json::to_value(Turn::user("hi")).unwrap();
        assert!(user.get("agent").is_none());
    }

    #[test]
    fn test_to_message_preserves_role() {
        assert_eq!(Turn::user("q").to_message().role, MessageRole::User);
        assert_eq!(
            Turn::assistant("a", AgentLabel::TechnicalSupport, true)
                .to_message()
                .role,
            MessageRole::Assistant
        );
    }

    #[test]
    fn test_summary_counts() {
        let turns = vec![
            Turn::user("q1"),
            Turn::assistant("a1", AgentLabel::TechnicalSupport, true),
            Turn::user("q2"),
            Turn::assistant("a2", AgentLabel::Escalation, false),
            Turn::user("q3"),
            Turn::assistant("a3", AgentLabel::TechnicalSupport, true),
        ];

        let summary = SessionSummary::from_turns("s1", &turns);
        assert_eq!(summary.total_turns, 6);
        assert_eq!(summary.turns_by_role[&TurnRole::User], 3);
        assert_eq!(summary.turns_by_role[&TurnRole::Assistant], 3);
        assert_eq!(
            summary.agents_used,
            vec![AgentLabel::TechnicalSupport, AgentLabel::Escalation]
        );
        assert_eq!(summary.incomplete_turns, 1);
        assert!(summary.last_activity.is_some());
    }
}
