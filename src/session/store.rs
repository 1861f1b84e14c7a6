//! Keyed session storage

use crate::session::turn::{SessionSummary, Turn};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for per-session turn history.
///
/// Sessions are created implicitly by the first append and are never
/// destroyed here; expiry belongs to whatever backs the store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a turn to the end of a session
    async fn append(&self, session_id: &str, turn: Turn);

    /// Read the ordered turns of a session; unknown sessions are empty
    async fn read(&self, session_id: &str) -> Vec<Turn>;

    /// Summarize a session, `None` if it has never been written
    async fn summary(&self, session_id: &str) -> Option<SessionSummary>;

    /// Number of known sessions
    async fn session_count(&self) -> usize;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(turn);
        debug!(session_id, turns = turns.len(), "Appended turn");
    }

    async fn read(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|turns| SessionSummary::from_turns(session_id, turns))
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnRole;
    use crate::triage::AgentLabel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unknown_session_reads_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.read("nope").await.is_empty());
        assert!(store.summary("nope").await.is_none());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_read_after_append_returns_turn_last() {
        let store = InMemorySessionStore::new();
        store.append("s1", Turn::user("first")).await;
        store
            .append("s1", Turn::assistant("reply", AgentLabel::Escalation, true))
            .await;

        let turns = store.read("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "first");
        let last = turns.last().unwrap();
        assert_eq!(last.role, TurnRole::Assistant);
        assert_eq!(last.content, "reply");
        assert_eq!(last.agent, Some(AgentLabel::Escalation));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemorySessionStore::new();
        store.append("a", Turn::user("for a")).await;
        store.append("b", Turn::user("for b")).await;

        assert_eq!(store.read("a").await.len(), 1);
        assert_eq!(store.read("b").await[0].content, "for b");
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_distinct_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("session-{i}");
                for n in 0..5 {
                    store.append(&id, Turn::user(format!("msg {n}"))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.session_count().await, 16);
        let turns = store.read("session-7").await;
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn test_summary_reflects_store_contents() {
        let store = InMemorySessionStore::new();
        store.append("s", Turn::user("q")).await;
        store
            .append("s", Turn::assistant("partial", AgentLabel::FoundrySupport, false))
            .await;

        let summary = store.summary("s").await.unwrap();
        assert_eq!(summary.total_turns, 2);
        assert_eq!(summary.incomplete_turns, 1);
        assert_eq!(summary.agents_used, vec![AgentLabel::FoundrySupport]);
    }
}
