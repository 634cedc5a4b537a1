//! Chat sessions: conversation log and retrieved-context slot.
//!
//! Sessions are keyed by a caller-supplied id and live for the process
//! lifetime. The turn log is an append-only ring buffer; the context slot
//! holds whatever the most recent retrieval produced (last write wins).
//! There is no transactional isolation inside a session: concurrent
//! requests against the same id interleave, and that is observable.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Documents,
    WebSearch,
}

/// The context chosen for the latest query in a session. Overwritten on
/// every retrieval; explicitly not a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub source: ContextSource,
    pub chunks: Vec<String>,
}

#[derive(Debug)]
struct ChatSession {
    turns: VecDeque<ConversationTurn>,
    context: Option<RetrievedContext>,
}

impl ChatSession {
    fn new() -> Self {
        Self {
            turns: VecDeque::new(),
            context: None,
        }
    }
}

/// Process-wide registry of chat sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, ChatSession>>>,
    capacity: usize,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn append_turn(&self, session_id: &str, role: Role, content: String) {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(ChatSession::new);

        if session.turns.len() >= self.capacity {
            session.turns.pop_front();
        }
        session.turns.push_back(ConversationTurn {
            role,
            content,
            timestamp: Utc::now(),
        });
    }

    pub fn set_context(&self, session_id: &str, context: RetrievedContext) {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        sessions
            .entry(session_id.to_string())
            .or_insert_with(ChatSession::new)
            .context = Some(context);
    }

    pub fn context(&self, session_id: &str) -> Option<RetrievedContext> {
        let sessions = self.sessions.lock().expect("session store poisoned");
        sessions.get(session_id).and_then(|s| s.context.clone())
    }

    pub fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        let sessions = self.sessions.lock().expect("session store poisoned");
        sessions
            .get(session_id)
            .map(|s| s.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clear a session's conversation and context. Returns whether the
    /// session existed.
    pub fn reset(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_append_in_order() {
        let store = SessionStore::new(10);
        store.append_turn("s1", Role::User, "hello".to_string());
        store.append_turn("s1", Role::Assistant, "hi".to_string());

        let history = store.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let store = SessionStore::new(3);
        for i in 0..5 {
            store.append_turn("s1", Role::User, format!("turn {}", i));
        }

        let history = store.history("s1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "turn 2");
        assert_eq!(history[2].content, "turn 4");
    }

    #[test]
    fn context_slot_is_last_write_wins() {
        let store = SessionStore::new(10);
        store.set_context(
            "s1",
            RetrievedContext {
                source: ContextSource::Documents,
                chunks: vec!["first".to_string()],
            },
        );
        store.set_context(
            "s1",
            RetrievedContext {
                source: ContextSource::WebSearch,
                chunks: vec!["second".to_string()],
            },
        );

        let context = store.context("s1").unwrap();
        assert_eq!(context.source, ContextSource::WebSearch);
        assert_eq!(context.chunks, vec!["second".to_string()]);
    }

    #[test]
    fn sessions_are_isolated_by_id() {
        let store = SessionStore::new(10);
        store.append_turn("a", Role::User, "for a".to_string());
        store.append_turn("b", Role::User, "for b".to_string());

        assert_eq!(store.history("a").len(), 1);
        assert_eq!(store.history("b").len(), 1);
        assert_eq!(store.history("a")[0].content, "for a");
    }

    #[test]
    fn reset_clears_history_and_context() {
        let store = SessionStore::new(10);
        store.append_turn("s1", Role::User, "hello".to_string());
        store.set_context(
            "s1",
            RetrievedContext {
                source: ContextSource::Documents,
                chunks: vec![],
            },
        );

        assert!(store.reset("s1"));
        assert!(store.history("s1").is_empty());
        assert!(store.context("s1").is_none());
        assert!(!store.reset("s1"));
    }
}
