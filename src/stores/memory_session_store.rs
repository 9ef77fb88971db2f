use crate::constants::agent::{MAX_HISTORY_MESSAGES, SESSION_PREFIX};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: String,
    messages: Vec<Value>,
    updated_at_ms: i64,
}

/// A conversation handed to the agent: its id plus prior messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub session_id: String,
    pub history: Vec<Value>,
}

fn role(message: &Value) -> Option<&str> {
    message.get("role").and_then(Value::as_str)
}

/// Keeps the leading system message plus the most recent messages, at most
/// `limit` in total. The kept tail never opens on a tool result whose
/// assistant call was dropped.
fn trim_history(mut messages: Vec<Value>, limit: usize) -> Vec<Value> {
    if messages.len() <= limit {
        return messages;
    }
    let system = messages.first().is_some_and(|first| role(first) == Some("system"));
    let reserved = usize::from(system);
    let keep = limit.saturating_sub(reserved).max(1);
    let mut start = messages.len().saturating_sub(keep).max(reserved);
    while start < messages.len() && role(&messages[start]) == Some("tool") {
        start += 1;
    }
    let tail = messages.split_off(start);
    messages.truncate(reserved);
    messages.extend(tail);
    messages
}

/// In-memory chat history keyed by session id, bound to the user that
/// opened it. Idle sessions expire after `ttl_ms`; the oldest are evicted
/// past `max_sessions`. Each history is trimmed to `history_limit` messages.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, SessionRecord>>,
    max_sessions: usize,
    ttl_ms: u64,
    history_limit: usize,
}

impl MemorySessionStore {
    pub fn new(max_sessions: usize, ttl_ms: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            max_sessions: max_sessions.max(1),
            ttl_ms,
            history_limit: MAX_HISTORY_MESSAGES,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(2);
        self
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn new_session_id() -> String {
        format!("{}{}", SESSION_PREFIX, uuid::Uuid::new_v4())
    }

    /// Resumes `session_id` when it belongs to `user_id`, otherwise starts
    /// an empty conversation. Another user's id is never reused.
    pub fn open(&self, user_id: &str, session_id: Option<&str>) -> Conversation {
        self.purge_expired();
        let requested = session_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(id) = requested {
            match self.sessions.get(id) {
                Some(record) if record.user_id == user_id => {
                    return Conversation {
                        session_id: id.to_string(),
                        history: record.messages.clone(),
                    };
                }
                Some(_) => {}
                None => {
                    return Conversation {
                        session_id: id.to_string(),
                        history: Vec::new(),
                    };
                }
            }
        }
        Conversation {
            session_id: Self::new_session_id(),
            history: Vec::new(),
        }
    }

    pub fn save(&self, session_id: &str, user_id: &str, messages: Vec<Value>) {
        self.sessions.insert(
            session_id.to_string(),
            SessionRecord {
                user_id: user_id.to_string(),
                messages: trim_history(messages, self.history_limit),
                updated_at_ms: Self::now_ms(),
            },
        );
        self.evict_overflow();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge_expired(&self) {
        let cutoff = Self::now_ms() - self.ttl_ms as i64;
        self.sessions.retain(|_, record| record.updated_at_ms >= cutoff);
    }

    fn evict_overflow(&self) {
        while self.sessions.len() > self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|entry| entry.value().updated_at_ms)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.sessions.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sessions_resume_only_for_their_owner() {
        let store = MemorySessionStore::new(10, 60_000);
        let first = store.open("alice", None);
        assert!(first.session_id.starts_with(SESSION_PREFIX));
        store.save(&first.session_id, "alice", vec![json!({"role": "user", "content": "hi"})]);

        let resumed = store.open("alice", Some(&first.session_id));
        assert_eq!(resumed.session_id, first.session_id);
        assert_eq!(resumed.history.len(), 1);

        let other = store.open("bob", Some(&first.session_id));
        assert_ne!(other.session_id, first.session_id);
        assert!(other.history.is_empty());
    }

    #[test]
    fn unknown_ids_start_fresh_under_that_id() {
        let store = MemorySessionStore::new(10, 60_000);
        let convo = store.open("alice", Some("session_custom"));
        assert_eq!(convo.session_id, "session_custom");
        assert!(convo.history.is_empty());
    }

    #[test]
    fn long_histories_keep_system_prompt_and_recent_turns() {
        let store = MemorySessionStore::new(10, 60_000).with_history_limit(6);
        let mut messages = vec![json!({"role": "system", "content": "prompt"})];
        for turn in 0..20 {
            messages.push(json!({"role": "user", "content": format!("q{}", turn)}));
            messages.push(json!({"role": "assistant", "content": format!("a{}", turn)}));
        }
        store.save("s", "alice", messages);

        let history = store.open("alice", Some("s")).history;
        assert_eq!(history.len(), 6);
        assert_eq!(history[0]["role"], "system");
        assert_eq!(history[1]["content"], "a17");
        assert_eq!(history[5]["content"], "a19");
    }

    #[test]
    fn trimmed_history_never_opens_on_orphaned_tool_result() {
        let messages = vec![
            json!({"role": "system", "content": "prompt"}),
            json!({"role": "user", "content": "q0"}),
            json!({"role": "assistant", "content": null, "tool_calls": [{"id": "c1"}]}),
            json!({"role": "tool", "tool_call_id": "c1", "content": "{}"}),
            json!({"role": "tool", "tool_call_id": "c2", "content": "{}"}),
            json!({"role": "assistant", "content": "done"}),
            json!({"role": "user", "content": "q1"}),
        ];
        let trimmed = trim_history(messages, 5);
        let roles: Vec<&str> = trimmed.iter().filter_map(role).collect();
        assert_eq!(roles, vec!["system", "assistant", "user"]);

        let short = vec![json!({"role": "user", "content": "only"})];
        assert_eq!(trim_history(short.clone(), 5), short);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let store = MemorySessionStore::new(2, 60_000);
        store.save("a", "u", vec![]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.save("b", "u", vec![]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.save("c", "u", vec![]);
        assert_eq!(store.len(), 2);
        assert!(store.open("u", Some("a")).history.is_empty());
        assert!(store.sessions.contains_key("b"));
        assert!(store.sessions.contains_key("c"));
    }
}
