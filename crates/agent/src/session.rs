//! In-memory per-session conversation store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use proto::SessionId;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conversation::Conversation;

/// Sessions untouched for this long are dropped on the next sweep.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Shared handle to one session's conversation. Holding the lock serializes
/// turns of that session.
pub type SessionSlot = Arc<Mutex<Conversation>>;

struct SessionEntry {
    slot: SessionSlot,
    last_used: Instant,
}

impl SessionEntry {
    /// A session is busy while anyone besides the store holds its slot.
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.slot) > 1
    }
}

/// Conversations keyed by session id, created lazily with the system prompt.
///
/// Idle sessions are swept whenever a new one is created, and the store
/// evicts the least recently used idle session once it reaches capacity.
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    system_prompt: String,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_limits(system_prompt, DEFAULT_SESSION_IDLE_TTL, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(
        system_prompt: impl Into<String>,
        idle_ttl: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            system_prompt: system_prompt.into(),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Returns the session's slot, creating a fresh conversation on first use.
    pub fn slot(&self, session_id: &SessionId) -> SessionSlot {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_used = Instant::now();
            return Arc::clone(&entry.slot);
        }

        self.evict_idle();
        if self.sessions.len() >= self.max_sessions {
            self.evict_least_recent();
        }

        let entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(session = %session_id, "Creating session");
                SessionEntry {
                    slot: Arc::new(Mutex::new(Conversation::new(self.system_prompt.as_str()))),
                    last_used: Instant::now(),
                }
            });
        Arc::clone(&entry.slot)
    }

    /// Drops every session idle for longer than the TTL and not in use.
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| {
            entry.is_busy() || now.duration_since(entry.last_used) < self.idle_ttl
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .sessions
            .iter()
            .filter(|entry| !entry.is_busy())
            .min_by_key(|entry| entry.last_used)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(session_id) => {
                debug!(session = %session_id, "Session store full, evicting oldest");
                self.sessions.remove(&session_id);
            }
            None => warn!(
                capacity = self.max_sessions,
                "Session store full and every session is busy"
            ),
        }
    }

    /// Drops a session. Returns `true` when it existed.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[cfg(test)]
mod tests {
    use proto::Message;

    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new("prompt");
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        store
            .slot(&a)
            .lock()
            .await
            .append(Message::user("only in a"))
            .expect("append");

        assert_eq!(store.slot(&a).lock().await.len(), 2);
        assert_eq!(store.slot(&b).lock().await.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn slot_is_shared_for_same_session() {
        let store = SessionStore::new("prompt");
        let id = SessionId::from("same");
        let first = store.slot(&id);
        let second = store.slot(&id);
        assert!(Arc::ptr_eq(&first, &second));

        let guard = first.lock().await;
        assert!(second.try_lock().is_err());
        drop(guard);
    }

    #[test]
    fn new_sessions_start_with_system_prompt() {
        let store = SessionStore::new("Ты финансовый помощник.");
        let slot = store.slot(&SessionId::from("s"));
        let conv = slot.try_lock().expect("unlocked");
        assert_eq!(conv.snapshot()[0].content, "Ты финансовый помощник.");
        assert_eq!(store.system_prompt(), "Ты финансовый помощник.");
    }

    #[test]
    fn idle_sessions_are_swept_when_a_new_one_is_created() {
        let store = SessionStore::with_limits("p", Duration::ZERO, 100);
        let idle = SessionId::from("idle");
        let held = SessionId::from("held");

        store.slot(&idle);
        let _in_use = store.slot(&held);
        store.slot(&SessionId::from("fresh"));

        assert!(!store.contains(&idle));
        assert!(store.contains(&held), "a session with a live handle is never evicted");
        assert!(store.contains(&SessionId::from("fresh")));
    }

    #[test]
    fn recent_sessions_survive_the_sweep() {
        let store = SessionStore::with_limits("p", Duration::from_secs(3600), 100);
        for i in 0..5 {
            store.slot(&SessionId::from(format!("s{i}")));
        }
        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn full_store_evicts_least_recently_used() {
        let store = SessionStore::with_limits("p", Duration::from_secs(3600), 2);
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.slot(&a);
        std::thread::sleep(Duration::from_millis(5));
        store.slot(&b);
        std::thread::sleep(Duration::from_millis(5));
        // Touching `a` makes `b` the oldest.
        store.slot(&a);

        store.slot(&SessionId::from("c"));

        assert_eq!(store.len(), 2);
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
    }

    #[test]
    fn remove_forgets_session() {
        let store = SessionStore::new("p");
        let id = SessionId::from("gone");
        store.slot(&id);
        assert!(store.contains(&id));
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }
}
