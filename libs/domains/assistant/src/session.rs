//! In-memory session store with an explicit lifecycle.
//!
//! Sessions live until reset or process shutdown; there is no implicit
//! eviction. A later message to a reset session id recreates it with
//! zeroed counters.

use chrono::{DateTime, Utc};
use observability::AgentMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{SessionView, Turn};
use crate::usage::UsageTracker;

/// State for one conversation session
pub struct SessionState {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    history: RwLock<Vec<Turn>>,
    pub usage: UsageTracker,
    turn_active: AtomicBool,
    cancel_requested: AtomicBool,
}

impl SessionState {
    fn new(session_id: Uuid, model_id: &str) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            history: RwLock::new(Vec::new()),
            usage: UsageTracker::new(model_id),
            turn_active: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Try to claim the session for a new turn. Returns false when a
    /// turn is already in flight; turns never interleave.
    pub fn begin_turn(&self) -> bool {
        self.turn_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_turn(&self) {
        self.turn_active.store(false, Ordering::SeqCst);
    }

    pub fn turn_active(&self) -> bool {
        self.turn_active.load(Ordering::SeqCst)
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
    }

    /// Append a turn; turns are immutable once appended
    pub async fn append_turn(&self, turn: Turn) {
        self.history.write().await.push(turn);
    }

    pub async fn history_snapshot(&self) -> Vec<Turn> {
        self.history.read().await.clone()
    }

    pub async fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id,
            history: self.history_snapshot().await,
            usage: self.usage.snapshot(),
            created_at: self.created_at,
        }
    }
}

/// Session store keyed by session id
pub struct SessionStore {
    model_id: String,
    sessions: RwLock<HashMap<Uuid, Arc<SessionState>>>,
}

impl SessionStore {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, session_id: Uuid) -> Arc<SessionState> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&session_id) {
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionState::new(session_id, &self.model_id)));
        let session = Arc::clone(session);
        AgentMetrics::set_active_sessions(sessions.len());
        session
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Arc<SessionState>> {
        self.sessions.read().await.get(&session_id).map(Arc::clone)
    }

    /// Destroy the session. Returns the removed state when it existed.
    pub async fn remove(&self, session_id: Uuid) -> Option<Arc<SessionState>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&session_id);
        AgentMetrics::set_active_sessions(sessions.len());
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new("model");
        let id = Uuid::new_v4();

        let first = store.get_or_create(id).await;
        first.append_turn(Turn::user("hello")).await;

        let second = store.get_or_create(id).await;
        assert_eq!(second.history_snapshot().await.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_then_recreate_zeroes_counters() {
        let store = SessionStore::new("model");
        let id = Uuid::new_v4();

        let session = store.get_or_create(id).await;
        session.usage.record(100, 50, 1);
        assert_eq!(session.usage.snapshot().request_count, 1);

        store.remove(id).await.unwrap();
        assert!(store.get(id).await.is_none());

        let fresh = store.get_or_create(id).await;
        assert_eq!(fresh.usage.snapshot().request_count, 0);
        assert!(fresh.history_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_turn_guard_excludes_concurrent_turns() {
        let store = SessionStore::new("model");
        let session = store.get_or_create(Uuid::new_v4()).await;

        assert!(session.begin_turn());
        assert!(!session.begin_turn());
        assert!(session.turn_active());

        session.end_turn();
        assert!(session.begin_turn());
    }

    #[tokio::test]
    async fn test_cancel_flag_lifecycle() {
        let store = SessionStore::new("model");
        let session = store.get_or_create(Uuid::new_v4()).await;

        assert!(!session.cancel_requested());
        session.request_cancel();
        assert!(session.cancel_requested());
        session.clear_cancel();
        assert!(!session.cancel_requested());
    }

    #[tokio::test]
    async fn test_history_preserves_order() {
        let store = SessionStore::new("model");
        let session = store.get_or_create(Uuid::new_v4()).await;

        session.append_turn(Turn::user("q")).await;
        session.append_turn(Turn::assistant("a", None)).await;

        let history = session.history_snapshot().await;
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }
}
