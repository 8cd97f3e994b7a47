use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::Session;

type SessionSlot = Arc<AsyncMutex<Option<Session>>>;

/// In-memory conversation sessions keyed by user id.
///
/// Each user has their own async lock. Holding a [`SessionGuard`] serializes
/// every read-modify-write of that user's session, while different users
/// proceed independently.
pub struct SessionStore {
    slots: Mutex<HashMap<String, SessionSlot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, user_id: &str) -> SessionSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(user_id.to_string()).or_default())
    }

    /// Wait for exclusive access to `user_id`'s session. An expired session
    /// is dropped before the guard is handed out.
    pub async fn lock(&self, user_id: &str) -> SessionGuard {
        let mut guard = self.slot(user_id).lock_owned().await;
        let now = Utc::now().naive_utc();
        if guard.as_ref().is_some_and(|s| s.is_expired(now)) {
            tracing::debug!(user = user_id, "session expired");
            *guard = None;
        }
        SessionGuard {
            guard,
            ttl: self.ttl,
        }
    }

    /// The user's session, created at `START` if there is none.
    pub async fn get(&self, user_id: &str) -> Session {
        let mut guard = self.lock(user_id).await;
        guard.session().clone()
    }

    /// The user's session, without creating one.
    pub async fn peek(&self, user_id: &str) -> Option<Session> {
        let guard = self.lock(user_id).await;
        let session = guard.current().cloned();
        drop(guard);
        self.prune(user_id);
        session
    }

    pub async fn reset(&self, user_id: &str) {
        let mut guard = self.lock(user_id).await;
        guard.close();
        drop(guard);
        self.prune(user_id);
    }

    /// Drop the map entry for `user_id` if it is empty and nobody else is
    /// holding or waiting on it.
    pub fn prune(&self, user_id: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let removable = slots
            .get(user_id)
            .map(|slot| is_idle_and(slot, |s| s.is_none()))
            .unwrap_or(false);
        if removable {
            slots.remove(user_id);
        }
    }

    /// Remove sessions that expired at or before `now`. Sessions currently
    /// locked by a request are left alone.
    pub fn evict_expired(&self, now: NaiveDateTime) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, slot| {
            !is_idle_and(slot, |s| s.as_ref().map_or(true, |s| s.is_expired(now)))
        });
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Only called with the map lock held, so no new handle to `slot` can be
// taken while we inspect it.
fn is_idle_and(slot: &SessionSlot, pred: impl FnOnce(&Option<Session>) -> bool) -> bool {
    if Arc::strong_count(slot) > 1 {
        return false;
    }
    match slot.try_lock() {
        Ok(session) => pred(&session),
        Err(_) => false,
    }
}

/// Exclusive handle on one user's session.
pub struct SessionGuard {
    guard: OwnedMutexGuard<Option<Session>>,
    ttl: Duration,
}

impl SessionGuard {
    pub fn current(&self) -> Option<&Session> {
        self.guard.as_ref()
    }

    /// The session, created at `START` if absent.
    pub fn session(&mut self) -> &mut Session {
        let ttl = self.ttl;
        self.guard.get_or_insert_with(|| Session::new(ttl))
    }

    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    pub fn close(&mut self) {
        *self.guard = None;
    }

    pub fn touch(&mut self) {
        let ttl = self.ttl;
        if let Some(session) = self.guard.as_mut() {
            session.touch(Utc::now().naive_utc(), ttl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;

    fn store() -> SessionStore {
        SessionStore::new(Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_get_creates_start_session() {
        let store = store();
        let session = store.get("+911111111111").await;
        assert_eq!(session.step, Step::Start);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let store = store();
        {
            let mut guard = store.lock("+911111111111").await;
            guard.session().step = Step::MainMenu;
        }
        let first = store.get("+911111111111").await;
        let second = store.get("+911111111111").await;
        assert_eq!(first.step, Step::MainMenu);
        assert_eq!(second.step, Step::MainMenu);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_peek_does_not_create() {
        let store = store();
        assert!(store.peek("+911111111111").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reset_deletes_session() {
        let store = store();
        {
            let mut guard = store.lock("+911111111111").await;
            guard.session().step = Step::VisitType;
        }
        store.reset("+911111111111").await;
        assert!(store.peek("+911111111111").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reset_missing_is_noop() {
        let store = store();
        store.reset("+911111111111").await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_restarts() {
        let store = SessionStore::new(Duration::zero());
        {
            let mut guard = store.lock("+911111111111").await;
            guard.session().step = Step::MainMenu;
        }
        let session = store.get("+911111111111").await;
        assert_eq!(session.step, Step::Start);
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = store();
        store.get("+911111111111").await;
        store.get("+912222222222").await;
        assert_eq!(store.evict_expired(Utc::now().naive_utc()), 0);

        let later = Utc::now().naive_utc() + Duration::minutes(31);
        assert_eq!(store.evict_expired(later), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_evict_skips_locked_session() {
        let store = store();
        let _guard = store.lock("+911111111111").await;
        let later = Utc::now().naive_utc() + Duration::minutes(31);
        assert_eq!(store.evict_expired(later), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_serializes_same_user() {
        let store = Arc::new(store());
        let mut guard = store.lock("+911111111111").await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut guard = store.lock("+911111111111").await;
                guard.session().step.clone()
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        guard.session().step = Step::VisitType;
        drop(guard);

        assert_eq!(waiter.await.unwrap(), Step::VisitType);
    }
}
