//! Per-browser session registry

use crate::models::{FlowPhase, SessionState, StatusResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Cookie carrying the session id
pub const SESSION_COOKIE: &str = "session_id";

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One session's state plus what other requests may read while it is busy.
///
/// `state` is held for the whole of a mutating request, so uploads, resets
/// and processing on the same session run one after another.
pub struct SessionSlot {
    pub state: tokio::sync::Mutex<SessionState>,
    published: Mutex<StatusResponse>,
    last_seen: Mutex<Instant>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(SessionState::default()),
            published: Mutex::new(StatusResponse::default()),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Makes `state` visible to `/status` readers
    pub fn publish(&self, state: &SessionState) {
        *lock(&self.published) = state.status();
    }

    /// Marks the session as waiting on the vision model
    pub fn publish_processing(&self, state: &SessionState) {
        let mut status = state.status();
        status.phase = FlowPhase::Processing;
        *lock(&self.published) = status;
    }

    pub fn status(&self) -> StatusResponse {
        lock(&self.published).clone()
    }

    fn touch(&self) {
        *lock(&self.last_seen) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        lock(&self.last_seen).elapsed()
    }
}

/// Session slots keyed by session id.
///
/// The map lock is only held to find, insert or remove a slot.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl SessionRegistry {
    /// The session's slot, created on first use; refreshes its idle timer
    pub fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        let mut sessions = lock(&self.sessions);
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::new()));
        // Touched under the map lock so a sweep never takes a slot just handed out
        slot.touch();
        slot.clone()
    }

    /// Copy of the session's state; waits for any request in flight
    pub async fn snapshot(&self, session_id: &str) -> SessionState {
        self.slot(session_id).state.lock().await.clone()
    }

    /// Removes sessions idle for at least `ttl` and hands back their states.
    ///
    /// Sessions with a request in flight are skipped. Callers must clean up
    /// the files the returned states still track.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<SessionState> {
        let mut sessions = lock(&self.sessions);
        let mut evicted = Vec::new();
        sessions.retain(|_, slot| {
            if slot.idle_for() < ttl {
                return true;
            }
            match slot.state.try_lock() {
                Ok(state) => {
                    evicted.push(state.clone());
                    false
                }
                Err(_) => true,
            }
        });
        evicted
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }
}
