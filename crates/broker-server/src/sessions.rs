use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use broker_core::cache::TranscriptCache;
use broker_core::ids::SessionId;

/// Tracks the shared cache for every session with an active producer, so the
/// viewer route can read the same history a producer task is concurrently
/// writing to. Entries are inserted when a producer session starts and
/// removed once its orchestrator task tears down.
#[derive(Default)]
pub struct SessionStore {
    caches: Mutex<HashMap<SessionId, Arc<Mutex<TranscriptCache>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: SessionId, cache: Arc<Mutex<TranscriptCache>>) {
        self.caches.lock().unwrap().insert(session_id, cache);
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<TranscriptCache>>> {
        self.caches.lock().unwrap().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &SessionId) {
        self.caches.lock().unwrap().remove(session_id);
    }
}
