use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::ids::SessionId;

#[derive(Debug, Clone)]
pub struct ProducerInfo {
    pub integration: String,
    pub started_at: Instant,
}

/// Viewer membership, keyed by an opaque per-connection handle supplied by
/// the transport layer.
#[derive(Debug, Clone)]
pub struct ViewerInfo {
    pub viewer_id: u64,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub producer: Option<ProducerInfo>,
    pub viewers: Vec<ViewerInfo>,
}

struct RegistryState {
    producers: HashMap<SessionId, ProducerInfo>,
    viewers: HashMap<SessionId, Vec<ViewerInfo>>,
}

/// Test-and-set producer registration plus viewer membership, both guarded
/// by one `std::sync::Mutex` with O(1) critical sections.
///
/// A plain `std::sync::Mutex` (not `tokio::sync::Mutex`) is deliberate: no
/// `.await` point ever occurs while the lock is held, mirroring the
/// teacher's preference for sync locks around short, non-blocking sections
/// (and the original Python's `threading.Lock()` around the same two maps).
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                producers: HashMap::new(),
                viewers: HashMap::new(),
            }),
        }
    }

    /// Test-and-set: returns `true` if this call won the registration race.
    pub fn register_producer(&self, session_id: &SessionId, integration: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.producers.contains_key(session_id) {
            return false;
        }
        state.producers.insert(
            session_id.clone(),
            ProducerInfo {
                integration: integration.to_string(),
                started_at: Instant::now(),
            },
        );
        true
    }

    pub fn deregister_producer(&self, session_id: &SessionId) {
        let mut state = self.state.lock().unwrap();
        state.producers.remove(session_id);
    }

    pub fn is_active(&self, session_id: &SessionId) -> bool {
        self.state.lock().unwrap().producers.contains_key(session_id)
    }

    pub fn attach_viewer(&self, session_id: &SessionId, viewer: ViewerInfo) {
        let mut state = self.state.lock().unwrap();
        state.viewers.entry(session_id.clone()).or_default().push(viewer);
    }

    pub fn detach_viewer(&self, session_id: &SessionId, viewer_id: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(viewers) = state.viewers.get_mut(session_id) {
            viewers.retain(|v| v.viewer_id != viewer_id);
            if viewers.is_empty() {
                state.viewers.remove(session_id);
            }
        }
    }

    pub fn snapshot(&self, session_id: &SessionId) -> SessionSnapshot {
        let state = self.state.lock().unwrap();
        SessionSnapshot {
            producer: state.producers.get(session_id).cloned(),
            viewers: state.viewers.get(session_id).cloned().unwrap_or_default(),
        }
    }

    pub fn all_sessions(&self) -> Vec<SessionId> {
        let state = self.state.lock().unwrap();
        state.producers.keys().cloned().collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
