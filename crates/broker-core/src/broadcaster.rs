use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::cache::TranscriptCache;
use crate::ids::SessionId;
use crate::record::TranscriptRecord;

/// A viewer's outbound channel plus a counter of consecutive failed sends.
/// Once the counter reaches the configured threshold the viewer is treated
/// as gone and dropped from the broadcaster on the next send.
struct ViewerChannel {
    sender: mpsc::Sender<TranscriptRecord>,
    consecutive_failures: u32,
}

struct SessionChannels {
    viewers: HashMap<u64, ViewerChannel>,
}

/// Fans out transcript records to every attached viewer of a session.
///
/// Each viewer gets its own bounded `mpsc` channel so one slow consumer
/// cannot stall delivery to the rest — a full channel is treated as
/// backpressure and the record is dropped for that viewer rather than
/// blocking the broadcast loop.
pub struct ViewerBroadcaster {
    sessions: Mutex<HashMap<SessionId, SessionChannels>>,
    channel_capacity: usize,
    failure_threshold: u32,
}

impl ViewerBroadcaster {
    pub fn new(channel_capacity: usize, failure_threshold: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            channel_capacity,
            failure_threshold,
        }
    }

    /// Registers a new viewer and returns the receiving half. Callers should
    /// first push cache history through the same channel (or send it
    /// directly to the receiver before handing it to the transport) so that
    /// replay and live records stay strictly ordered.
    pub fn attach(&self, session_id: &SessionId, viewer_id: u64) -> mpsc::Receiver<TranscriptRecord> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionChannels {
                viewers: HashMap::new(),
            })
            .viewers
            .insert(
                viewer_id,
                ViewerChannel {
                    sender: tx,
                    consecutive_failures: 0,
                },
            );
        rx
    }

    pub fn detach(&self, session_id: &SessionId, viewer_id: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(channels) = sessions.get_mut(session_id) {
            channels.viewers.remove(&viewer_id);
            if channels.viewers.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    /// Writes `record` into the session's cache, then sends it to every
    /// viewer attached to `session_id`. Caching here (rather than leaving it
    /// to each caller) guarantees every broadcast path — live finals,
    /// corrections, status updates — lands in cache history together, so a
    /// late-joining viewer's replay and the persisted artifact both see
    /// exactly what was ever broadcast.
    ///
    /// A viewer whose channel is full has the send dropped and its failure
    /// count bumped; crossing the threshold evicts the viewer outright so a
    /// dead connection's memory is eventually reclaimed even without an
    /// explicit `detach`.
    pub fn broadcast(&self, session_id: &SessionId, cache: &Mutex<TranscriptCache>, record: &TranscriptRecord) {
        cache.lock().unwrap().process(record.clone());

        let mut sessions = self.sessions.lock().unwrap();
        let Some(channels) = sessions.get_mut(session_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (viewer_id, channel) in channels.viewers.iter_mut() {
            match channel.sender.try_send(record.clone()) {
                Ok(()) => channel.consecutive_failures = 0,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    channel.consecutive_failures += 1;
                    tracing::warn!(
                        session_id = %session_id,
                        viewer_id,
                        consecutive_failures = channel.consecutive_failures,
                        "viewer_channel_full_dropping_record"
                    );
                    if channel.consecutive_failures >= self.failure_threshold {
                        dead.push(*viewer_id);
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*viewer_id);
                }
            }
        }

        for viewer_id in dead {
            channels.viewers.remove(&viewer_id);
            tracing::info!(session_id = %session_id, viewer_id, "viewer_evicted");
        }

        if channels.viewers.is_empty() {
            sessions.remove(session_id);
        }
    }

    pub fn viewer_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|c| c.viewers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MessageId;
    use crate::record::RecordType;

    fn sample_cache() -> Mutex<TranscriptCache> {
        Mutex::new(TranscriptCache::new(10))
    }

    fn sample_record() -> TranscriptRecord {
        TranscriptRecord {
            message_id: MessageId::finalized(1, "en"),
            transcription: "hi".into(),
            translation: String::new(),
            source_language: Some("en".into()),
            target_language: Some("en".into()),
            speaker: "Alice".into(),
            kind: RecordType::Final,
            isfinalize: true,
            vtt_timestamp: None,
            correction_status: None,
        }
    }

    #[tokio::test]
    async fn attached_viewer_receives_broadcast() {
        let broadcaster = ViewerBroadcaster::new(8, 3);
        let session = SessionId::new("s1");
        let mut rx = broadcaster.attach(&session, 1);

        broadcaster.broadcast(&session, &sample_cache(), &sample_record());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message_id, MessageId::finalized(1, "en"));
    }

    #[tokio::test]
    async fn broadcast_writes_the_record_into_the_session_cache() {
        let broadcaster = ViewerBroadcaster::new(8, 3);
        let session = SessionId::new("s1");
        let cache = sample_cache();

        broadcaster.broadcast(&session, &cache, &sample_record());

        let history = cache.lock().unwrap().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message_id, MessageId::finalized(1, "en"));
    }

    #[tokio::test]
    async fn detached_viewer_stops_receiving() {
        let broadcaster = ViewerBroadcaster::new(8, 3);
        let session = SessionId::new("s1");
        let _rx = broadcaster.attach(&session, 1);
        broadcaster.detach(&session, 1);
        assert_eq!(broadcaster.viewer_count(&session), 0);
    }

    #[tokio::test]
    async fn viewer_is_evicted_after_repeated_full_channel_failures() {
        let broadcaster = ViewerBroadcaster::new(1, 2);
        let session = SessionId::new("s1");
        let _rx = broadcaster.attach(&session, 1);
        let cache = sample_cache();

        // Fill the one-slot channel, then push past the failure threshold.
        broadcaster.broadcast(&session, &cache, &sample_record());
        broadcaster.broadcast(&session, &cache, &sample_record());
        broadcaster.broadcast(&session, &cache, &sample_record());

        assert_eq!(broadcaster.viewer_count(&session), 0);
    }
}
