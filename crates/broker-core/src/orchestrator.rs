use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::artifact::ArtifactWriter;
use crate::broadcaster::ViewerBroadcaster;
use crate::cache::TranscriptCache;
use crate::config::BrokerConfig;
use crate::correction::{CorrectionEngine, CorrectionModel, TranslationModel};
use crate::error::{SttConnectError, SttTransportError};
use crate::ids::{MessageId, SessionId};
use crate::record::{RecordType, TranscriptRecord};
use crate::registry::ConnectionRegistry;

/// A single transcription or translation result pushed up from the upstream
/// speech-to-text service. Mirrors the shape of a reassembled Soniox token
/// batch, but is provider-agnostic so `broker-core` never depends on
/// `soniox-client`.
#[derive(Debug, Clone)]
pub struct SttResult {
    pub transcription: String,
    pub translation: String,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttErrorKind {
    Connection,
    Fatal,
}

#[derive(Debug, Clone)]
pub enum SttEvent {
    Result(SttResult),
    Error(SttErrorKind, String),
    Closed,
}

/// One live connection to the upstream speech-to-text service. The
/// orchestrator drives it from a single task: push audio in with
/// `send_chunk`, drain `next_event` in a loop, and call `finalize_stream`
/// once producer audio has stopped.
#[async_trait::async_trait]
pub trait SttClient: Send {
    async fn send_chunk(&mut self, audio: &[u8]) -> Result<(), SttTransportError>;
    async fn finalize_stream(&mut self);
    /// Resolves to `SttEvent::Closed` once no further events will ever be
    /// produced; the orchestrator treats that as a terminal signal.
    async fn next_event(&mut self) -> SttEvent;
}

/// Produces connected [`SttClient`]s on demand, so the orchestrator can
/// transparently reconnect without knowing anything about the transport.
#[async_trait::async_trait]
pub trait SttConnector: Send + Sync {
    type Client: SttClient;

    async fn connect(&self) -> Result<Self::Client, SttConnectError>;
}

/// One inbound audio chunk from a producer connection, tagged with the
/// speaker name carried in that frame's envelope.
pub struct ProducerFrame {
    pub speaker: String,
    pub audio: Vec<u8>,
}

pub struct SessionHandles<Conn, C, T> {
    pub session_id: SessionId,
    pub integration: String,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<ViewerBroadcaster>,
    pub artifact_writer: Arc<ArtifactWriter>,
    pub connector: Arc<Conn>,
    pub config: Arc<BrokerConfig>,
    pub correction_engine: Option<Arc<CorrectionEngine<C, T>>>,
    /// Shared with the viewer-attach path so a late-joining viewer can read
    /// the same history a live producer session is still writing to.
    pub cache: Arc<Mutex<TranscriptCache>>,
}

/// Drives one producer connection end to end: connects to the
/// upstream STT service, reassembles its per-utterance partial/final
/// stream, feeds finals into the cache and correction engine, broadcasts
/// every record to attached viewers, reconnects on transient upstream
/// failures, and performs the teardown sequence (flush, final correction
/// pass, artifact write, `session_end` broadcast, deregistration) once the
/// producer audio stream ends.
///
/// Consumes `frames` until the channel closes (the producer connection
/// dropped) or a fatal upstream error is observed.
pub async fn run_session<Conn, C, T>(
    handles: SessionHandles<Conn, C, T>,
    mut frames: mpsc::Receiver<ProducerFrame>,
) where
    Conn: SttConnector,
    C: CorrectionModel + 'static,
    T: TranslationModel + 'static,
{
    let SessionHandles {
        session_id,
        integration,
        registry,
        broadcaster,
        artifact_writer,
        connector,
        config,
        correction_engine,
        cache,
    } = handles;

    let mut clock = crate::clock::TimestampClock::new();

    let mut client = match connector.connect().await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(session_id = %session_id, error = %err, "initial_stt_connect_failed");
            teardown(
                &session_id,
                &integration,
                &registry,
                &broadcaster,
                &artifact_writer,
                correction_engine.as_ref(),
                &cache,
            )
            .await;
            return;
        }
    };

    let mut reconnect_attempt: usize = 0;
    let mut current_message_id: Option<MessageId> = None;
    let mut is_new_utterance = true;
    let mut current_speaker = "Unknown".to_string();
    let mut ordinal: u64 = 0;

    'outer: loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    tracing::info!(session_id = %session_id, "producer_stream_closed");
                    break 'outer;
                };
                current_speaker = frame.speaker;
                if let Err(err) = client.send_chunk(&frame.audio).await {
                    tracing::warn!(session_id = %session_id, error = %err, "send_chunk_failed_will_reconnect");
                    match reconnect(&*connector, &config, &mut reconnect_attempt).await {
                        Some(new_client) => client = new_client,
                        None => break 'outer,
                    }
                }
            }
            event = client.next_event() => {
                match event {
                    SttEvent::Result(result) => {
                        handle_result(
                            result,
                            &session_id,
                            &current_speaker,
                            &mut current_message_id,
                            &mut is_new_utterance,
                            &mut ordinal,
                            &mut clock,
                            &cache,
                            &broadcaster,
                            &config,
                            correction_engine.as_ref(),
                        );
                    }
                    SttEvent::Error(SttErrorKind::Fatal, message) => {
                        tracing::error!(session_id = %session_id, %message, "fatal_stt_error_closing_session");
                        break 'outer;
                    }
                    SttEvent::Error(SttErrorKind::Connection, message) => {
                        tracing::warn!(session_id = %session_id, %message, "restartable_stt_error");
                        match reconnect(&*connector, &config, &mut reconnect_attempt).await {
                            Some(new_client) => client = new_client,
                            None => break 'outer,
                        }
                    }
                    SttEvent::Closed => {
                        tracing::warn!(session_id = %session_id, "stt_connection_closed_unexpectedly");
                        match reconnect(&*connector, &config, &mut reconnect_attempt).await {
                            Some(new_client) => client = new_client,
                            None => break 'outer,
                        }
                    }
                }
            }
        }
    }

    client.finalize_stream().await;
    let deadline = tokio::time::Instant::now() + config.stt_finalize_timeout;
    loop {
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(session_id = %session_id, "timeout_waiting_for_stt_close");
            break;
        }
        match tokio::time::timeout_at(deadline, client.next_event()).await {
            Ok(SttEvent::Closed) | Err(_) => break,
            Ok(SttEvent::Result(result)) => {
                handle_result(
                    result,
                    &session_id,
                    &current_speaker,
                    &mut current_message_id,
                    &mut is_new_utterance,
                    &mut ordinal,
                    &mut clock,
                    &cache,
                    &broadcaster,
                    &config,
                    correction_engine.as_ref(),
                );
            }
            Ok(SttEvent::Error(kind, message)) => {
                tracing::warn!(session_id = %session_id, ?kind, %message, "stt_error_during_finalize_drain");
            }
        }
    }

    teardown(
        &session_id,
        &integration,
        &registry,
        &broadcaster,
        &artifact_writer,
        correction_engine.as_ref(),
        &cache,
    )
    .await;
}

async fn reconnect<Conn: SttConnector>(
    connector: &Conn,
    config: &BrokerConfig,
    attempt: &mut usize,
) -> Option<Conn::Client> {
    let delay = config.backoff_for_attempt(*attempt);
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }
    match connector.connect().await {
        Ok(client) => {
            *attempt = 0;
            Some(client)
        }
        Err(err) => {
            tracing::error!(error = %err, attempt = *attempt, "stt_reconnect_failed");
            *attempt += 1;
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_result<C, T>(
    result: SttResult,
    session_id: &SessionId,
    current_speaker: &str,
    current_message_id: &mut Option<MessageId>,
    is_new_utterance: &mut bool,
    ordinal: &mut u64,
    clock: &mut crate::clock::TimestampClock,
    cache: &Arc<Mutex<TranscriptCache>>,
    broadcaster: &Arc<ViewerBroadcaster>,
    config: &BrokerConfig,
    correction_engine: Option<&Arc<CorrectionEngine<C, T>>>,
) where
    C: CorrectionModel + 'static,
    T: TranslationModel + 'static,
{
    if *is_new_utterance && !result.is_final {
        *current_message_id = Some(MessageId::transient());
        *is_new_utterance = false;
    }

    let Some(message_id) = current_message_id.clone() else {
        if result.is_final {
            *is_new_utterance = true;
        }
        return;
    };

    let has_text = !result.transcription.trim().is_empty() || !result.translation.trim().is_empty();

    if has_text {
        if !result.is_final {
            clock.mark_start(&message_id);
        }

        let (record_message_id, vtt_timestamp, kind) = if result.is_final {
            *ordinal += 1;
            let lang = result
                .target_language
                .clone()
                .unwrap_or_else(|| config.default_target_language.clone());
            let final_id = MessageId::finalized(*ordinal, &lang);
            (final_id, Some(clock.complete(&message_id)), RecordType::Final)
        } else {
            (message_id.clone(), None, RecordType::Partial)
        };

        let record = TranscriptRecord {
            message_id: record_message_id,
            transcription: result.transcription.clone(),
            translation: result.translation.clone(),
            source_language: result.source_language.clone(),
            target_language: result.target_language.clone(),
            speaker: current_speaker.to_string(),
            kind,
            isfinalize: result.is_final,
            vtt_timestamp,
            correction_status: None,
        };

        broadcaster.broadcast(session_id, cache, &record);

        if result.is_final {
            if let Some(engine) = correction_engine {
                if config.correction_eligible(result.source_language.as_deref())
                    && !result.transcription.trim().is_empty()
                {
                    engine.process_final(record);
                }
            }
        }
    }

    if result.is_final {
        *is_new_utterance = true;
        *current_message_id = None;
    }
}

async fn teardown<C, T>(
    session_id: &SessionId,
    integration: &str,
    registry: &Arc<ConnectionRegistry>,
    broadcaster: &Arc<ViewerBroadcaster>,
    artifact_writer: &Arc<ArtifactWriter>,
    correction_engine: Option<&Arc<CorrectionEngine<C, T>>>,
    cache: &Arc<Mutex<TranscriptCache>>,
) where
    C: CorrectionModel + 'static,
    T: TranslationModel + 'static,
{
    if let Some(engine) = correction_engine {
        tracing::info!(session_id = %session_id, "running_final_correction_check");
        engine.finalize_session().await;
    }

    let history = cache.lock().unwrap().history();
    if let Err(err) = artifact_writer.write_vtt(integration, session_id, &history).await {
        tracing::error!(session_id = %session_id, error = %err, "artifact_write_failed");
    }
    cache.lock().unwrap().clear();

    tracing::info!(session_id = %session_id, "broadcasting_session_end");
    broadcaster.broadcast(session_id, cache, &TranscriptRecord::session_end());

    registry.deregister_producer(session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::CorrectionOutcome;
    use std::sync::Mutex as StdMutex;

    struct ScriptedClient {
        events: StdMutex<std::collections::VecDeque<SttEvent>>,
        sent_chunks: Arc<StdMutex<Vec<Vec<u8>>>>,
        finalized: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl SttClient for ScriptedClient {
        async fn send_chunk(&mut self, audio: &[u8]) -> Result<(), SttTransportError> {
            self.sent_chunks.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        async fn finalize_stream(&mut self) {
            self.finalized.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        async fn next_event(&mut self) -> SttEvent {
            loop {
                let next = self.events.lock().unwrap().pop_front();
                match next {
                    Some(event) => return event,
                    None => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }
        }
    }

    struct ScriptedConnector {
        scripts: StdMutex<std::collections::VecDeque<Vec<SttEvent>>>,
        sent_chunks: Arc<StdMutex<Vec<Vec<u8>>>>,
        finalized: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl SttConnector for ScriptedConnector {
        type Client = ScriptedClient;

        async fn connect(&self) -> Result<ScriptedClient, SttConnectError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(ScriptedClient {
                events: StdMutex::new(script.into()),
                sent_chunks: self.sent_chunks.clone(),
                finalized: self.finalized.clone(),
            })
        }
    }

    struct NoopCorrection;
    #[async_trait::async_trait]
    impl CorrectionModel for NoopCorrection {
        async fn correct(&self, _target: &str, _context: &[String]) -> CorrectionOutcome {
            CorrectionOutcome::no_change("unused")
        }
    }
    struct NoopTranslation;
    #[async_trait::async_trait]
    impl TranslationModel for NoopTranslation {
        async fn translate(&self, text: &str) -> String {
            text.to_string()
        }
    }

    fn result(transcription: &str, is_final: bool) -> SttEvent {
        SttEvent::Result(SttResult {
            transcription: transcription.to_string(),
            translation: String::new(),
            source_language: Some("en".into()),
            target_language: Some("en".into()),
            is_final,
        })
    }

    async fn run_with_script(
        script: Vec<SttEvent>,
        frame_count: usize,
    ) -> (Vec<TranscriptRecord>, Arc<ConnectionRegistry>, SessionId) {
        let session_id = SessionId::new("s1");
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register_producer(&session_id, "zoom");
        let broadcaster = Arc::new(ViewerBroadcaster::new(32, 3));
        let mut rx = broadcaster.attach(&session_id, 1);

        let dir = std::env::temp_dir().join(format!("broker-orch-test-{}", uuid::Uuid::new_v4()));
        let artifact_writer = Arc::new(ArtifactWriter::new(&dir));

        let connector = Arc::new(ScriptedConnector {
            scripts: StdMutex::new(vec![script].into()),
            sent_chunks: Arc::new(StdMutex::new(Vec::new())),
            finalized: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });

        let config = Arc::new(BrokerConfig {
            stt_finalize_timeout: Duration::from_millis(50),
            ..BrokerConfig::default()
        });

        let (tx, frames) = mpsc::channel(8);
        for _ in 0..frame_count {
            tx.send(ProducerFrame {
                speaker: "Alice".into(),
                audio: vec![0u8; 4],
            })
            .await
            .unwrap();
        }
        drop(tx);

        let handles: SessionHandles<ScriptedConnector, NoopCorrection, NoopTranslation> = SessionHandles {
            session_id: session_id.clone(),
            integration: "zoom".into(),
            registry: registry.clone(),
            broadcaster: broadcaster.clone(),
            artifact_writer,
            connector,
            config,
            correction_engine: None,
            cache: Arc::new(Mutex::new(TranscriptCache::new(8))),
        };

        run_session(handles, frames).await;

        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        let _ = tokio::fs::remove_dir_all(&dir).await;
        (records, registry, session_id)
    }

    #[tokio::test]
    async fn happy_path_emits_partial_then_final_then_session_end() {
        let script = vec![result("hel", false), result("hello", true)];
        let (records, _registry, _session) = run_with_script(script, 1).await;

        assert!(records.iter().any(|r| r.kind == RecordType::Partial));
        assert!(records.iter().any(|r| r.kind == RecordType::Final));
        assert!(records.iter().any(|r| r.kind == RecordType::SessionEnd));
    }

    #[tokio::test]
    async fn teardown_deregisters_the_producer() {
        let script = vec![result("hi", true)];
        let (_records, registry, session) = run_with_script(script, 1).await;
        assert!(!registry.is_active(&session));
    }

    #[tokio::test]
    async fn fatal_error_ends_the_session_without_reconnecting() {
        let script = vec![SttEvent::Error(SttErrorKind::Fatal, "boom".into())];
        let (records, _registry, _session) = run_with_script(script, 0).await;
        assert!(records.iter().any(|r| r.kind == RecordType::SessionEnd));
    }

    #[tokio::test]
    async fn empty_partial_results_are_not_broadcast() {
        let script = vec![result("", false)];
        let (records, _registry, _session) = run_with_script(script, 0).await;
        assert!(!records.iter().any(|r| r.kind == RecordType::Partial));
    }
}
