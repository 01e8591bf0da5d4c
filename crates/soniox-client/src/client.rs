use std::time::Duration;

use broker_core::error::{SttConnectError, SttTransportError};
use broker_core::orchestrator::{SttClient, SttConnector, SttErrorKind, SttEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{classify_error_message, SonioxError};
use crate::protocol::{ServerMessage, StreamConfig, SONIOX_WEBSOCKET_URL};
use crate::reassembly::TokenAccumulator;

/// Connects to the Soniox real-time speech-to-text websocket and exposes it
/// through [`broker_core::orchestrator::SttClient`].
pub struct SonioxConnector {
    pub api_key: String,
    pub target_language: String,
    pub language_hints: Vec<String>,
    pub enable_speaker_diarization: bool,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    url: String,
}

impl SonioxConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            target_language: "en".to_string(),
            language_hints: Vec::new(),
            enable_speaker_diarization: false,
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            url: SONIOX_WEBSOCKET_URL.to_string(),
        }
    }

    /// Overrides the websocket URL. Production code never needs this — it
    /// exists so integration tests can point the connector at a local mock
    /// server instead of the real Soniox endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl SttConnector for SonioxConnector {
    type Client = SonioxClient;

    async fn connect(&self) -> Result<SonioxClient, SttConnectError> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|err| SttConnectError::Transport(err.to_string()))?;

        let config = StreamConfig::new(
            self.api_key.clone(),
            self.target_language.clone(),
            self.language_hints.clone(),
        );
        let payload = serde_json::to_string(&config).map_err(|err| SttConnectError::Transport(err.to_string()))?;
        ws.send(WsMessage::Text(payload.into()))
            .await
            .map_err(|err| SttConnectError::Transport(err.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(64);

        let accumulator = TokenAccumulator::new(self.target_language.clone(), self.enable_speaker_diarization);
        tokio::spawn(run_connection(
            ws,
            commands_rx,
            events_tx,
            accumulator,
            self.ping_interval,
            self.ping_timeout,
        ));

        Ok(SonioxClient {
            commands: commands_tx,
            events: events_rx,
        })
    }
}

enum Command {
    Audio(Vec<u8>),
    Finalize,
}

pub struct SonioxClient {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<SttEvent>,
}

#[async_trait::async_trait]
impl SttClient for SonioxClient {
    async fn send_chunk(&mut self, audio: &[u8]) -> Result<(), SttTransportError> {
        self.commands
            .send(Command::Audio(audio.to_vec()))
            .await
            .map_err(|_| SttTransportError::Send("connection task has already closed".into()))
    }

    async fn finalize_stream(&mut self) {
        let _ = self.commands.send(Command::Finalize).await;
    }

    async fn next_event(&mut self) -> SttEvent {
        self.events.recv().await.unwrap_or(SttEvent::Closed)
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Owns the live websocket end to end: forwards outbound audio/finalize
/// commands, sends keep-alive pings on a fixed interval, reassembles
/// inbound token batches into [`SttEvent`]s, and declares the connection
/// dead if a ping round-trip exceeds `ping_timeout`.
async fn run_connection(
    mut ws: WsStream,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<SttEvent>,
    mut accumulator: TokenAccumulator,
    ping_interval: Duration,
    ping_timeout: Duration,
) {
    let mut ping_ticker = tokio::time::interval(ping_interval);
    ping_ticker.tick().await; // first tick fires immediately; consume it
    let mut awaiting_pong_since: Option<tokio::time::Instant> = None;

    loop {
        if let Some(since) = awaiting_pong_since {
            if since.elapsed() > ping_timeout {
                tracing::warn!("soniox_ping_timeout_treating_connection_as_closed");
                let _ = events.send(SttEvent::Closed).await;
                return;
            }
        }

        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Audio(chunk)) => {
                        if let Err(err) = ws.send(WsMessage::Binary(chunk.into())).await {
                            tracing::warn!(error = %err, "soniox_send_chunk_failed");
                            let _ = events.send(SttEvent::Error(SttErrorKind::Connection, err.to_string())).await;
                        }
                    }
                    Some(Command::Finalize) => {
                        if let Err(err) = ws.send(WsMessage::Text(String::new().into())).await {
                            tracing::warn!(error = %err, "soniox_finalize_send_failed");
                        }
                    }
                    None => {
                        // Public handle dropped; nothing more will ever be sent.
                        let _ = ws.close(None).await;
                        return;
                    }
                }
            }
            _ = ping_ticker.tick() => {
                if ws.send(WsMessage::Ping(Vec::new().into())).await.is_ok() {
                    awaiting_pong_since = Some(tokio::time::Instant::now());
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if let (Some(code), Some(reason)) = (message.error_code, message.error_message.as_deref()) {
                                    let error_text = format!("{code} - {reason}");
                                    let classified = classify_error_message(&error_text);
                                    let kind = match classified {
                                        SonioxError::Connection(_) => SttErrorKind::Connection,
                                        SonioxError::Fatal(_) => SttErrorKind::Fatal,
                                    };
                                    let _ = events.send(SttEvent::Error(kind, error_text)).await;
                                    return;
                                }

                                let outcome = accumulator.fold(&message);
                                if !outcome.partial.transcription.is_empty() || !outcome.partial.translation.is_empty() {
                                    let _ = events.send(SttEvent::Result(outcome.partial)).await;
                                }
                                if let Some(finalized) = outcome.finalized {
                                    let _ = events.send(SttEvent::Result(finalized)).await;
                                }
                                if outcome.stream_finished {
                                    let _ = events.send(SttEvent::Closed).await;
                                    return;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "soniox_decode_failed");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        awaiting_pong_since = None;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = events.send(SttEvent::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let error_text = err.to_string();
                        let classified = classify_error_message(&error_text);
                        let kind = match classified {
                            SonioxError::Connection(_) => SttErrorKind::Connection,
                            SonioxError::Fatal(_) => SttErrorKind::Fatal,
                        };
                        let _ = events.send(SttEvent::Error(kind, error_text)).await;
                        return;
                    }
                }
            }
        }
    }
}
