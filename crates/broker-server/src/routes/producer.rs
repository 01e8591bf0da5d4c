use std::sync::{Arc, Mutex};

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use broker_core::cache::TranscriptCache;
use broker_core::ids::SessionId;
use broker_core::orchestrator::{ProducerFrame, SessionHandles};

use crate::error::RouteError;
use crate::state::AppState;

const POLICY_VIOLATION: u16 = 1008;
const PRODUCER_FRAME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct ProducerQuery {
    #[serde(default)]
    pub integration: Option<String>,
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(default)]
    pub language_hints: Option<String>,
    #[serde(default)]
    pub enable_speaker_diarization: bool,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProducerMessage {
    #[serde(rename = "userName", default = "default_user_name")]
    user_name: String,
    audio: String,
}

fn default_user_name() -> String {
    "Unknown".to_string()
}

pub async fn producer_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ProducerQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = SessionId::new(session_id);

    if let Err(err) = state
        .auth_gate
        .validate_producer(&session_id, query.token.as_deref())
        .await
    {
        tracing::warn!(session_id = %session_id, error = %err, "producer_auth_rejected");
        return RouteError::Unauthorized(err.to_string()).into_response();
    }

    ws.on_upgrade(move |socket| handle_producer_socket(socket, state, session_id, query))
}

async fn handle_producer_socket(mut socket: WebSocket, state: AppState, session_id: SessionId, query: ProducerQuery) {
    let integration = query.integration.unwrap_or_else(|| "unknown".to_string());

    if !state.registry.register_producer(&session_id, &integration) {
        tracing::warn!(session_id = %session_id, "duplicate_producer_rejected");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: POLICY_VIOLATION,
                reason: "a producer is already active for this session".into(),
            })))
            .await;
        return;
    }

    let target_language = query
        .target_language
        .unwrap_or_else(|| state.config.default_target_language.clone());
    let language_hints = query
        .language_hints
        .map(|hints| hints.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect())
        .unwrap_or_default();

    let connector = Arc::new(state.soniox_connector(&target_language, language_hints, query.enable_speaker_diarization));
    let cache = Arc::new(Mutex::new(TranscriptCache::new(state.config.max_cache_mb)));
    state.sessions.insert(session_id.clone(), cache.clone());

    let handles = SessionHandles {
        session_id: session_id.clone(),
        integration,
        registry: state.registry.clone(),
        broadcaster: state.broadcaster.clone(),
        artifact_writer: state.artifact_writer.clone(),
        connector,
        config: state.config.clone(),
        correction_engine: Some(state.correction_engine(session_id.clone(), cache.clone())),
        cache,
    };

    let (frame_tx, frame_rx) = tokio::sync::mpsc::channel::<ProducerFrame>(PRODUCER_FRAME_CHANNEL_CAPACITY);

    let orchestrator_handle = tokio::spawn(broker_core::orchestrator::run_session(handles, frame_rx));

    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ProducerMessage>(&text) {
                Ok(message) => {
                    use base64::Engine as _;
                    let audio = match base64::engine::general_purpose::STANDARD.decode(message.audio) {
                        Ok(audio) => audio,
                        Err(err) => {
                            tracing::warn!(session_id = %session_id, error = %err, "producer_audio_not_base64");
                            continue;
                        }
                    };
                    if frame_tx
                        .send(ProducerFrame {
                            speaker: message.user_name,
                            audio,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "producer_message_not_parsed");
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!(session_id = %session_id, "producer_socket_closed");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::warn!(session_id = %session_id, error = %err, "producer_socket_error");
                break;
            }
        }
    }

    drop(frame_tx);
    let _ = orchestrator_handle.await;
    state.sessions.remove(&session_id);
}
