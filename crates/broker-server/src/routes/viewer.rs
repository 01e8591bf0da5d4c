use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use broker_core::ids::SessionId;
use broker_core::registry::ViewerInfo;

use crate::error::RouteError;
use crate::state::AppState;

const POLICY_VIOLATION: u16 = 1008;
const SESSION_NOT_FOUND: u16 = 4004;

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn viewer_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ViewerQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = SessionId::new(session_id);

    if let Err(err) = state
        .auth_gate
        .validate_viewer(&session_id, query.token.as_deref())
        .await
    {
        tracing::warn!(session_id = %session_id, error = %err, "viewer_auth_rejected");
        return RouteError::Unauthorized(err.to_string()).into_response();
    }

    ws.on_upgrade(move |socket| handle_viewer_socket(socket, state, session_id, query.language))
}

/// Replays cache history before the first live record and tears down viewer
/// membership on disconnect. The session's cache lookup and the live
/// broadcaster attach happen back to back under no intervening `.await`
/// that could let a producer-side record land between them, so no frame of
/// history can ever be skipped or duplicated.
async fn handle_viewer_socket(mut socket: WebSocket, state: AppState, session_id: SessionId, language_code: Option<String>) {
    if !state.registry.is_active(&session_id) {
        tracing::warn!(session_id = %session_id, "viewer_rejected_session_not_found");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: SESSION_NOT_FOUND,
                reason: "session not found".into(),
            })))
            .await;
        return;
    }

    let history = state
        .sessions
        .get(&session_id)
        .map(|cache| cache.lock().unwrap().history())
        .unwrap_or_default();

    let viewer_id = next_viewer_id();
    let mut records = state.broadcaster.attach(&session_id, viewer_id);
    state.registry.attach_viewer(
        &session_id,
        ViewerInfo {
            viewer_id,
            language_code: language_code.clone(),
        },
    );

    tracing::info!(session_id = %session_id, viewer_id, replay_count = history.len(), "viewer_connected");

    for record in &history {
        if !send_record(&mut socket, record).await {
            cleanup(&state, &session_id, viewer_id);
            return;
        }
    }

    loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else { break };
                if !send_record(&mut socket, &record).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Client-to-server viewer messages are reserved for
                        // future subscription control; ignored for now.
                    }
                    Some(Err(err)) => {
                        tracing::warn!(session_id = %session_id, viewer_id, error = %err, "viewer_socket_error");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(session_id = %session_id, viewer_id, "viewer_disconnected");
    cleanup(&state, &session_id, viewer_id);
}

fn cleanup(state: &AppState, session_id: &SessionId, viewer_id: u64) {
    state.broadcaster.detach(session_id, viewer_id);
    state.registry.detach_viewer(session_id, viewer_id);
}

async fn send_record(socket: &mut WebSocket, record: &broker_core::record::TranscriptRecord) -> bool {
    let payload = match serde_json::to_string(record) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "viewer_record_serialize_failed");
            return true;
        }
    };
    socket.send(Message::Text(payload.into())).await.is_ok()
}

fn next_viewer_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
