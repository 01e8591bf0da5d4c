use std::sync::Arc;

use broker_core::artifact::ArtifactWriter;
use broker_core::auth::NullAuthGate;
use broker_core::broadcaster::ViewerBroadcaster;
use broker_core::config::BrokerConfig;
use broker_core::registry::ConnectionRegistry;
use broker_server::models::{DynCorrectionModel, DynTranslationModel, NullCorrectionModel, NullTranslationModel};
use broker_server::sessions::SessionStore;
use broker_server::{AppState, build_app};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Starts a one-shot mock Soniox server on an ephemeral port: accepts a
/// single connection, discards the config frame, then replies to each
/// inbound audio chunk with the next entry of `scripted_messages` in order,
/// before closing. Pacing replies to inbound chunks (rather than blasting
/// them out immediately) keeps a test's timing under its own control.
pub async fn spawn_mock_soniox(scripted_messages: Vec<Value>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.next().await; // config frame

        for message in scripted_messages {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(_))) => break,
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            }
            let _ = ws.send(Message::Text(message.to_string().into())).await;
        }
        let _ = ws.close(None).await;
    });

    format!("ws://{addr}")
}

/// Starts the broker HTTP/WebSocket server on an ephemeral port, wired to a
/// (presumably mock) Soniox endpoint. Returns the base `ws://` URL.
pub async fn spawn_broker(soniox_url: &str) -> String {
    let config = Arc::new(BrokerConfig {
        stt_finalize_timeout: std::time::Duration::from_millis(200),
        ..BrokerConfig::default()
    });

    let state = AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        broadcaster: Arc::new(ViewerBroadcaster::new(
            config.viewer_channel_capacity,
            config.viewer_send_failure_threshold,
        )),
        artifact_writer: Arc::new(ArtifactWriter::new(
            std::env::temp_dir().join(format!("broker-server-test-{}", uuid::Uuid::new_v4())),
        )),
        auth_gate: Arc::new(NullAuthGate),
        sessions: Arc::new(SessionStore::new()),
        correction_model: Arc::new(DynCorrectionModel::Null(NullCorrectionModel)),
        translation_model: Arc::new(DynTranslationModel::Null(NullTranslationModel)),
        soniox_api_key: Arc::new("test-api-key".to_string()),
        soniox_url_override: Some(Arc::new(soniox_url.to_string())),
        config,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{addr}")
}

pub fn producer_audio_message(speaker: &str, audio: &[u8]) -> String {
    use base64::Engine as _;
    json!({
        "userName": speaker,
        "audio": base64::engine::general_purpose::STANDARD.encode(audio),
    })
    .to_string()
}
