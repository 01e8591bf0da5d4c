use std::net::SocketAddr;
use std::sync::Arc;

use broker_core::artifact::ArtifactWriter;
use broker_core::auth::NullAuthGate;
use broker_core::broadcaster::ViewerBroadcaster;
use broker_core::config::BrokerConfig;
use broker_core::registry::ConnectionRegistry;
use broker_server::models::{DynCorrectionModel, DynTranslationModel, HttpCorrectionModel, HttpTranslationModel, NullCorrectionModel, NullTranslationModel};
use broker_server::sessions::SessionStore;
use broker_server::{AppState, build_app};
use tracing_subscriber::prelude::*;

fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(BrokerConfig::from_env());
    let soniox_api_key = Arc::new(std::env::var("SONIOX_API_KEY").unwrap_or_default());

    let http_client = reqwest::Client::new();
    let correction_model = Arc::new(match std::env::var("CORRECTION_MODEL_ENDPOINT") {
        Ok(endpoint) => DynCorrectionModel::Http(HttpCorrectionModel::new(http_client.clone(), endpoint)),
        Err(_) => DynCorrectionModel::Null(NullCorrectionModel),
    });
    let translation_model = Arc::new(match std::env::var("TRANSLATION_MODEL_ENDPOINT") {
        Ok(endpoint) => DynTranslationModel::Http(HttpTranslationModel::new(http_client, endpoint)),
        Err(_) => DynTranslationModel::Null(NullTranslationModel),
    });

    let state = AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        broadcaster: Arc::new(ViewerBroadcaster::new(
            config.viewer_channel_capacity,
            config.viewer_send_failure_threshold,
        )),
        artifact_writer: Arc::new(ArtifactWriter::new(config.artifact_root.clone())),
        auth_gate: Arc::new(NullAuthGate),
        sessions: Arc::new(SessionStore::new()),
        correction_model,
        translation_model,
        soniox_api_key,
        soniox_url_override: None,
        config,
    };

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(addr = %addr, "broker_server_listening");

            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            axum::serve(listener, build_app(state))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .unwrap();
        });

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown_signal_received");
}
