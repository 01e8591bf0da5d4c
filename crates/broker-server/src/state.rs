use std::sync::Arc;

use broker_core::artifact::ArtifactWriter;
use broker_core::auth::AuthGate;
use broker_core::broadcaster::ViewerBroadcaster;
use broker_core::config::BrokerConfig;
use broker_core::correction::CorrectionEngine;
use broker_core::registry::ConnectionRegistry;
use soniox_client::SonioxConnector;

use crate::models::{DynCorrectionModel, DynTranslationModel};
use crate::sessions::SessionStore;

/// Everything a producer or viewer route needs, shared across every
/// connection via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<ViewerBroadcaster>,
    pub artifact_writer: Arc<ArtifactWriter>,
    pub config: Arc<BrokerConfig>,
    pub auth_gate: Arc<dyn AuthGate>,
    pub sessions: Arc<SessionStore>,
    pub correction_model: Arc<DynCorrectionModel>,
    pub translation_model: Arc<DynTranslationModel>,
    pub soniox_api_key: Arc<String>,
    /// Overrides the upstream speech-to-text websocket URL. `None` in
    /// production (the real Soniox endpoint); set in tests to point at a
    /// local mock server.
    pub soniox_url_override: Option<Arc<String>>,
}

impl AppState {
    /// Builds the [`soniox_client::SonioxConnector`] for a new producer
    /// connection. Language/diarization are per-connection because they come
    /// from the producer's own connect request, not global config.
    pub fn soniox_connector(&self, target_language: &str, language_hints: Vec<String>, enable_speaker_diarization: bool) -> SonioxConnector {
        let mut connector = SonioxConnector::new(self.soniox_api_key.as_str());
        connector.target_language = target_language.to_string();
        connector.language_hints = language_hints;
        connector.enable_speaker_diarization = enable_speaker_diarization;
        connector.ping_interval = self.config.stt_ping_interval;
        connector.ping_timeout = self.config.stt_ping_timeout;
        if let Some(url) = &self.soniox_url_override {
            connector = connector.with_url(url.as_str().to_string());
        }
        connector
    }

    /// Builds a fresh correction engine for a new producer session, or
    /// `None` if the session's source language is never eligible and there
    /// is nothing useful for it to do. Sessions decide eligibility per
    /// finalized utterance (language isn't known at connect time), so the
    /// engine is always built — ineligible utterances are simply never
    /// handed to it. Shares the session's own cache so a correction lands in
    /// cache history (and therefore in the persisted artifact and any
    /// late-joining viewer's replay) the same way a live final does.
    pub fn correction_engine(
        &self,
        session_id: broker_core::ids::SessionId,
        cache: Arc<std::sync::Mutex<broker_core::cache::TranscriptCache>>,
    ) -> Arc<CorrectionEngine<DynCorrectionModel, DynTranslationModel>> {
        CorrectionEngine::new(
            session_id,
            self.config.correction_context_size,
            self.correction_model.clone(),
            self.translation_model.clone(),
            self.broadcaster.clone(),
            cache,
        )
    }
}
