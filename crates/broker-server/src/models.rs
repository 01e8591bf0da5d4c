use broker_core::correction::{CorrectionModel, CorrectionOutcome, TranslationModel};
use serde::{Deserialize, Serialize};

/// Calls an HTTP correction endpoint with a prompt containing the target
/// sentence and its following context, per the `{ context, target_sentence }`
/// request shape.
pub struct HttpCorrectionModel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCorrectionModel {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct CorrectionRequest<'a> {
    context: &'a [String],
    target_sentence: &'a str,
}

#[derive(Deserialize)]
struct CorrectionResponse {
    is_correction_needed: bool,
    #[serde(default)]
    corrected_sentence: String,
    #[serde(default)]
    reasoning: String,
}

#[async_trait::async_trait]
impl CorrectionModel for HttpCorrectionModel {
    async fn correct(&self, target: &str, context: &[String]) -> CorrectionOutcome {
        let request = CorrectionRequest {
            context,
            target_sentence: target,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "correction_model_request_failed");
                return CorrectionOutcome::no_change("correction model request failed");
            }
        };

        match response.json::<CorrectionResponse>().await {
            Ok(parsed) => CorrectionOutcome {
                is_correction_needed: parsed.is_correction_needed,
                corrected_sentence: if parsed.corrected_sentence.is_empty() {
                    None
                } else {
                    Some(parsed.corrected_sentence)
                },
                reasoning: parsed.reasoning,
            },
            Err(err) => {
                tracing::warn!(error = %err, "correction_model_response_malformed");
                CorrectionOutcome::no_change("correction model response malformed")
            }
        }
    }
}

/// Calls an HTTP translation endpoint. Only the final, fully-accumulated
/// response body is consumed — streaming chunks are the provider's concern,
/// not ours.
pub struct HttpTranslationModel {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslationModel {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct TranslationRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslationResponse {
    #[serde(default)]
    translation: String,
}

#[async_trait::async_trait]
impl TranslationModel for HttpTranslationModel {
    async fn translate(&self, text: &str) -> String {
        let request = TranslationRequest { text };

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "translation_model_request_failed");
                return String::new();
            }
        };

        match response.json::<TranslationResponse>().await {
            Ok(parsed) => parsed.translation,
            Err(err) => {
                tracing::warn!(error = %err, "translation_model_response_malformed");
                String::new()
            }
        }
    }
}

/// Default model used when no correction endpoint is configured — never
/// flags a correction, so `CorrectionEngine` effectively does nothing beyond
/// bookkeeping its trailing window.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCorrectionModel;

#[async_trait::async_trait]
impl CorrectionModel for NullCorrectionModel {
    async fn correct(&self, _target: &str, _context: &[String]) -> CorrectionOutcome {
        CorrectionOutcome::no_change("no correction model configured")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranslationModel;

#[async_trait::async_trait]
impl TranslationModel for NullTranslationModel {
    async fn translate(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Picks the HTTP-backed model when an endpoint is configured, otherwise the
/// no-op one — lets `AppState` stay monomorphic over a single
/// `CorrectionEngine<DynCorrectionModel, DynTranslationModel>` regardless of
/// deployment configuration.
pub enum DynCorrectionModel {
    Http(HttpCorrectionModel),
    Null(NullCorrectionModel),
}

#[async_trait::async_trait]
impl CorrectionModel for DynCorrectionModel {
    async fn correct(&self, target: &str, context: &[String]) -> CorrectionOutcome {
        match self {
            Self::Http(model) => model.correct(target, context).await,
            Self::Null(model) => model.correct(target, context).await,
        }
    }
}

pub enum DynTranslationModel {
    Http(HttpTranslationModel),
    Null(NullTranslationModel),
}

#[async_trait::async_trait]
impl TranslationModel for DynTranslationModel {
    async fn translate(&self, text: &str) -> String {
        match self {
            Self::Http(model) => model.translate(text).await,
            Self::Null(model) => model.translate(text).await,
        }
    }
}
