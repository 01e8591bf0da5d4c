use crate::ids::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} already has an active producer")]
    ProducerAlreadyActive(SessionId),
    #[error("session {0} has no active producer")]
    NoActiveProducer(SessionId),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("producer credentials rejected for session {0}")]
    ProducerRejected(SessionId),
    #[error("viewer credentials rejected for session {0}")]
    ViewerRejected(SessionId),
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

use crate::orchestrator::SttErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum SttConnectError {
    #[error("failed to connect to upstream speech-to-text service: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SttTransportError {
    #[error("failed to send audio chunk upstream: {0}")]
    Send(String),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session {0} rejected: {1}")]
    Auth(SessionId, #[source] AuthError),
    #[error("session {0} registration failed: {1}")]
    Registry(SessionId, #[source] RegistryError),
    #[error("upstream speech-to-text error ({kind:?}): {message}")]
    Stt { kind: SttErrorKind, message: String },
    #[error("artifact write failed: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("reconnect attempts exhausted for session {0}")]
    ReconnectExhausted(SessionId),
}
