use crate::error::AuthError;
use crate::ids::SessionId;

/// Credential check performed before a producer or viewer connection is
/// admitted. Kept separate from [`crate::registry::ConnectionRegistry`]
/// because registration is about *uniqueness*, not *permission* — a caller
/// can fail this gate long before the producer-uniqueness check ever runs.
#[async_trait::async_trait]
pub trait AuthGate: Send + Sync {
    async fn validate_producer(&self, session_id: &SessionId, token: Option<&str>) -> Result<(), AuthError>;
    async fn validate_viewer(&self, session_id: &SessionId, token: Option<&str>) -> Result<(), AuthError>;
}

/// Accepts every connection unconditionally. The default gate until a
/// deployment wires in its own credential source.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuthGate;

#[async_trait::async_trait]
impl AuthGate for NullAuthGate {
    async fn validate_producer(&self, _session_id: &SessionId, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }

    async fn validate_viewer(&self, _session_id: &SessionId, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_gate_admits_everyone() {
        let gate = NullAuthGate;
        let session = SessionId::new("s1");
        assert!(gate.validate_producer(&session, None).await.is_ok());
        assert!(gate.validate_viewer(&session, Some("whatever")).await.is_ok());
    }
}
