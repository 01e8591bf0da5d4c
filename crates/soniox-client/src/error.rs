#[derive(Debug, thiserror::Error)]
pub enum SonioxError {
    #[error("soniox connection error: {0}")]
    Connection(String),
    #[error("soniox fatal error: {0}")]
    Fatal(String),
}

/// Classifies a raw upstream error string the same way the trailing-window
/// correction pipeline's predecessor did: a small set of known-transient
/// substrings map to a restartable connection error, everything else is
/// treated as fatal.
pub fn classify_error_message(message: &str) -> SonioxError {
    if message.contains("Cannot continue request") || message.contains("Connection reset by peer") {
        SonioxError::Connection(message.to_string())
    } else {
        SonioxError::Fatal(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_continue_request_is_restartable() {
        assert!(matches!(
            classify_error_message("503 - Cannot continue request"),
            SonioxError::Connection(_)
        ));
    }

    #[test]
    fn connection_reset_is_restartable() {
        assert!(matches!(
            classify_error_message("Connection reset by peer"),
            SonioxError::Connection(_)
        ));
    }

    #[test]
    fn unknown_errors_are_fatal() {
        assert!(matches!(
            classify_error_message("401 - Invalid API key"),
            SonioxError::Fatal(_)
        ));
    }
}
