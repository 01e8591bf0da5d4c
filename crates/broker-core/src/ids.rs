use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque primary key for a session, e.g. a Zoom/Meet meeting id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a transcript record.
///
/// Finalized records use the canonical `<ordinal>_<language_code>` form
/// (`MessageId::finalized`). While an utterance is still partial, the
/// orchestrator holds a transient placeholder (`MessageId::transient`) that
/// is never exposed to the cache or to viewers as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn transient() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn finalized(ordinal: u64, language_code: &str) -> Self {
        Self(format!("{ordinal}_{language_code}"))
    }

    pub fn raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
