use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// The kind of event a [`TranscriptRecord`] represents on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Partial,
    Final,
    Correction,
    StatusUpdate,
    SessionEnd,
}

impl RecordType {
    /// True only for `final` and `correction` — the two record kinds that are
    /// ever admitted into the cache.
    pub fn is_finalize(self) -> bool {
        matches!(self, RecordType::Final | RecordType::Correction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Pending,
    Correcting,
    Complete,
}

/// A single event broadcast to viewers, and the unit the [`crate::cache::TranscriptCache`]
/// stores keyed by `message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub message_id: MessageId,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub translation: String,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    #[serde(default = "default_speaker")]
    pub speaker: String,
    #[serde(rename = "type")]
    pub kind: RecordType,
    pub isfinalize: bool,
    pub vtt_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_status: Option<CorrectionStatus>,
}

fn default_speaker() -> String {
    "Unknown".to_string()
}

impl TranscriptRecord {
    pub fn session_end() -> Self {
        Self {
            message_id: MessageId::raw("session_end"),
            transcription: String::new(),
            translation: String::new(),
            source_language: None,
            target_language: None,
            speaker: default_speaker(),
            kind: RecordType::SessionEnd,
            isfinalize: false,
            vtt_timestamp: None,
            correction_status: None,
        }
    }

    pub fn status_update(message_id: MessageId, status: CorrectionStatus) -> Self {
        Self {
            message_id,
            transcription: String::new(),
            translation: String::new(),
            source_language: None,
            target_language: None,
            speaker: default_speaker(),
            kind: RecordType::StatusUpdate,
            isfinalize: false,
            vtt_timestamp: None,
            correction_status: Some(status),
        }
    }

    /// Deep serialized size, used by the cache's byte budget.
    ///
    /// Estimating via `size_of` would undercount heap-allocated strings; the
    /// cache's accounting must reflect what actually gets broadcast.
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}
