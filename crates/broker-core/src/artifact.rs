use std::path::{Path, PathBuf};

use crate::error::ArtifactError;
use crate::ids::SessionId;
use crate::record::TranscriptRecord;

/// Writes a session's finalized transcript history out as a WebVTT file
/// under `<artifact_root>/<integration>/<session_id>/transcript.vtt`.
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn session_dir(&self, integration: &str, session_id: &SessionId) -> PathBuf {
        self.root.join(integration).join(session_id.as_str())
    }

    /// Writes nothing if `history` is empty — an artifact is only meaningful
    /// once at least one utterance has been finalized.
    pub async fn write_vtt(
        &self,
        integration: &str,
        session_id: &SessionId,
        history: &[TranscriptRecord],
    ) -> Result<Option<PathBuf>, ArtifactError> {
        if history.is_empty() {
            tracing::debug!(session_id = %session_id, "artifact_skip_empty_history");
            return Ok(None);
        }

        let dir = self.session_dir(integration, session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ArtifactError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;

        let path = dir.join("transcript.vtt");
        let contents = render_vtt(history);

        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(session_id = %session_id, path = %path.display(), entries = history.len(), "artifact_written");
        Ok(Some(path))
    }
}

fn render_vtt(history: &[TranscriptRecord]) -> String {
    let mut lines = vec!["WEBVTT".to_string(), String::new()];

    for (i, entry) in history.iter().enumerate() {
        let timestamp = entry
            .vtt_timestamp
            .clone()
            .unwrap_or_else(|| "00:00:00.000 --> 00:00:00.000".to_string());

        lines.push((i + 1).to_string());
        lines.push(timestamp);
        lines.push(format!("{}: {}", entry.speaker, entry.transcription.trim()));
        let translation = entry.translation.trim();
        if !translation.is_empty() {
            lines.push(translation.to_string());
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Convenience used by tests and by the orchestrator's shutdown path when it
/// already knows the exact directory layout and just wants the file path.
pub fn transcript_path(root: &Path, integration: &str, session_id: &SessionId) -> PathBuf {
    root.join(integration).join(session_id.as_str()).join("transcript.vtt")
}
