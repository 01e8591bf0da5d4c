use broker_core::orchestrator::SttResult;

use crate::protocol::ServerMessage;

/// Reassembles Soniox's incremental token stream into the same two
/// consolidated strings the rest of the pipeline expects: a running
/// transcription and a running translation, both growing monotonically
/// until an utterance's `<end>` token (or the stream's `finished` flag)
/// closes it out.
///
/// One instance is scoped to a single upstream connection. State resets
/// whenever an utterance finalizes, so a fresh instance is never needed
/// across utterances within the same connection.
#[derive(Debug, Default)]
pub struct TokenAccumulator {
    final_transcription_tokens: Vec<String>,
    final_translation_tokens: Vec<String>,
    final_source_language: Option<String>,
    final_translation_language: Option<String>,
    final_speaker: Option<String>,
    enable_speaker_diarization: bool,
    target_language: String,
}

/// Outcome of folding one server message into the accumulator: always a
/// non-final reading of the current state, plus an optional final reading
/// when the message carried an `<end>` token or the `finished` flag.
pub struct FoldOutcome {
    pub partial: SttResult,
    pub finalized: Option<SttResult>,
    pub stream_finished: bool,
}

impl TokenAccumulator {
    pub fn new(target_language: impl Into<String>, enable_speaker_diarization: bool) -> Self {
        Self {
            target_language: target_language.into(),
            enable_speaker_diarization,
            ..Default::default()
        }
    }

    pub fn fold(&mut self, message: &ServerMessage) -> FoldOutcome {
        let mut non_final_transcription_tokens = Vec::new();
        let mut non_final_translation_tokens = Vec::new();
        let mut non_final_source_lang = None;
        let mut non_final_target_lang = None;
        let mut is_end_token = false;

        for token in &message.tokens {
            let Some(text) = token.text.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };

            if token.is_end_marker() {
                is_end_token = true;
                continue;
            }

            let is_translation = token.is_translation();
            let lang = token.language.clone();
            let speaker = token
                .speaker
                .clone()
                .filter(|_| self.enable_speaker_diarization)
                .map(|s| format!("Speaker {s}"));

            if token.is_final {
                if is_translation {
                    self.final_translation_tokens.push(text.to_string());
                    if self.final_translation_language.is_none() {
                        self.final_translation_language = lang;
                    }
                } else {
                    self.final_transcription_tokens.push(text.to_string());
                    if self.final_source_language.is_none() {
                        self.final_source_language = lang;
                    }
                    if let Some(speaker) = speaker {
                        self.final_speaker = Some(speaker);
                    }
                }
            } else if is_translation {
                non_final_translation_tokens.push(text.to_string());
                if non_final_target_lang.is_none() {
                    non_final_target_lang = lang;
                }
            } else {
                non_final_transcription_tokens.push(text.to_string());
                if non_final_source_lang.is_none() {
                    non_final_source_lang = lang;
                }
            }
        }

        let full_transcription = join_with_space(
            &self.final_transcription_tokens.concat(),
            &non_final_transcription_tokens.concat(),
        );
        let full_translation = join_with_space(
            &self.final_translation_tokens.concat(),
            &non_final_translation_tokens.concat(),
        );

        let source_lang = self.final_source_language.clone().or(non_final_source_lang);
        let target_lang = self
            .final_translation_language
            .clone()
            .or(non_final_target_lang)
            .or_else(|| Some(self.target_language.clone()));

        let partial = SttResult {
            transcription: full_transcription,
            translation: full_translation,
            source_language: source_lang,
            target_language: target_lang,
            is_final: false,
        };

        let finalized = if is_end_token {
            Some(self.take_final_result())
        } else if message.finished {
            Some(self.snapshot_final_result())
        } else {
            None
        };

        FoldOutcome {
            partial,
            finalized,
            stream_finished: message.finished,
        }
    }

    fn take_final_result(&mut self) -> SttResult {
        let result = self.snapshot_final_result();
        self.final_transcription_tokens.clear();
        self.final_translation_tokens.clear();
        self.final_source_language = None;
        self.final_translation_language = None;
        self.final_speaker = None;
        result
    }

    fn snapshot_final_result(&self) -> SttResult {
        SttResult {
            transcription: self.final_transcription_tokens.concat().trim().to_string(),
            translation: self.final_translation_tokens.concat().trim().to_string(),
            source_language: self.final_source_language.clone(),
            target_language: self
                .final_translation_language
                .clone()
                .or_else(|| Some(self.target_language.clone())),
            is_final: true,
        }
    }
}

fn join_with_space(final_part: &str, non_final_part: &str) -> String {
    format!("{final_part} {non_final_part}").trim().to_string()
}
