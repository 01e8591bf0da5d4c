use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::broadcaster::ViewerBroadcaster;
use crate::cache::TranscriptCache;
use crate::ids::SessionId;
use crate::record::{CorrectionStatus, RecordType, TranscriptRecord};

/// Result of asking a correction model whether a finalized utterance needs
/// amending, given the utterances that followed it.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub is_correction_needed: bool,
    pub corrected_sentence: Option<String>,
    pub reasoning: String,
}

impl CorrectionOutcome {
    pub fn no_change(reason: impl Into<String>) -> Self {
        Self {
            is_correction_needed: false,
            corrected_sentence: None,
            reasoning: reason.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait CorrectionModel: Send + Sync {
    async fn correct(&self, target: &str, context: &[String]) -> CorrectionOutcome;
}

#[async_trait::async_trait]
pub trait TranslationModel: Send + Sync {
    /// Retranslates `text` end to end. Streaming models should return only
    /// the last chunk they produced — the broker only ever broadcasts the
    /// final translated value, never an in-progress retranslation.
    async fn translate(&self, text: &str) -> String;
}

/// Runs amendment passes over a trailing window of recently finalized
/// utterances, using later utterances as disambiguating context.
///
/// Holds a fixed-size ring buffer of the last `context_size` finals per
/// session. Each time a new final arrives, the utterance that just aged
/// past the front of the window becomes the correction target, using the
/// (at most two) utterances immediately after it in the buffer as context —
/// so corrections only ever look forward, never at text not yet produced.
pub struct CorrectionEngine<C, T> {
    history: Mutex<VecDeque<TranscriptRecord>>,
    context_size: usize,
    model: Arc<C>,
    translator: Arc<T>,
    broadcaster: Arc<ViewerBroadcaster>,
    cache: Arc<Mutex<TranscriptCache>>,
    session_id: SessionId,
}

impl<C, T> CorrectionEngine<C, T>
where
    C: CorrectionModel + 'static,
    T: TranslationModel + 'static,
{
    pub fn new(
        session_id: SessionId,
        context_size: usize,
        model: Arc<C>,
        translator: Arc<T>,
        broadcaster: Arc<ViewerBroadcaster>,
        cache: Arc<Mutex<TranscriptCache>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            history: Mutex::new(VecDeque::with_capacity(context_size)),
            context_size,
            model,
            translator,
            broadcaster,
            cache,
            session_id,
        })
    }

    /// Records a newly finalized utterance and, if the window is full,
    /// spawns a cooperative background task to check the utterance that
    /// just aged out of eligibility for further context. Never blocks the
    /// caller — the orchestrator's receive loop must keep draining upstream
    /// events while correction runs.
    pub fn process_final(self: &Arc<Self>, utterance: TranscriptRecord) {
        let target = {
            let mut history = self.history.lock().unwrap();
            history.push_back(utterance);
            if history.len() > self.context_size {
                history.pop_front();
            }
            if history.len() < self.context_size {
                None
            } else {
                history.front().cloned()
            }
        };

        if let Some(target) = target {
            let engine = self.clone();
            tokio::spawn(async move { engine.perform_correction(target).await });
        }
    }

    /// Called at session teardown to give the last few utterances — which
    /// never accumulated a full window of following context — one last
    /// correction pass before the session closes.
    pub async fn finalize_session(self: &Arc<Self>) {
        let remaining: Vec<TranscriptRecord> = {
            let history = self.history.lock().unwrap();
            if history.is_empty() {
                return;
            }
            let take = if history.len() >= self.context_size {
                self.context_size.saturating_sub(1)
            } else {
                history.len()
            };
            history.iter().rev().take(take).rev().cloned().collect()
        };

        for utterance in remaining {
            self.perform_correction(utterance).await;
        }
    }

    fn context_for(&self, target_id: &crate::ids::MessageId) -> Vec<String> {
        let history = self.history.lock().unwrap();
        let Some(target_index) = history.iter().position(|u| &u.message_id == target_id) else {
            return Vec::new();
        };
        history
            .iter()
            .skip(target_index + 1)
            .take(2)
            .map(|u| u.transcription.clone())
            .collect()
    }

    async fn perform_correction(self: Arc<Self>, target: TranscriptRecord) {
        let context = self.context_for(&target.message_id);
        let outcome = self.model.correct(&target.transcription, &context).await;

        let needs_change = outcome.is_correction_needed
            && outcome
                .corrected_sentence
                .as_ref()
                .map(|s| s.trim() != target.transcription.trim() && !s.trim().is_empty())
                .unwrap_or(false);

        if !needs_change {
            tracing::trace!(
                message_id = %target.message_id,
                reason = %outcome.reasoning,
                "correction_not_applied"
            );
            return;
        }

        let corrected_text = outcome.corrected_sentence.unwrap();

        self.broadcaster.broadcast(
            &self.session_id,
            &self.cache,
            &TranscriptRecord::status_update(target.message_id.clone(), CorrectionStatus::Correcting),
        );

        let retranslation = self.translator.translate(&corrected_text).await;

        let corrected_record = TranscriptRecord {
            message_id: target.message_id.clone(),
            transcription: corrected_text,
            translation: retranslation,
            kind: RecordType::Correction,
            isfinalize: true,
            ..target
        };

        self.broadcaster.broadcast(&self.session_id, &self.cache, &corrected_record);
        tracing::info!(message_id = %corrected_record.message_id, "correction_broadcast");
    }
}
