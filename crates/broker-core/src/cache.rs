use std::collections::{HashMap, VecDeque};

use crate::ids::MessageId;
use crate::record::{RecordType, TranscriptRecord};

const DEFAULT_MAX_CACHE_MB: u64 = 10;

/// Per-session, byte-budgeted, insertion-ordered transcript cache.
///
/// Backed by a hash index plus an order queue rather than a single ordered
/// map so that in-place updates (corrections, status updates) never pay for
/// an O(n) reshuffle — only eviction walks the order queue, and only from
/// the oldest end.
pub struct TranscriptCache {
    budget_bytes: usize,
    current_bytes: usize,
    order: VecDeque<MessageId>,
    entries: HashMap<MessageId, TranscriptRecord>,
}

impl TranscriptCache {
    pub fn new(max_size_mb: u64) -> Self {
        Self {
            budget_bytes: (max_size_mb.max(1) as usize) * 1024 * 1024,
            current_bytes: 0,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    /// Dispatches an inbound record: new finals are inserted, new partials
    /// are discarded, corrections replace in place, and status updates merge
    /// their one mutable field onto the existing record.
    pub fn process(&mut self, record: TranscriptRecord) {
        if !self.entries.contains_key(&record.message_id) {
            if record.isfinalize {
                self.insert_new(record);
            } else {
                tracing::trace!(message_id = %record.message_id, "cache_discard_partial");
            }
            return;
        }

        match record.kind {
            RecordType::Correction => self.replace_in_place(record),
            RecordType::StatusUpdate => self.merge_status_update(record),
            _ => {}
        }
    }

    fn insert_new(&mut self, record: TranscriptRecord) {
        let size = record.estimated_size();
        self.evict_until_fits(size, None);

        tracing::trace!(
            message_id = %record.message_id,
            size_bytes = size,
            total_bytes = self.current_bytes + size,
            "cache_insert"
        );

        self.order.push_back(record.message_id.clone());
        self.current_bytes += size;
        self.entries.insert(record.message_id.clone(), record);
    }

    fn replace_in_place(&mut self, record: TranscriptRecord) {
        let message_id = record.message_id.clone();
        let old_size = self
            .entries
            .get(&message_id)
            .map(TranscriptRecord::estimated_size)
            .unwrap_or(0);
        let new_size = record.estimated_size();

        self.entries.insert(message_id.clone(), record);
        self.current_bytes = self.current_bytes.saturating_sub(old_size) + new_size;

        if new_size > old_size {
            self.evict_until_fits(0, Some(&message_id));
        }

        tracing::trace!(message_id = %message_id, new_size, "cache_correction_applied");
    }

    fn merge_status_update(&mut self, record: TranscriptRecord) {
        let message_id = record.message_id.clone();
        let old_size = self
            .entries
            .get(&message_id)
            .map(TranscriptRecord::estimated_size)
            .unwrap_or(0);

        if let Some(existing) = self.entries.get_mut(&message_id) {
            if record.correction_status.is_some() {
                existing.correction_status = record.correction_status;
            }
        }

        let new_size = self
            .entries
            .get(&message_id)
            .map(TranscriptRecord::estimated_size)
            .unwrap_or(0);
        self.current_bytes = self.current_bytes.saturating_sub(old_size) + new_size;

        if new_size > old_size {
            self.evict_until_fits(0, Some(&message_id));
        }

        tracing::trace!(message_id = %message_id, new_size, "cache_status_update_applied");
    }

    /// Evicts from the oldest end until `current_bytes + required_space <=
    /// budget`. `protect` is never evicted — eviction stops if it becomes
    /// the oldest remaining entry, so a record being updated right now can
    /// never be the one that gets dropped to make room for itself.
    fn evict_until_fits(&mut self, required_space: usize, protect: Option<&MessageId>) {
        let target = self.budget_bytes.saturating_sub(required_space);

        while self.current_bytes > target {
            let Some(oldest) = self.order.front() else {
                break;
            };
            if Some(oldest) == protect {
                break;
            }
            let oldest = self.order.pop_front().unwrap();
            if let Some(evicted) = self.entries.remove(&oldest) {
                let size = evicted.estimated_size();
                self.current_bytes = self.current_bytes.saturating_sub(size);
                tracing::trace!(message_id = %oldest, size_bytes = size, "cache_evict");
            }
        }
    }

    /// Ordered replay for late-joining viewers.
    pub fn history(&self) -> Vec<TranscriptRecord> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.current_bytes = 0;
    }
}

impl Default for TranscriptCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CorrectionStatus;

    fn final_record(ordinal: u64, text: &str) -> TranscriptRecord {
        TranscriptRecord {
            message_id: MessageId::finalized(ordinal, "en"),
            transcription: text.to_string(),
            translation: String::new(),
            source_language: Some("en".into()),
            target_language: Some("en".into()),
            speaker: "Alice".into(),
            kind: RecordType::Final,
            isfinalize: true,
            vtt_timestamp: Some("00:00:00.000 --> 00:00:01.000".into()),
            correction_status: None,
        }
    }

    fn partial_record(ordinal: u64) -> TranscriptRecord {
        let mut r = final_record(ordinal, "partial text");
        r.kind = RecordType::Partial;
        r.isfinalize = false;
        r.vtt_timestamp = None;
        r
    }

    #[test]
    fn partials_are_never_cached() {
        let mut cache = TranscriptCache::new(10);
        cache.process(partial_record(1));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn finals_are_inserted_in_order() {
        let mut cache = TranscriptCache::new(10);
        for i in 1..=3 {
            cache.process(final_record(i, "hi"));
        }
        let history = cache.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message_id, MessageId::finalized(1, "en"));
        assert_eq!(history[2].message_id, MessageId::finalized(3, "en"));
    }

    #[test]
    fn correction_replaces_without_reordering() {
        let mut cache = TranscriptCache::new(10);
        for i in 1..=3 {
            cache.process(final_record(i, "hi"));
        }
        let mut corrected = final_record(1, "hello, world");
        corrected.kind = RecordType::Correction;
        cache.process(corrected);

        let history = cache.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message_id, MessageId::finalized(1, "en"));
        assert_eq!(history[0].transcription, "hello, world");
    }

    #[test]
    fn status_update_merges_correction_status_in_place() {
        let mut cache = TranscriptCache::new(10);
        cache.process(final_record(1, "hi"));

        let patch = TranscriptRecord::status_update(
            MessageId::finalized(1, "en"),
            CorrectionStatus::Correcting,
        );
        cache.process(patch);

        let history = cache.history();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].correction_status,
            Some(CorrectionStatus::Correcting)
        );
        assert_eq!(history[0].transcription, "hi");
    }

    #[test]
    fn oversized_single_record_still_retained_after_evicting_everything() {
        let mut cache = TranscriptCache::new(1); // 1 MiB budget
        for i in 1..=5 {
            cache.process(final_record(i, "short"));
        }
        assert_eq!(cache.size(), 5);

        let huge_text = "x".repeat(2 * 1024 * 1024);
        cache.process(final_record(6, &huge_text));

        let history = cache.history();
        assert_eq!(history.len(), 1, "everything else must be evicted");
        assert_eq!(history[0].message_id, MessageId::finalized(6, "en"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = TranscriptCache::new(10);
        cache.process(final_record(1, "hi"));
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.bytes(), 0);
        assert!(cache.history().is_empty());
    }

    #[quickcheck_macros::quickcheck]
    fn history_matches_insertion_order_given_sufficient_budget(n: u8) -> bool {
        let n = (n % 50) as u64;
        let mut cache = TranscriptCache::new(10);
        for i in 1..=n {
            cache.process(final_record(i, "x"));
        }
        let history = cache.history();
        history
            .iter()
            .enumerate()
            .all(|(idx, r)| r.message_id == MessageId::finalized(idx as u64 + 1, "en"))
    }
}
