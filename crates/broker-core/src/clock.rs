use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ids::MessageId;

/// Produces session-relative WebVTT timestamps.
///
/// Zeroed at construction; `mark_start`/`complete` are driven by the
/// orchestrator's utterance state machine.
pub struct TimestampClock {
    zero: Instant,
    starts: HashMap<MessageId, Instant>,
}

impl TimestampClock {
    pub fn new() -> Self {
        Self {
            zero: Instant::now(),
            starts: HashMap::new(),
        }
    }

    /// Records the wall-clock of the first observed partial for an utterance.
    /// Idempotent: the first call wins.
    pub fn mark_start(&mut self, message_id: &MessageId) {
        self.starts
            .entry(message_id.clone())
            .or_insert_with(Instant::now);
    }

    /// Computes the VTT interval for a finalized utterance and forgets the
    /// start mark. If `complete` is called without a prior `mark_start`,
    /// start is set equal to end.
    pub fn complete(&mut self, message_id: &MessageId) -> String {
        let end = Instant::now();
        let start = self.starts.remove(message_id).unwrap_or(end);
        let start = start.max(self.zero);
        let end = end.max(start);

        format!(
            "{} --> {}",
            format_offset(start.duration_since(self.zero)),
            format_offset(end.duration_since(self.zero)),
        )
    }
}

impl Default for TimestampClock {
    fn default() -> Self {
        Self::new()
    }
}

fn format_offset(d: Duration) -> String {
    let total_ms = d.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_without_mark_start_has_zero_duration_interval() {
        let mut clock = TimestampClock::new();
        let id = MessageId::raw("1_en");
        let vtt = clock.complete(&id);
        let (start, end) = vtt.split_once(" --> ").unwrap();
        assert_eq!(start, end);
    }

    #[test]
    fn mark_start_is_idempotent() {
        let mut clock = TimestampClock::new();
        let id = MessageId::raw("1_en");
        clock.mark_start(&id);
        let first = clock.starts.get(&id).copied().unwrap();
        clock.mark_start(&id);
        let second = clock.starts.get(&id).copied().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn end_never_precedes_start() {
        let mut clock = TimestampClock::new();
        let id = MessageId::raw("1_en");
        clock.mark_start(&id);
        let vtt = clock.complete(&id);
        let (start, end) = vtt.split_once(" --> ").unwrap();
        assert!(end >= start);
    }

    #[test]
    fn formats_hours_beyond_100() {
        let d = Duration::from_secs(101 * 3600 + 2 * 60 + 3) + Duration::from_millis(4);
        assert_eq!(format_offset(d), "101:02:03.004");
    }
}
