//! Read-receipt emission for the visible range.
//!
//! The renderer reports which timeline rows are on screen; this tracker
//! turns that into the minimal set of receipt calls. A message is reported
//! at most once per session no matter how often it scrolls in and out of
//! view.

use std::collections::HashSet;
use std::ops::Range;

use crate::model::{MessageId, UserId};
use crate::timeline::TimelineItem;

/// Deduplicating collector of read receipts.
#[derive(Debug, Default)]
pub struct ReadRangeTracker {
    visited: HashSet<MessageId>,
}

impl ReadRangeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in the visible `range` that still need a receipt from
    /// `local`. Bands, own messages, deleted entries, already-read entries,
    /// and anything previously reported are skipped. Everything returned is
    /// remembered as visited.
    pub fn collect(
        &mut self,
        items: &[TimelineItem],
        range: Range<usize>,
        local: &UserId,
    ) -> Vec<MessageId> {
        let mut due = Vec::new();
        for item in items.iter().skip(range.start).take(range.len()) {
            let TimelineItem::Message(message) = item else {
                continue;
            };
            if message.sender().id == *local
                || message.is_deleted()
                || message.id().is_local()
                || message.is_read_by(local)
                || self.visited.contains(message.id())
            {
                continue;
            }
            self.visited.insert(message.id().clone());
            due.push(message.id().clone());
        }
        due
    }

    /// Forget all visited ids (e.g. after re-login as another user).
    pub fn clear(&mut self) {
        self.visited.clear();
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationKey, Message, UserRef};
    use crate::timeline::band;

    fn local() -> UserId {
        UserId::new("u-1").expect("valid")
    }

    fn message(id: &str, sender: &str, minute: u32) -> Message {
        let ts = format!("2026-03-01T12:{minute:02}:00Z")
            .parse()
            .expect("valid timestamp");
        Message::confirmed(
            MessageId::new(id).expect("valid id"),
            ConversationKey::Shared,
            UserRef::new(UserId::new(sender).expect("valid"), sender.to_string()),
            None,
            Some("text".to_string()),
            None,
            ts,
            ts,
        )
    }

    fn items(messages: Vec<Message>) -> Vec<TimelineItem> {
        band(&messages)
    }

    #[test]
    fn collects_peer_messages_in_range() {
        let rows = items(vec![message("m-1", "u-2", 0), message("m-2", "u-2", 1)]);
        let mut tracker = ReadRangeTracker::new();

        let due = tracker.collect(&rows, 0..rows.len(), &local());
        let ids: Vec<&str> = due.iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
    }

    #[test]
    fn overlapping_ranges_emit_each_id_once() {
        let messages: Vec<Message> = (0..16).map(|i| message(&format!("m-{i}"), "u-2", i)).collect();
        let rows = items(messages);
        let mut tracker = ReadRangeTracker::new();

        let first = tracker.collect(&rows, 0..11, &local());
        let second = tracker.collect(&rows, 5..rows.len(), &local());

        let mut all: Vec<MessageId> = first.into_iter().chain(second).collect();
        let before_dedup = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before_dedup, "no id may be reported twice");
        assert_eq!(all.len(), 16);
    }

    #[test]
    fn skips_own_deleted_and_already_read() {
        let own = message("m-1", "u-1", 0);
        let mut deleted = message("m-2", "u-2", 1);
        deleted = deleted.with_flags(false, true, false);
        let read = message("m-3", "u-2", 2).with_read_by([local()]);
        let fresh = message("m-4", "u-2", 3);

        let rows = items(vec![own, deleted, read, fresh]);
        let mut tracker = ReadRangeTracker::new();

        let due = tracker.collect(&rows, 0..rows.len(), &local());
        let ids: Vec<&str> = due.iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["m-4"]);
    }

    #[test]
    fn bands_are_ignored() {
        let rows = items(vec![message("m-1", "u-2", 0)]);
        assert!(rows[0].is_band(), "fixture expects a leading day band");
        let mut tracker = ReadRangeTracker::new();

        // Range covering only the band yields nothing.
        assert!(tracker.collect(&rows, 0..1, &local()).is_empty());
    }

    #[test]
    fn out_of_bounds_range_is_safe() {
        let rows = items(vec![message("m-1", "u-2", 0)]);
        let mut tracker = ReadRangeTracker::new();
        let due = tracker.collect(&rows, 0..999, &local());
        assert_eq!(due.len(), 1);
    }
}
