//! Virtualized layout: variable-height rows behind a measurement cache.
//!
//! The timeline can hold tens of thousands of rows; only the viewport's
//! worth is ever measured or drawn. Measured heights are cached by item key
//! so they survive regrouping, and remeasurements are coalesced into one
//! index rebuild per frame via [`VirtualLayout::flush`].

use std::collections::HashMap;
use std::ops::Range;

use crate::timeline::TimelineItem;
use crate::view_state::height_index::HeightIndex;

/// Default height assumed for rows that have never been measured.
pub const DEFAULT_ESTIMATE_ROWS: u16 = 2;

/// Layout state for one conversation's banded timeline.
#[derive(Debug)]
pub struct VirtualLayout {
    keys: Vec<String>,
    positions: HashMap<String, usize>,
    index: HeightIndex,
    measured: HashMap<String, u16>,
    dirty_from: Option<usize>,
    estimate: u16,
}

impl VirtualLayout {
    /// New layout using `estimate` rows for unmeasured items.
    pub fn new(estimate: u16) -> Self {
        Self {
            keys: Vec::new(),
            positions: HashMap::new(),
            index: HeightIndex::default(),
            measured: HashMap::new(),
            dirty_from: None,
            estimate: estimate.max(1),
        }
    }

    /// Number of rows in the current timeline.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the timeline is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rebuild the row list from a freshly banded timeline.
    ///
    /// Cached measurements are reused by key, so rows that merely moved
    /// keep their real height and only genuinely new rows fall back to the
    /// estimate.
    pub fn reconcile(&mut self, items: &[TimelineItem]) {
        self.keys.clear();
        self.positions.clear();
        self.index.clear();
        self.dirty_from = None;

        for (position, item) in items.iter().enumerate() {
            let key = item.key();
            let height = self.measured.get(&key).copied().unwrap_or(self.estimate);
            self.index.push(height);
            self.positions.insert(key.clone(), position);
            self.keys.push(key);
        }
    }

    /// Record a real measurement for one row.
    ///
    /// The fenwick index is not touched yet; changes accumulate until
    /// [`Self::flush`] so a burst of measurements costs one pass.
    /// Returns whether the height actually changed.
    pub fn record_measured(&mut self, index: usize, height: u16) -> bool {
        let Some(key) = self.keys.get(index) else {
            return false;
        };
        let height = height.max(1);
        if self.index.height_at(index) == height
            && self.measured.get(key).copied() == Some(height)
        {
            return false;
        }
        self.measured.insert(key.clone(), height);
        self.dirty_from = Some(self.dirty_from.map_or(index, |d| d.min(index)));
        true
    }

    /// Apply all pending measurements in one pass.
    ///
    /// Returns the smallest affected index, which is what the caller needs
    /// to keep the scroll offset stable when rows above the viewport grew
    /// or shrank. `None` when nothing was pending.
    pub fn flush(&mut self) -> Option<usize> {
        let from = self.dirty_from.take()?;
        for position in from..self.keys.len() {
            let height = self
                .measured
                .get(&self.keys[position])
                .copied()
                .unwrap_or(self.estimate);
            self.index.set(position, height);
        }
        Some(from)
    }

    /// Height currently assumed for one row.
    pub fn height_at(&self, index: usize) -> u16 {
        self.index.height_at(index)
    }

    /// Top edge of one row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn offset_of(&self, index: usize) -> usize {
        self.index.offset_of(index)
    }

    /// Total content height in rows.
    pub fn total_rows(&self) -> usize {
        self.index.total()
    }

    /// Largest scroll offset that still fills the viewport.
    pub fn max_scroll(&self, viewport_rows: u16) -> usize {
        self.total_rows().saturating_sub(usize::from(viewport_rows))
    }

    /// Half-open index range of rows intersecting the viewport.
    pub fn visible_range(&self, scroll_offset: usize, viewport_rows: u16) -> Range<usize> {
        if self.is_empty() || viewport_rows == 0 {
            return 0..0;
        }
        let last_index = self.keys.len() - 1;
        let first = self
            .index
            .index_at_offset(scroll_offset)
            .unwrap_or(last_index);
        let bottom_offset = scroll_offset + usize::from(viewport_rows) - 1;
        let last = self.index.index_at_offset(bottom_offset).unwrap_or(last_index);
        first..last + 1
    }

    /// Key of a row.
    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Position of a key in the current timeline.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }
}

impl Default for VirtualLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ESTIMATE_ROWS)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationKey, Message, MessageId, UserId, UserRef};
    use crate::timeline::band;

    fn message(id: &str, minute: u32) -> Message {
        let ts = format!("2026-03-01T12:{minute:02}:00Z")
            .parse()
            .expect("valid timestamp");
        Message::confirmed(
            MessageId::new(id).expect("valid id"),
            ConversationKey::Shared,
            UserRef::new(UserId::new("u-2").expect("valid"), "peer".to_string()),
            None,
            Some("text".to_string()),
            None,
            ts,
            ts,
        )
    }

    fn layout_of(count: usize) -> (VirtualLayout, Vec<TimelineItem>) {
        let messages: Vec<Message> =
            (0..count).map(|i| message(&format!("m-{i}"), i as u32)).collect();
        let items = band(&messages);
        let mut layout = VirtualLayout::new(2);
        layout.reconcile(&items);
        (layout, items)
    }

    #[test]
    fn reconcile_assigns_estimate_to_unmeasured_rows() {
        let (layout, items) = layout_of(3);
        assert_eq!(layout.len(), items.len());
        assert_eq!(layout.total_rows(), items.len() * 2);
    }

    #[test]
    fn measurements_survive_regrouping_by_key() {
        let (mut layout, items) = layout_of(3);
        let target = layout.index_of("msg:m-1").expect("present");
        layout.record_measured(target, 7);
        layout.flush();

        // New timeline with an extra message; m-1 moved but keeps its height.
        let mut messages: Vec<Message> =
            (0..4).map(|i| message(&format!("m-{i}"), i as u32)).collect();
        messages.rotate_left(0);
        let items2 = band(&messages);
        layout.reconcile(&items2);

        assert_ne!(items.len(), items2.len());
        let moved = layout.index_of("msg:m-1").expect("still present");
        assert_eq!(layout.height_at(moved), 7);
    }

    #[test]
    fn flush_reports_smallest_affected_index() {
        let (mut layout, _) = layout_of(10);
        layout.record_measured(6, 5);
        layout.record_measured(3, 4);
        layout.record_measured(8, 1);

        assert_eq!(layout.flush(), Some(3));
        assert_eq!(layout.flush(), None, "second flush has nothing pending");
        assert_eq!(layout.height_at(3), 4);
        assert_eq!(layout.height_at(6), 5);
        assert_eq!(layout.height_at(8), 1);
    }

    #[test]
    fn repeat_measurement_of_same_height_is_not_dirty() {
        let (mut layout, _) = layout_of(3);
        layout.record_measured(1, 2);
        layout.flush();
        assert!(!layout.record_measured(1, 2));
        assert_eq!(layout.flush(), None);
    }

    #[test]
    fn visible_range_covers_the_viewport() {
        let (mut layout, _) = layout_of(20);
        layout.flush();
        // All rows are 2 high; a 10-row viewport at offset 0 shows rows 0..5.
        assert_eq!(layout.visible_range(0, 10), 0..5);
        // Offset 3 straddles row 1 through row 6.
        assert_eq!(layout.visible_range(3, 10), 1..7);
    }

    #[test]
    fn visible_range_clamps_past_the_end() {
        let (layout, items) = layout_of(5);
        let range = layout.visible_range(10_000, 10);
        assert_eq!(range.end, items.len());
        assert!(range.start < range.end);
    }

    #[test]
    fn empty_layout_yields_empty_range() {
        let layout = VirtualLayout::default();
        assert_eq!(layout.visible_range(0, 24), 0..0);
        assert_eq!(layout.max_scroll(24), 0);
    }

    #[test]
    fn max_scroll_accounts_for_viewport() {
        let (layout, items) = layout_of(20);
        let total = items.len() * 2;
        assert_eq!(layout.max_scroll(10), total - 10);
        assert_eq!(layout.max_scroll(u16::MAX), 0);
    }
}
