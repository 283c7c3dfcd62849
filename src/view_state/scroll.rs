//! Semantic scroll position.
//!
//! A sum type that preserves scroll intent across relayouts: `Bottom`
//! keeps tailing new messages no matter how heights change, `AtItem`
//! survives remeasurement because it re-resolves through the item's
//! current offset. Everything resolves to a clamped absolute row offset.

use crate::view_state::layout::VirtualLayout;
use crate::view_state::types::ItemIndex;

/// Where the viewport is anchored within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPosition {
    /// Pinned to the very top.
    Top,
    /// Pinned to the newest content; stays pinned as rows arrive.
    Bottom,
    /// A specific absolute row offset.
    AtRow(usize),
    /// Keep one item near the top of the viewport.
    AtItem {
        /// The anchored item.
        index: ItemIndex,
        /// Rows between the viewport top and the item's top edge.
        offset_rows: usize,
    },
}

impl Default for ScrollPosition {
    fn default() -> Self {
        Self::Bottom
    }
}

impl ScrollPosition {
    /// Anchor to an item with its top at the viewport top.
    pub fn at_item(index: ItemIndex) -> Self {
        Self::AtItem {
            index,
            offset_rows: 0,
        }
    }

    /// Resolve to an absolute row offset, clamped to
    /// `[0, max(0, total - viewport)]` so the viewport is never blank.
    pub fn resolve(&self, layout: &VirtualLayout, viewport_rows: u16) -> usize {
        let max_scroll = layout.max_scroll(viewport_rows);
        let requested = match self {
            Self::Top => 0,
            Self::Bottom => max_scroll,
            Self::AtRow(offset) => *offset,
            Self::AtItem { index, offset_rows } => {
                if layout.is_empty() {
                    0
                } else {
                    let clamped_index = index.get().min(layout.len() - 1);
                    layout.offset_of(clamped_index).saturating_sub(*offset_rows)
                }
            }
        };
        requested.min(max_scroll)
    }

    /// Whether this position tails new content.
    pub fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom)
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

    /// 1 day band + `count` messages, every row 2 high.
    fn layout_of(count: usize) -> VirtualLayout {
        let messages: Vec<Message> =
            (0..count).map(|i| message(&format!("m-{i}"), i as u32)).collect();
        let mut layout = VirtualLayout::new(2);
        layout.reconcile(&band(&messages));
        layout
    }

    #[test]
    fn default_is_bottom() {
        assert_eq!(ScrollPosition::default(), ScrollPosition::Bottom);
    }

    #[test]
    fn top_resolves_to_zero() {
        let layout = layout_of(20);
        assert_eq!(ScrollPosition::Top.resolve(&layout, 10), 0);
    }

    #[test]
    fn bottom_resolves_to_total_minus_viewport() {
        let layout = layout_of(20); // 21 rows * 2 = 42
        assert_eq!(ScrollPosition::Bottom.resolve(&layout, 10), 32);
    }

    #[test]
    fn bottom_of_short_content_resolves_to_zero() {
        let layout = layout_of(2); // 3 rows * 2 = 6, viewport 10
        assert_eq!(ScrollPosition::Bottom.resolve(&layout, 10), 0);
    }

    #[test]
    fn at_row_clamps_to_max_scroll() {
        let layout = layout_of(20);
        assert_eq!(ScrollPosition::AtRow(5).resolve(&layout, 10), 5);
        assert_eq!(ScrollPosition::AtRow(9_999).resolve(&layout, 10), 32);
    }

    #[test]
    fn at_item_lands_on_the_item_top_edge() {
        let layout = layout_of(20);
        let pos = ScrollPosition::at_item(ItemIndex::new(5));
        assert_eq!(pos.resolve(&layout, 10), 10);
    }

    #[test]
    fn at_item_honors_offset_rows() {
        let layout = layout_of(20);
        let pos = ScrollPosition::AtItem {
            index: ItemIndex::new(5),
            offset_rows: 3,
        };
        assert_eq!(pos.resolve(&layout, 10), 7);
    }

    #[test]
    fn at_item_past_the_end_clamps_to_last_item() {
        let layout = layout_of(20);
        let pos = ScrollPosition::at_item(ItemIndex::new(999));
        assert_eq!(pos.resolve(&layout, 10), 32, "clamped to max scroll");
    }

    #[test]
    fn empty_layout_always_resolves_to_zero() {
        let layout = VirtualLayout::new(2);
        for pos in [
            ScrollPosition::Top,
            ScrollPosition::Bottom,
            ScrollPosition::AtRow(7),
            ScrollPosition::at_item(ItemIndex::new(3)),
        ] {
            assert_eq!(pos.resolve(&layout, 10), 0);
        }
    }

    #[test]
    fn at_item_survives_height_change_above() {
        let messages: Vec<Message> =
            (0..20).map(|i| message(&format!("m-{i}"), i as u32)).collect();
        let mut layout = VirtualLayout::new(2);
        layout.reconcile(&band(&messages));

        let pos = ScrollPosition::at_item(ItemIndex::new(10));
        let before = pos.resolve(&layout, 10);

        // An item above the anchor grows by 6 rows.
        layout.record_measured(2, 8);
        layout.flush();

        assert_eq!(pos.resolve(&layout, 10), before + 6, "anchor follows its item");
    }
}
