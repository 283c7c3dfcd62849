//! Per-conversation view persistence and scroll restoration.
//!
//! Switching conversations must bring back the exact reading position, but
//! the timeline may not be hydrated yet when the switch happens. Restores
//! are therefore two-phase: the switch registers an intent, and each frame
//! polls until the anchor message is locatable or the deadline passes, at
//! which point the raw offset (or bottom) is the fallback.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::{ConversationKey, MessageId};

/// Offsets within this many rows of max scroll count as "at bottom".
pub const BOTTOM_PROXIMITY_ROWS: usize = 3;

/// How long a restore waits for its anchor before falling back.
pub const ANCHOR_RESTORE_DEADLINE: Duration = Duration::from_millis(1_500);

/// Gap kept between the viewport top and a restored anchor.
pub const ANCHOR_TOP_GAP_ROWS: usize = 2;

/// Minimum interval between throttled captures.
pub const CAPTURE_THROTTLE: Duration = Duration::from_millis(200);

/// Snapshot of one conversation's reading position.
#[derive(Debug, Clone)]
pub struct ConversationView {
    /// Absolute row offset at capture time.
    pub scroll_offset: usize,
    /// Topmost visible message, the preferred restore target.
    pub anchor: Option<MessageId>,
    /// Whether the viewport was tailing the newest content.
    pub at_bottom: bool,
}

/// How a finished restore positions the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Tail the newest content.
    Bottom,
    /// Anchor located; scroll so this item sits near the viewport top.
    AnchorFound {
        /// Current index of the anchor item.
        index: usize,
    },
    /// Anchor never showed up; reuse the raw saved offset.
    FallbackOffset(usize),
}

#[derive(Debug)]
struct PendingRestore {
    anchor: MessageId,
    fallback_offset: usize,
    deadline: Instant,
}

/// Saved views for every conversation visited this session.
#[derive(Debug)]
pub struct ViewMemory {
    views: HashMap<ConversationKey, ConversationView>,
    pending: Option<PendingRestore>,
    last_capture: Option<Instant>,
    anchor_deadline: Duration,
}

impl Default for ViewMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewMemory {
    /// Empty memory with the default anchor deadline.
    pub fn new() -> Self {
        Self::with_anchor_deadline(ANCHOR_RESTORE_DEADLINE)
    }

    /// Empty memory with a custom anchor deadline.
    pub fn with_anchor_deadline(anchor_deadline: Duration) -> Self {
        Self {
            views: HashMap::new(),
            pending: None,
            last_capture: None,
            anchor_deadline,
        }
    }

    /// Capture the current position, rate-limited for scroll spam.
    ///
    /// Captures are suppressed entirely while a restore is in flight, so
    /// the transient positions of the restore itself never overwrite the
    /// snapshot being restored. Returns whether the capture was taken.
    pub fn capture_throttled(
        &mut self,
        now: Instant,
        conversation: &ConversationKey,
        view: ConversationView,
    ) -> bool {
        if self.pending.is_some() {
            return false;
        }
        if let Some(last) = self.last_capture {
            if now.duration_since(last) < CAPTURE_THROTTLE {
                return false;
            }
        }
        self.last_capture = Some(now);
        self.views.insert(conversation.clone(), view);
        true
    }

    /// Capture unconditionally (conversation switch, shutdown).
    pub fn capture(&mut self, now: Instant, conversation: &ConversationKey, view: ConversationView) {
        self.last_capture = Some(now);
        self.views.insert(conversation.clone(), view);
    }

    /// Start restoring a conversation's position.
    ///
    /// Returns an immediate outcome when no waiting is needed: first visit
    /// and bottom-pinned views both resolve to [`RestoreOutcome::Bottom`]
    /// right away. Otherwise a pending restore is registered and `None` is
    /// returned; poll each frame.
    pub fn begin_restore(
        &mut self,
        now: Instant,
        conversation: &ConversationKey,
    ) -> Option<RestoreOutcome> {
        self.pending = None;
        let view = match self.views.get(conversation) {
            None => return Some(RestoreOutcome::Bottom),
            Some(view) => view.clone(),
        };
        if view.at_bottom {
            return Some(RestoreOutcome::Bottom);
        }
        let Some(anchor) = view.anchor else {
            return Some(RestoreOutcome::FallbackOffset(view.scroll_offset));
        };
        self.pending = Some(PendingRestore {
            anchor,
            fallback_offset: view.scroll_offset,
            deadline: now + self.anchor_deadline,
        });
        None
    }

    /// Advance a pending restore.
    ///
    /// `locate` maps the anchor message to its current timeline index, if
    /// the message is present yet. Returns `Some` exactly once per restore.
    pub fn poll_restore<F>(&mut self, now: Instant, locate: F) -> Option<RestoreOutcome>
    where
        F: Fn(&MessageId) -> Option<usize>,
    {
        let pending = self.pending.as_ref()?;
        if let Some(index) = locate(&pending.anchor) {
            self.pending = None;
            return Some(RestoreOutcome::AnchorFound { index });
        }
        if now >= pending.deadline {
            debug!(anchor = %pending.anchor, "anchor restore deadline passed, falling back to offset");
            let offset = pending.fallback_offset;
            self.pending = None;
            return Some(RestoreOutcome::FallbackOffset(offset));
        }
        None
    }

    /// Whether a restore is waiting on its anchor.
    pub fn is_restoring(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the saved view of one conversation.
    pub fn forget(&mut self, conversation: &ConversationKey) {
        self.views.remove(conversation);
    }
}

// ===== Tests =====
