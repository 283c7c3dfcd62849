//! Transient user-facing notices (send failures, reconnects, auth).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a notice stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(6);

/// Maximum notices kept at once; older ones are dropped first.
pub const NOTIFICATION_CAP: usize = 5;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Informational (reconnected, message pinned).
    Info,
    /// Degraded but recoverable (offline, send failed with retry).
    Warn,
    /// Requires user action (auth rejected, reconnect exhausted).
    Error,
}

/// One transient notice.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Display text.
    pub text: String,
    /// Severity.
    pub level: NoticeLevel,
    created: Instant,
}

/// Bounded queue of auto-expiring notices.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    entries: VecDeque<Notice>,
}

impl NotificationQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a notice, evicting the oldest when over capacity.
    pub fn push(&mut self, now: Instant, level: NoticeLevel, text: impl Into<String>) {
        if self.entries.len() >= NOTIFICATION_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(Notice {
            text: text.into(),
            level,
            created: now,
        });
    }

    /// Drop expired notices.
    pub fn expire(&mut self, now: Instant) {
        self.entries
            .retain(|notice| now.duration_since(notice.created) < NOTIFICATION_TTL);
    }

    /// Currently visible notices, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter()
    }

    /// Whether anything is showing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_expire() {
        let mut queue = NotificationQueue::new();
        let now = Instant::now();
        queue.push(now, NoticeLevel::Warn, "offline");

        queue.expire(now + Duration::from_secs(1));
        assert_eq!(queue.visible().count(), 1);

        queue.expire(now + NOTIFICATION_TTL);
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut queue = NotificationQueue::new();
        let now = Instant::now();
        for i in 0..NOTIFICATION_CAP + 2 {
            queue.push(now, NoticeLevel::Info, format!("n-{i}"));
        }

        assert_eq!(queue.visible().count(), NOTIFICATION_CAP);
        let first = queue.visible().next().expect("non-empty");
        assert_eq!(first.text, "n-2");
    }
}
