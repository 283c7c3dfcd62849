//! Session state: orchestration, presence, notifications.

pub mod notifications;
pub mod presence;
pub mod session;

pub use notifications::{NoticeLevel, NotificationQueue, NOTIFICATION_CAP, NOTIFICATION_TTL};
pub use presence::{PresenceRoster, PresenceStatus};
pub use session::{ConnectionHealth, Session, SessionMsg};
