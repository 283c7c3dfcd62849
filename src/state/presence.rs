//! Online-presence roster.
//!
//! Fed by the channel's presence snapshot on connect and deltas afterwards.
//! The roster is display state only; message flow never depends on it.

use std::collections::HashMap;

use crate::model::{UserId, UserRef};
use crate::wire::UserDto;

/// Presence status of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    /// Connected to the channel.
    Online,
    /// Not connected.
    Offline,
}

impl PresenceStatus {
    /// Parse the wire status string; unknown strings read as offline.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Who is currently online.
#[derive(Debug, Default)]
pub struct PresenceRoster {
    online: HashMap<UserId, UserRef>,
}

impl PresenceRoster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a full snapshot. Entries with invalid ids
    /// are skipped.
    pub fn apply_list(&mut self, users: &[UserDto]) {
        self.online.clear();
        for dto in users {
            let Ok(id) = UserId::new(dto.id.clone()) else {
                continue;
            };
            if dto
                .status
                .as_deref()
                .is_some_and(|s| PresenceStatus::parse(s) == PresenceStatus::Offline)
            {
                continue;
            }
            let username = dto.username.clone().unwrap_or_else(|| dto.id.clone());
            let mut user = UserRef::new(id.clone(), username);
            if let Some(avatar) = &dto.avatar {
                user = user.with_avatar(avatar.clone());
            }
            self.online.insert(id, user);
        }
    }

    /// Apply a single status delta.
    pub fn apply_change(&mut self, user_id: &str, status: &str) {
        let Ok(id) = UserId::new(user_id.to_string()) else {
            return;
        };
        match PresenceStatus::parse(status) {
            PresenceStatus::Online => {
                self.online
                    .entry(id.clone())
                    .or_insert_with(|| UserRef::new(id, user_id.to_string()));
            }
            PresenceStatus::Offline => {
                self.online.remove(&id);
            }
        }
    }

    /// Whether a user is online.
    pub fn is_online(&self, id: &UserId) -> bool {
        self.online.contains_key(id)
    }

    /// Number of online users.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Online users, unordered.
    pub fn online_users(&self) -> impl Iterator<Item = &UserRef> {
        self.online.values()
    }
}

// ===== Tests =====
