//! Message domain types.
//!
//! A [`Message`] is the unit the repository stores and the renderer draws.
//! Construction goes through the smart constructors; mutation goes through
//! the named methods the repository calls, so lifecycle transitions and the
//! soft-delete invariant are enforced in one place.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::model::{ConversationKey, MessageId, UserId};

// ===== Lifecycle =====

/// Confirmation state of a message relative to the server.
///
/// Only the transitions the repository performs are legal:
/// `Optimistic -> Confirmed` (finalize) and `Optimistic -> Failed` (fail).
/// Retrying a failed send moves it back to `Optimistic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Locally created, awaiting server confirmation.
    Optimistic,
    /// Acknowledged by the server (or delivered by it in the first place).
    Confirmed,
    /// The send attempt failed; the entry stays visible for retry.
    Failed,
}

// ===== Media =====

/// Media category the upload collaborator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Audio clip; carries a duration.
    Audio,
}

impl MediaKind {
    /// Parse the wire form (`"image"`, `"video"`, `"audio"`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Canonical wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Media attached to a message.
///
/// The upload pipeline guarantees a stable URL and a known kind; audio
/// additionally carries its duration in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    /// Stable URL produced by the upload collaborator.
    pub url: String,
    /// Media category.
    pub kind: MediaKind,
    /// Duration in seconds (audio only).
    pub duration_secs: Option<u32>,
}

// ===== UserRef =====

/// Display reference to a user as embedded in message DTOs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    /// Stable user id.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Optional avatar URL.
    pub avatar_url: Option<String>,
}

impl UserRef {
    /// Build a reference from id and display name.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar_url: None,
        }
    }

    /// Attach an avatar URL (builder pattern).
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

// ===== Message =====

/// A single chat message.
///
/// Identity is the [`MessageId`]; within one conversation the repository
/// keeps ids unique at all times. Soft-deleted messages stay in the list
/// with their payload redacted so scroll anchors remain stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    conversation: ConversationKey,
    sender: UserRef,
    receiver: Option<UserRef>,
    content: Option<String>,
    media: Option<MediaAttachment>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_edited: bool,
    is_deleted: bool,
    is_pinned: bool,
    is_private: bool,
    read_by: BTreeSet<UserId>,
    lifecycle: Lifecycle,
}

impl Message {
    /// Build a server-confirmed message.
    ///
    /// Used by the wire normalizer and by tests. The sender is never a
    /// member of its own `read_by` set; stray entries are filtered here.
    #[allow(clippy::too_many_arguments)]
    pub fn confirmed(
        id: MessageId,
        conversation: ConversationKey,
        sender: UserRef,
        receiver: Option<UserRef>,
        content: Option<String>,
        media: Option<MediaAttachment>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let is_private = !conversation.is_shared();
        Self {
            id,
            conversation,
            sender,
            receiver,
            content,
            media,
            created_at,
            updated_at,
            is_edited: false,
            is_deleted: false,
            is_pinned: false,
            is_private,
            read_by: BTreeSet::new(),
            lifecycle: Lifecycle::Confirmed,
        }
    }

    /// Build an optimistic local message for a send in flight.
    ///
    /// The id must be a temporary (`local-`) id; timestamps are set to now.
    pub fn optimistic(
        id: MessageId,
        conversation: ConversationKey,
        sender: UserRef,
        receiver: Option<UserRef>,
        content: Option<String>,
        media: Option<MediaAttachment>,
    ) -> Self {
        let now = Utc::now();
        let is_private = !conversation.is_shared();
        Self {
            id,
            conversation,
            sender,
            receiver,
            content,
            media,
            created_at: now,
            updated_at: now,
            is_edited: false,
            is_deleted: false,
            is_pinned: false,
            is_private,
            read_by: BTreeSet::new(),
            lifecycle: Lifecycle::Optimistic,
        }
    }

    // ===== Accessors =====

    /// Message identity.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Conversation this message belongs to.
    pub fn conversation(&self) -> &ConversationKey {
        &self.conversation
    }

    /// Message author.
    pub fn sender(&self) -> &UserRef {
        &self.sender
    }

    /// Private-message peer, if any.
    pub fn receiver(&self) -> Option<&UserRef> {
        self.receiver.as_ref()
    }

    /// Text content; `None` after soft delete or for media-only messages.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Attached media; cleared on soft delete.
    pub fn media(&self) -> Option<&MediaAttachment> {
        self.media.as_ref()
    }

    /// Creation timestamp (server clock once confirmed).
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-update timestamp.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the content has been edited.
    pub fn is_edited(&self) -> bool {
        self.is_edited
    }

    /// Whether the message has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Whether the message is pinned in its conversation.
    pub fn is_pinned(&self) -> bool {
        self.is_pinned
    }

    /// Whether the message belongs to a private conversation.
    pub fn is_private(&self) -> bool {
        self.is_private
    }

    /// Users who have read this message. The sender is never included.
    pub fn read_by(&self) -> &BTreeSet<UserId> {
        &self.read_by
    }

    /// Confirmation state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// True when a given reader has already read this message.
    pub fn is_read_by(&self, reader: &UserId) -> bool {
        self.read_by.contains(reader)
    }

    // ===== Builder-style adjustments (construction paths only) =====

    /// Set edit/delete/pin flags from the wire (builder pattern).
    pub fn with_flags(mut self, is_edited: bool, is_deleted: bool, is_pinned: bool) -> Self {
        self.is_edited = is_edited;
        self.is_deleted = is_deleted;
        self.is_pinned = is_pinned;
        self
    }

    /// Replace the read set from the wire, excluding the sender.
    pub fn with_read_by(mut self, readers: impl IntoIterator<Item = UserId>) -> Self {
        self.read_by = readers
            .into_iter()
            .filter(|reader| *reader != self.sender.id)
            .collect();
        self
    }

    // ===== Mutations (repository only) =====

    /// Overwrite this entry with a newer DTO for the same id.
    ///
    /// Identity and list position are preserved by the caller; this merges
    /// payload, flags, and read state.
    pub(crate) fn apply_update(&mut self, newer: Message) {
        debug_assert_eq!(self.id, newer.id, "update must target the same identity");
        *self = newer;
    }

    /// Soft delete: redact the payload, keep the entity and its position.
    pub(crate) fn redact(&mut self, at: DateTime<Utc>) {
        self.content = None;
        self.media = None;
        self.is_deleted = true;
        self.updated_at = at;
    }

    /// Record a read receipt. No-op for the sender's own receipt.
    pub(crate) fn add_reader(&mut self, reader: UserId) -> bool {
        if reader == self.sender.id {
            return false;
        }
        self.read_by.insert(reader)
    }

    /// Toggle the pinned flag.
    pub(crate) fn set_pinned(&mut self, pinned: bool) -> bool {
        let changed = self.is_pinned != pinned;
        self.is_pinned = pinned;
        changed
    }

    /// Lifecycle transition used by finalize/fail/retry.
    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }
}

// ===== Tests =====
