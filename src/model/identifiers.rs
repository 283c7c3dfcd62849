//! Core identifier newtypes with smart constructors.
//!
//! All identifiers validate non-empty strings at construction time.
//! Raw constructors are never exported - use smart constructors only.

use std::fmt;

/// Prefix carried by client-generated temporary message identifiers.
///
/// A message holding a `local-` id has not been confirmed by the server yet;
/// the pending table maps it back to its conversation until the send resolves.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Smart constructor: validates non-empty user ID
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidUserId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidUserId::Empty);
        }
        Ok(Self(raw))
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a message.
///
/// Server-assigned ids are opaque stable strings. Client-generated temporary
/// ids carry the [`LOCAL_ID_PREFIX`] so that a pending send is logically
/// distinguishable until the server confirms or rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Smart constructor: validates non-empty message ID
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidMessageId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidMessageId::Empty);
        }
        Ok(Self(raw))
    }

    /// Mint a fresh temporary id for an optimistic send.
    ///
    /// The sequence number is supplied by the caller (the session keeps a
    /// monotonic counter) so ids stay unique within the process.
    pub fn temp(sequence: u64) -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{sequence}"))
    }

    /// True when this id was minted locally and is still unconfirmed.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier distinguishing the shared broadcast conversation from a
/// specific peer-to-peer conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// The shared broadcast conversation every client participates in.
    Shared,
    /// A private conversation with one peer.
    Private(UserId),
}

impl ConversationKey {
    /// Parse a conversation key from its wire form
    /// (`"general"` or `"private:<peerId>"`).
    pub fn parse(raw: &str) -> Result<Self, InvalidConversationKey> {
        if raw == "general" {
            return Ok(Self::Shared);
        }
        match raw.strip_prefix("private:") {
            Some(peer) if !peer.is_empty() => {
                let peer = UserId::new(peer).map_err(|_| InvalidConversationKey::EmptyPeer)?;
                Ok(Self::Private(peer))
            }
            Some(_) => Err(InvalidConversationKey::EmptyPeer),
            None => Err(InvalidConversationKey::UnknownForm(raw.to_string())),
        }
    }

    /// The peer on the other side, when this is a private conversation.
    pub fn peer(&self) -> Option<&UserId> {
        match self {
            Self::Shared => None,
            Self::Private(peer) => Some(peer),
        }
    }

    /// True for the shared broadcast conversation.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("general"),
            Self::Private(peer) => write!(f, "private:{peer}"),
        }
    }
}

// ===== Error Types =====

/// Rejection reasons for [`UserId::new`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidUserId {
    /// The raw string was empty.
    #[error("user ID cannot be empty")]
    Empty,
}

/// Rejection reasons for [`MessageId::new`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidMessageId {
    /// The raw string was empty.
    #[error("message ID cannot be empty")]
    Empty,
}

/// Rejection reasons for [`ConversationKey::parse`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidConversationKey {
    /// `private:` form with nothing after the colon.
    #[error("private conversation key is missing the peer id")]
    EmptyPeer,
    /// Neither `general` nor a `private:<peerId>` form.
    #[error("unknown conversation key form: {0:?}")]
    UnknownForm(String),
}

// ===== Tests =====
