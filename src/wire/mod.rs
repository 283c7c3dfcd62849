//! Wire boundary: loose DTOs normalized into the fixed domain shape.
//!
//! Everything that crosses the REST or channel boundary is dynamically
//! typed JSON. This module owns the only code that looks at raw payloads;
//! downstream code sees [`Message`] and the typed event enums, never
//! `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    ConversationKey, MediaAttachment, MediaKind, Message, MessageId, UserId, UserRef,
};

// ===== DTOs =====

/// User reference as the server serializes it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    /// Stable user id.
    pub id: String,
    /// Display name; may be absent on partial payloads.
    #[serde(default)]
    pub username: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Presence status string (`"online"` / `"offline"`), presence events only.
    #[serde(default)]
    pub status: Option<String>,
}

/// Message as the server serializes it.
///
/// Every field the server might omit is optional here; [`normalize_message`]
/// decides what is actually required.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    /// Server-assigned id.
    pub id: String,
    /// Author.
    pub sender: UserDto,
    /// Private-message peer.
    #[serde(default)]
    pub receiver: Option<UserDto>,
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Media URL.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Media kind (`image` / `video` / `audio`).
    #[serde(default)]
    pub media_type: Option<String>,
    /// Audio duration in seconds.
    #[serde(default)]
    pub media_duration: Option<u32>,
    /// Creation timestamp, RFC 3339.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Update timestamp; defaults to `created_at` when missing.
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Edit flag.
    #[serde(default)]
    pub is_edited: bool,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Pin flag.
    #[serde(default)]
    pub is_pinned: bool,
    /// Private-conversation flag.
    #[serde(default)]
    pub is_private: bool,
    /// Ids of users who have read the message.
    #[serde(default)]
    pub read_by: Vec<String>,
}

// ===== Normalization =====

/// Failures while normalizing a wire payload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    /// A required identifier was empty or missing.
    #[error("invalid identifier in payload: {0}")]
    InvalidId(String),

    /// Media fields were inconsistent (url without kind, unknown kind).
    #[error("invalid media descriptor: {0}")]
    InvalidMedia(String),

    /// A private message payload named no counterpart for the local user.
    #[error("private message has no peer relative to the local user")]
    MissingPeer,

    /// The frame or payload did not deserialize.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

fn normalize_user(dto: &UserDto) -> Result<UserRef, WireError> {
    let id = UserId::new(dto.id.clone())
        .map_err(|_| WireError::InvalidId(format!("user id {:?}", dto.id)))?;
    let username = dto.username.clone().unwrap_or_else(|| dto.id.clone());
    let mut user = UserRef::new(id, username);
    if let Some(avatar) = &dto.avatar {
        user = user.with_avatar(avatar.clone());
    }
    Ok(user)
}

fn normalize_media(dto: &MessageDto) -> Result<Option<MediaAttachment>, WireError> {
    let Some(url) = &dto.media_url else {
        return Ok(None);
    };
    let raw_kind = dto
        .media_type
        .as_deref()
        .ok_or_else(|| WireError::InvalidMedia(format!("url {url:?} without media type")))?;
    let kind = MediaKind::parse(raw_kind)
        .ok_or_else(|| WireError::InvalidMedia(format!("unknown media type {raw_kind:?}")))?;
    Ok(Some(MediaAttachment {
        url: url.clone(),
        kind,
        duration_secs: dto.media_duration,
    }))
}

/// Derive the conversation key a DTO belongs to, from the local user's
/// perspective: private messages live under the *peer's* id regardless of
/// which side sent them.
pub fn conversation_of(dto: &MessageDto, local: &UserId) -> Result<ConversationKey, WireError> {
    if !dto.is_private {
        return Ok(ConversationKey::Shared);
    }
    let peer_raw = if dto.sender.id == local.as_str() {
        dto.receiver.as_ref().map(|r| r.id.clone())
    } else {
        Some(dto.sender.id.clone())
    };
    let peer_raw = peer_raw.ok_or(WireError::MissingPeer)?;
    let peer =
        UserId::new(peer_raw.clone()).map_err(|_| WireError::InvalidId(format!("{peer_raw:?}")))?;
    Ok(ConversationKey::Private(peer))
}

/// Normalize a loose wire DTO into the fixed [`Message`] shape.
///
/// This is the single entry point for message payloads from both the REST
/// surface and the channel; nothing downstream sees a raw DTO.
pub fn normalize_message(dto: &MessageDto, local: &UserId) -> Result<Message, WireError> {
    let id = MessageId::new(dto.id.clone())
        .map_err(|_| WireError::InvalidId(format!("message id {:?}", dto.id)))?;
    let conversation = conversation_of(dto, local)?;
    let sender = normalize_user(&dto.sender)?;
    let receiver = dto.receiver.as_ref().map(normalize_user).transpose()?;
    let media = normalize_media(dto)?;
    let readers: Vec<UserId> = dto
        .read_by
        .iter()
        .filter_map(|raw| UserId::new(raw.clone()).ok())
        .collect();

    let mut message = Message::confirmed(
        id,
        conversation,
        sender,
        receiver,
        dto.content.clone(),
        media,
        dto.created_at,
        dto.updated_at.unwrap_or(dto.created_at),
    )
    .with_flags(dto.is_edited, dto.is_deleted, dto.is_pinned)
    .with_read_by(readers);

    // Soft-deleted payloads may still carry stale content from older
    // servers; redact locally so the invariant holds everywhere.
    if message.is_deleted() && (message.content().is_some() || message.media().is_some()) {
        let at = message.updated_at();
        message.redact(at);
    }
    Ok(message)
}

// ===== Channel frames =====

/// Authentication failure reasons the server distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    /// No credential was presented.
    AuthRequired,
    /// Credential failed verification.
    InvalidToken,
    /// Credential was valid once but has expired.
    TokenExpired,
    /// Credential verified but the account no longer exists.
    UserNotFound,
}

impl AuthFailureReason {
    /// Parse the server's reason code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "AUTH_REQUIRED" => Some(Self::AuthRequired),
            "INVALID_TOKEN" => Some(Self::InvalidToken),
            "TOKEN_EXPIRED" => Some(Self::TokenExpired),
            "USER_NOT_FOUND" => Some(Self::UserNotFound),
            _ => None,
        }
    }

    /// Client action this reason maps to.
    pub fn action(&self) -> AuthAction {
        match self {
            Self::AuthRequired | Self::InvalidToken | Self::TokenExpired => AuthAction::Relogin,
            Self::UserNotFound => AuthAction::Fatal,
        }
    }
}

/// What the client must do about a rejected channel credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// Clear the stored credential and force re-authentication.
    Relogin,
    /// Treat as fatal; no retry without user action.
    Fatal,
}

/// Inbound (server -> client) channel events after normalization.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A message was created.
    NewMessage(MessageDto),
    /// A message was edited or soft-deleted.
    MessageUpdated(MessageDto),
    /// A message's pin flag was toggled.
    MessagePinned {
        /// Target message.
        message_id: String,
        /// New pin state.
        is_pinned: bool,
    },
    /// A read receipt landed.
    MessageRead {
        /// Target message.
        message_id: String,
        /// Full updated reader set.
        read_by: Vec<String>,
    },
    /// Full online-presence snapshot.
    PresenceList(Vec<UserDto>),
    /// Single presence delta.
    PresenceChanged {
        /// Affected user.
        user_id: String,
        /// New status string.
        status: String,
    },
    /// Ack for an outbound `send-message` escape hatch.
    SendAck {
        /// Server id on success.
        id: Option<String>,
        /// Error string on failure.
        error: Option<String>,
    },
    /// The handshake was rejected.
    AuthError(AuthFailureReason),
}

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ServerEvent {
    /// Parse one raw text frame into a typed event.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let frame: Frame =
            serde_json::from_str(raw).map_err(|e| WireError::Malformed(e.to_string()))?;
        let data = frame.data;
        let malformed = |e: serde_json::Error| WireError::Malformed(e.to_string());

        match frame.event.as_str() {
            "new-message" => Ok(Self::NewMessage(
                serde_json::from_value(data).map_err(malformed)?,
            )),
            "message-updated" => Ok(Self::MessageUpdated(
                serde_json::from_value(data).map_err(malformed)?,
            )),
            "message-pinned" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Pinned {
                    message_id: String,
                    is_pinned: bool,
                }
                let p: Pinned = serde_json::from_value(data).map_err(malformed)?;
                Ok(Self::MessagePinned {
                    message_id: p.message_id,
                    is_pinned: p.is_pinned,
                })
            }
            "message-read" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Read {
                    message_id: String,
                    read_by: Vec<String>,
                }
                let r: Read = serde_json::from_value(data).map_err(malformed)?;
                Ok(Self::MessageRead {
                    message_id: r.message_id,
                    read_by: r.read_by,
                })
            }
            "presence-list" => Ok(Self::PresenceList(
                serde_json::from_value(data).map_err(malformed)?,
            )),
            "presence-changed" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Changed {
                    user_id: String,
                    status: String,
                }
                let c: Changed = serde_json::from_value(data).map_err(malformed)?;
                Ok(Self::PresenceChanged {
                    user_id: c.user_id,
                    status: c.status,
                })
            }
            "send-ack" => {
                #[derive(Deserialize)]
                struct Ack {
                    #[serde(default)]
                    id: Option<String>,
                    #[serde(default)]
                    error: Option<String>,
                }
                let a: Ack = serde_json::from_value(data).map_err(malformed)?;
                Ok(Self::SendAck {
                    id: a.id,
                    error: a.error,
                })
            }
            "auth-error" => {
                #[derive(Deserialize)]
                struct AuthErr {
                    #[serde(default)]
                    code: String,
                }
                let e: AuthErr = serde_json::from_value(data).map_err(malformed)?;
                let reason = AuthFailureReason::parse(&e.code)
                    .ok_or_else(|| WireError::Malformed(format!("unknown auth code {:?}", e.code)))?;
                Ok(Self::AuthError(reason))
            }
            other => Err(WireError::Malformed(format!("unknown event {other:?}"))),
        }
    }
}

/// Outbound (client -> server) channel events.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Register this session as online; carries the bearer credential.
    PresenceAnnounce {
        /// Local user id.
        id: String,
        /// Display name.
        username: String,
        /// Avatar URL.
        avatar: Option<String>,
        /// Bearer credential for the handshake.
        token: String,
    },
    /// Subscribe to a broadcast scope.
    JoinRoom {
        /// Room id (`general` or a peer id).
        room: String,
    },
    /// Text-only send escape hatch; the server acks with `send-ack`.
    SendMessage {
        /// Private peer, absent for the shared room.
        receiver_id: Option<String>,
        /// Text content.
        content: String,
    },
}

impl ClientEvent {
    /// Serialize into the `{event, data}` frame the server expects.
    pub fn to_frame(&self) -> String {
        let (event, data) = match self {
            Self::PresenceAnnounce {
                id,
                username,
                avatar,
                token,
            } => (
                "presence-announce",
                serde_json::json!({
                    "id": id,
                    "username": username,
                    "avatar": avatar,
                    "token": token,
                }),
            ),
            Self::JoinRoom { room } => ("join-room", serde_json::json!({ "roomId": room })),
            Self::SendMessage {
                receiver_id,
                content,
            } => (
                "send-message",
                serde_json::json!({
                    "receiverId": receiver_id,
                    "content": content,
                }),
            ),
        };
        serde_json::json!({ "event": event, "data": data }).to_string()
    }
}

// ===== Tests =====
