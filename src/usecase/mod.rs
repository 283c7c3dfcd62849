//! Use-cases: one entry point per user intent.
//!
//! Each use-case validates its input against the domain rules, issues at
//! most one REST call through the [`ChatApi`] seam, and reports a uniform
//! `Result` to its caller. Validation failures never produce side effects;
//! nothing here panics into the caller.
//!
//! Repository reconciliation stays with the caller: the session owns the
//! optimistic pending entry for sends, while edit/delete/pin/mark-read
//! reflect the confirmed DTO into the store directly on success.

use async_trait::async_trait;

use crate::model::{
    ChatError, ConversationKey, MediaAttachment, MediaKind, Message, MessageId, UserId,
    ValidationError,
};

/// Maximum accepted text length, in characters.
pub const MAX_TEXT_CHARS: usize = 2_000;

/// Maximum accepted media file size, in bytes (25 MiB).
pub const MAX_MEDIA_BYTES: usize = 25 * 1024 * 1024;

// ===== Inputs =====

/// A media file staged for upload alongside a send or edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    /// Original file name, carried into the multipart part.
    pub file_name: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type as sniffed by the picker (e.g. `image/png`).
    pub mime: String,
}

impl MediaUpload {
    /// Media kind implied by the MIME type, when acceptable.
    pub fn kind(&self) -> Option<MediaKind> {
        let top_level = self.mime.split('/').next().unwrap_or_default();
        MediaKind::parse(top_level)
    }

    /// Local placeholder attachment shown while the upload is in flight.
    /// The confirmed message replaces it with the server's stable URL.
    pub fn placeholder(&self) -> Option<MediaAttachment> {
        self.kind().map(|kind| MediaAttachment {
            url: self.file_name.clone(),
            kind,
            duration_secs: None,
        })
    }
}

/// Input for the send use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Conversation the message goes to.
    pub conversation: ConversationKey,
    /// Text content, possibly empty when media is attached.
    pub content: Option<String>,
    /// Staged media, if any.
    pub media: Option<MediaUpload>,
}

/// Input for the edit use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEdit {
    /// Replacement text.
    pub content: Option<String>,
    /// Replacement media.
    pub media: Option<MediaUpload>,
    /// Drop the existing media without replacing it.
    pub remove_media: bool,
}

// ===== REST seam =====

/// The REST surface the use-cases consume.
///
/// The production implementation lives in [`crate::rest`]; tests substitute
/// a canned double to drive reconciliation scenarios without a server.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Paginated fetch of one conversation, newest page first.
    async fn fetch_messages(
        &self,
        conversation: &ConversationKey,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError>;

    /// Multipart send of text and/or one media file.
    async fn send_message(&self, draft: &MessageDraft) -> Result<Message, ChatError>;

    /// Multipart edit of an existing message.
    async fn edit_message(&self, id: &MessageId, edit: &MessageEdit)
        -> Result<Message, ChatError>;

    /// Soft delete.
    async fn delete_message(&self, id: &MessageId) -> Result<Message, ChatError>;

    /// Read receipt.
    async fn mark_read(&self, id: &MessageId) -> Result<Message, ChatError>;

    /// Pin or unpin.
    async fn set_pinned(&self, id: &MessageId, pinned: bool) -> Result<Message, ChatError>;
}

// ===== Validation =====

fn validate_text(content: Option<&str>) -> Result<(), ValidationError> {
    if let Some(text) = content {
        let len = text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(ValidationError::TextTooLong {
                len,
                max: MAX_TEXT_CHARS,
            });
        }
    }
    Ok(())
}

fn validate_media(media: Option<&MediaUpload>) -> Result<(), ValidationError> {
    if let Some(upload) = media {
        if upload.bytes.len() > MAX_MEDIA_BYTES {
            return Err(ValidationError::MediaTooLarge {
                bytes: upload.bytes.len(),
                max: MAX_MEDIA_BYTES,
            });
        }
        if upload.kind().is_none() {
            return Err(ValidationError::UnsupportedMediaType(upload.mime.clone()));
        }
    }
    Ok(())
}

/// Validate a draft before any network activity.
pub fn validate_draft(draft: &MessageDraft) -> Result<(), ValidationError> {
    let has_text = draft
        .content
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty());
    if !has_text && draft.media.is_none() {
        return Err(ValidationError::EmptyMessage);
    }
    validate_text(draft.content.as_deref())?;
    validate_media(draft.media.as_ref())
}

/// Validate an edit before any network activity.
pub fn validate_edit(edit: &MessageEdit) -> Result<(), ValidationError> {
    let has_text = edit
        .content
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty());
    if !has_text && edit.media.is_none() && !edit.remove_media {
        return Err(ValidationError::EmptyMessage);
    }
    validate_text(edit.content.as_deref())?;
    validate_media(edit.media.as_ref())
}

// ===== Use-cases =====

/// Send a message: validate, then exactly one REST call.
///
/// The caller owns the optimistic entry; this function only reports the
/// confirmed DTO (or the failure that should mark the entry failed).
pub async fn send(api: &dyn ChatApi, draft: &MessageDraft) -> Result<Message, ChatError> {
    validate_draft(draft)?;
    api.send_message(draft).await
}

/// Edit a message's content and/or media.
pub async fn edit(
    api: &dyn ChatApi,
    id: &MessageId,
    edit: &MessageEdit,
) -> Result<Message, ChatError> {
    validate_edit(edit)?;
    api.edit_message(id, edit).await
}

/// Soft-delete a message.
pub async fn delete(api: &dyn ChatApi, id: &MessageId) -> Result<Message, ChatError> {
    api.delete_message(id).await
}

/// Pin or unpin a message.
pub async fn set_pinned(
    api: &dyn ChatApi,
    id: &MessageId,
    pinned: bool,
) -> Result<Message, ChatError> {
    api.set_pinned(id, pinned).await
}

/// Report a read receipt for a message the local user saw.
///
/// Short-circuits silently (returns `Ok(None)`) when the message is the
/// local user's own or the user is already in its reader set; this is the
/// guarantee that bounds receipt traffic.
pub async fn mark_read(
    api: &dyn ChatApi,
    local_user: &UserId,
    message: &Message,
) -> Result<Option<Message>, ChatError> {
    if message.sender().id == *local_user || message.is_read_by(local_user) {
        return Ok(None);
    }
    api.mark_read(message.id()).await.map(Some)
}

// ===== Tests =====
