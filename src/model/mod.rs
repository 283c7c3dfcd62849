//! Domain model: identifiers, messages, and the error taxonomy.

pub mod error;
pub mod identifiers;
pub mod message;

pub use error::{AppError, ChatError, ValidationError};
pub use identifiers::{
    ConversationKey, InvalidConversationKey, InvalidMessageId, InvalidUserId, MessageId, UserId,
    LOCAL_ID_PREFIX,
};
pub use message::{Lifecycle, MediaAttachment, MediaKind, Message, UserRef};
