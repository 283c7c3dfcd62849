//! Error taxonomy for tidechat.
//!
//! Errors are structured `thiserror` enums that compose via `From` and `?`.
//! The taxonomy mirrors how the UI reacts to a failure:
//!
//! - [`ValidationError`] - local pre-network rejection; blocks submission,
//!   no call is issued and no repository mutation happens.
//! - [`ChatError`] - outcome of a use-case that did attempt a network call.
//!   Use-cases return these to their callers instead of panicking; the
//!   session has one place to branch on the variant and surface feedback.
//! - [`AppError`] - top-level error for the binary (config, logging,
//!   terminal), fatal by construction.

use thiserror::Error;

/// Local validation failure detected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A message must carry text or media.
    #[error("message must contain text or media")]
    EmptyMessage,

    /// Text content exceeded the length bound.
    #[error("message text is {len} characters, limit is {max}")]
    TextTooLong {
        /// Actual character count.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Media file exceeded the size bound.
    #[error("media file is {bytes} bytes, limit is {max}")]
    MediaTooLarge {
        /// Actual size in bytes.
        bytes: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Media MIME type is not one the upload collaborator accepts.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

/// Failure outcome of a use-case.
///
/// For sends, `Network`/`Server` mark the optimistic entry
/// [`Lifecycle::Failed`](crate::model::Lifecycle::Failed) with a retry
/// affordance. For edit/delete/pin/read
/// the prior state is left untouched and a transient notification is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Rejected locally; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The request could not complete (connect failure, timeout, broken
    /// transport).
    #[error("network request failed: {0}")]
    Network(String),

    /// 401 or a rejected channel credential: clear the stored credential
    /// and force re-authentication.
    #[error("authentication rejected")]
    Auth,

    /// 429: surface a "slow down" notification, preserve the user's input.
    #[error("rate limited")]
    RateLimit {
        /// Server-provided backoff hint, if any.
        retry_after_ms: Option<u64>,
    },

    /// 404, e.g. editing an already-deleted message. Treated as a no-op
    /// failure and never retried.
    #[error("resource not found")]
    NotFound,

    /// 5xx: generic failure; retried only where the action is idempotent.
    #[error("server error (status {status})")]
    Server {
        /// HTTP status code.
        status: u16,
    },
}

impl ChatError {
    /// Whether the UI may offer a retry for this failure.
    ///
    /// Validation and not-found failures are final; auth failures force a
    /// re-login instead of a retry.
    pub fn offers_retry(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::RateLimit { .. }
        )
    }

    /// Whether this failure invalidates the stored credential.
    pub fn clears_credential(&self) -> bool {
        matches!(self, Self::Auth)
    }
}

/// Top-level application error for the `tidechat` binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging could not be initialized.
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Terminal or TUI rendering failure; without a working terminal the
    /// client cannot run.
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    /// The channel exhausted its reconnection budget.
    #[error("push channel reconnection failed")]
    ChannelExhausted,
}

// ===== Tests =====
