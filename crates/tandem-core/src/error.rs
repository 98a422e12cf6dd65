//! Error types for editing sessions.

use std::io;
use thiserror::Error;
use url::Url;

use crate::session::{ConversationId, ResponseId};

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while creating sessions or reconciling file entries.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    #[error("An editing session already exists for conversation {0}")]
    DuplicateSession(ConversationId),

    #[error("{uri} is being modified by response {current}; rejected batch from {incoming}")]
    AttributionConflict {
        uri: Url,
        current: ResponseId,
        incoming: ResponseId,
    },

    #[error("Response {0} has already completed")]
    ResponseCompleted(ResponseId),

    #[error("Editing session has been disposed")]
    Disposed,

    #[error("No file entry for {0}")]
    UnknownEntry(Url),

    #[error("Text error: {0}")]
    Text(#[from] tandem_text::TextError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Unsupported document URI: {0}")]
    UnsupportedUri(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Observable closed")]
    ObservableClosed,
}

impl SessionError {
    /// Check if the failed operation can be retried as-is.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Text(err) => err.is_retryable(),
            SessionError::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this error reports a protocol violation by a writer.
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SessionError::AttributionConflict { .. } | SessionError::ResponseCompleted(_)
        )
    }
}
