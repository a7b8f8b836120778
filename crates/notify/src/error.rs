//! Error types for comment delivery.

use thiserror::Error;

/// Errors that can occur when posting a comment.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("Provider returned {status}: {body}")]
    Delivery { status: u16, body: String },
}

impl ChannelError {
    /// HTTP status of a rejected delivery, if the provider answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Delivery { status, .. } => Some(*status),
            _ => None,
        }
    }
}
