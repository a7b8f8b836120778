//! Error taxonomy for the preview reconciliation loop.

use thiserror::Error;

use crate::tasks::github::CredentialError;

/// Errors raised while reconciling preview applications.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A collaborator could not be reached; the work is retried next cycle
    #[error("Failed to fetch {what}: {message}")]
    TransientFetch { what: &'static str, message: String },

    /// An otherwise eligible application is missing a field it needs
    #[error("Application {application} is missing or has an invalid {field}")]
    MalformedObject {
        application: String,
        field: &'static str,
    },

    /// The provider rejected or never received the comment
    #[error("Comment delivery failed: {0}")]
    Delivery(#[from] notify::ChannelError),

    /// The process cannot operate at all
    #[error("Startup failed: {0}")]
    FatalStartup(String),
}

impl ReconcileError {
    pub(crate) fn malformed(application: &str, field: &'static str) -> Self {
        Self::MalformedObject {
            application: application.to_string(),
            field,
        }
    }
}

impl From<CredentialError> for ReconcileError {
    fn from(err: CredentialError) -> Self {
        Self::TransientFetch {
            what: "provider token",
            message: err.to_string(),
        }
    }
}

/// Result type for reconciliation
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
