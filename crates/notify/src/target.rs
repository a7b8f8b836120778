//! Delivery targets and receipts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pull request on the code-hosting provider.
///
/// GitHub addresses pull request conversation comments through the issues
/// API, so `number` is used as the issue number on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Pull request number
    pub number: u64,
}

impl PullRequestRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Get the full repository path (owner/repo)
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Acknowledgement returned by the provider for a created comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReceipt {
    /// Provider-assigned comment id, when the response body carried one
    #[serde(default)]
    pub id: Option<u64>,
    /// Browser URL of the comment, when the provider returns one
    #[serde(default)]
    pub html_url: Option<String>,
}
