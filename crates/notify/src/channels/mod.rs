//! Comment channel implementations.

pub mod github;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::target::{CommentReceipt, PullRequestRef};

/// Trait for providers that accept pull request comments.
///
/// Implementations must not retry internally; a failed delivery is reported
/// to the caller, which decides when to try again.
#[async_trait]
pub trait CommentChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Append a comment to the given pull request.
    async fn post_comment(
        &self,
        target: &PullRequestRef,
        token: &str,
        body: &str,
    ) -> Result<CommentReceipt, ChannelError>;
}
