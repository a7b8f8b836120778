//! Pull request comment delivery for preview environment notifications.
//!
//! This crate delivers a rendered comment body to a pull request on the
//! code-hosting provider and reports the outcome to the caller.
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use notify::{CommentChannel, GitHubCommentChannel, PullRequestRef};
//!
//! # async fn run() -> Result<(), notify::ChannelError> {
//! let channel = GitHubCommentChannel::new(notify::DEFAULT_API_URL, Duration::from_secs(15))?;
//! let receipt = channel
//!     .post_comment(&PullRequestRef::new("acme", "svc", 42), "ghs_token", "hello")
//!     .await?;
//! println!("created comment {:?}", receipt.id);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`CommentChannel`] trait defines the interface for providers
//! - [`GitHubCommentChannel`] implements the GitHub issues comments API
//!
//! Delivery is attempted exactly once per call. Retrying is left to the
//! caller, which re-evaluates its own state before trying again.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod target;

pub use channels::github::{GitHubCommentChannel, DEFAULT_API_URL, GITHUB_API_VERSION};
pub use channels::CommentChannel;
pub use error::ChannelError;
pub use target::{CommentReceipt, PullRequestRef};
