#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Preview environment controller library
//!
//! Polls Argo CD applications generated for pull requests and, once a
//! preview environment is synced, healthy and reachable, posts a single
//! comment with its links to the pull request.

pub mod crds;
pub mod tasks;

// Re-export commonly used types
pub use crds::{Application, ManagedApplication};
pub use tasks::config::ControllerConfig;
pub use tasks::reconcile::PreviewReconciler;
