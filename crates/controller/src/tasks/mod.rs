pub mod config;
pub mod eligibility;
pub mod error;
pub mod github;
pub mod k8s;
pub mod processed;
pub mod reconcile;
pub mod render;

// Re-export commonly used items
pub use config::ControllerConfig;
pub use error::{ReconcileError, Result};
pub use reconcile::{CycleReport, PreviewReconciler};
