//! Custom resource types read by the preview bot

pub mod application;

pub use application::{Application, HealthStatus, ManagedApplication, OwnerRef};
