//! Preview eligibility classification
//!
//! An application is ready for a pull request comment only when all of the
//! following hold:
//!
//! 1. annotation `preview_environment` is `"true"`
//! 2. an owner reference of kind `ApplicationSet` exists
//! 3. the annotated `head_sha` is among the synced revisions (skipped while
//!    Argo CD reports no revisions at all)
//! 4. health is `Healthy` or `Degraded`
//! 5. at least one external URL is published
//!
//! Checks run in that order and the first failing one decides the outcome.

use std::fmt;

use crate::crds::application::{ManagedApplication, ANNOTATION_PREVIEW_ENVIRONMENT};
use crate::crds::HealthStatus;

/// Why an application is not a preview environment at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotPreviewReason {
    /// `preview_environment` annotation missing or not `"true"`
    MissingAnnotation,
    /// No owner reference from an `ApplicationSet`
    NotGenerated,
}

/// Why a preview environment is not ready yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    /// Synced revisions do not include the annotated head commit
    NotSynced,
    /// Health has not settled on `Healthy` or `Degraded`
    Unhealthy(Option<HealthStatus>),
    /// No external URL published yet
    NoExternalUrls,
}

impl fmt::Display for NotPreviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAnnotation => f.write_str("preview_environment annotation is not \"true\""),
            Self::NotGenerated => f.write_str("not owned by an ApplicationSet"),
        }
    }
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSynced => f.write_str("head commit not synced yet"),
            Self::Unhealthy(Some(health)) => write!(f, "health is {health}"),
            Self::Unhealthy(None) => f.write_str("health not reported"),
            Self::NoExternalUrls => f.write_str("no external URLs yet"),
        }
    }
}

/// Outcome of classifying one application snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    NotPreview(NotPreviewReason),
    Pending(PendingReason),
    Ready,
}

impl Eligibility {
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Classify an application. Missing status fields count as "not yet", never
/// as an error.
pub fn classify(app: &ManagedApplication) -> Eligibility {
    if app.annotation(ANNOTATION_PREVIEW_ENVIRONMENT) != Some("true") {
        return Eligibility::NotPreview(NotPreviewReason::MissingAnnotation);
    }

    if app.generator().is_none() {
        return Eligibility::NotPreview(NotPreviewReason::NotGenerated);
    }

    if let Some(revisions) = &app.sync_revisions {
        let synced = app
            .head_sha()
            .is_some_and(|sha| revisions.iter().any(|rev| rev == sha));
        if !synced {
            return Eligibility::Pending(PendingReason::NotSynced);
        }
    }

    if !app.health.is_some_and(HealthStatus::is_terminal) {
        return Eligibility::Pending(PendingReason::Unhealthy(app.health));
    }

    if app.external_urls.is_empty() {
        return Eligibility::Pending(PendingReason::NoExternalUrls);
    }

    Eligibility::Ready
}

/// Name of the `ApplicationSet` that generated the application, if any.
pub fn generator_name(app: &ManagedApplication) -> Option<&str> {
    app.generator().map(|owner| owner.name.as_str())
}
