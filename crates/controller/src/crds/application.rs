//! Argo CD `Application` custom resource and the preview view derived from it
//!
//! Only the fields the preview bot reads are modeled. Everything is optional
//! because an application that is still converging routinely lacks parts of
//! its status.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation set to `"true"` on preview environment applications
pub const ANNOTATION_PREVIEW_ENVIRONMENT: &str = "preview_environment";
/// Annotation carrying the pull request head commit
pub const ANNOTATION_HEAD_SHA: &str = "head_sha";
/// Annotation carrying the repository name
pub const ANNOTATION_REPOSITORY_NAME: &str = "repository_name";
/// Annotation carrying the repository owner
pub const ANNOTATION_REPOSITORY_ORGANIZATION: &str = "repository_organization";
/// Annotation carrying the pull request number
pub const ANNOTATION_PULL_REQUEST_NUMBER: &str = "pull_request_number";

/// Owner reference kind of applications generated from a templated set
pub const GENERATOR_KIND: &str = "ApplicationSet";

/// Argo CD Application spec (subset)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus"
)]
pub struct ApplicationSpec {
    /// Where the application is deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ApplicationDestination>,
}

/// Deployment destination of an application
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ApplicationDestination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Argo CD Application status (subset)
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ApplicationSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<AppHealth>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ApplicationSummary {
    /// URLs exposed by the application's ingresses
    #[serde(default, rename = "externalURLs")]
    pub external_urls: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SyncStatus {
    /// Synced revision of a single-source application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Synced revisions of a multi-source application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct AppHealth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HealthStatus>,
}

/// Argo CD health status
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Progressing,
    Suspended,
    Missing,
    #[serde(other)]
    Unknown,
}

impl HealthStatus {
    /// Whether the application has settled into a reportable state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "Healthy",
            Self::Degraded => "Degraded",
            Self::Progressing => "Progressing",
            Self::Suspended => "Suspended",
            Self::Missing => "Missing",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Owner reference as seen by the preview bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// One polled application, flattened into the fields the preview bot uses.
///
/// Built fresh on every poll and never cached across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedApplication {
    pub name: String,
    /// Destination namespace of the deployed workload
    pub namespace: Option<String>,
    pub owner_references: Vec<OwnerRef>,
    pub annotations: BTreeMap<String, String>,
    /// Non-blank external URLs, in the order Argo CD reports them
    pub external_urls: Vec<String>,
    /// `None` when Argo CD has not reported any synced revision yet
    pub sync_revisions: Option<Vec<String>>,
    pub health: Option<HealthStatus>,
}

impl ManagedApplication {
    /// Annotation value, with blank values treated as absent.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Annotated pull request head commit.
    pub fn head_sha(&self) -> Option<&str> {
        self.annotation(ANNOTATION_HEAD_SHA)
    }

    /// First owner reference created by an `ApplicationSet`.
    pub fn generator(&self) -> Option<&OwnerRef> {
        self.owner_references
            .iter()
            .find(|owner| owner.kind == GENERATOR_KIND)
    }
}

impl From<&Application> for ManagedApplication {
    fn from(app: &Application) -> Self {
        let owner_references = app
            .owner_references()
            .iter()
            .map(|owner| OwnerRef {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            })
            .collect();

        let status = app.status.as_ref();

        let external_urls = status
            .and_then(|s| s.summary.as_ref())
            .map(|summary| {
                summary
                    .external_urls
                    .iter()
                    .map(|url| url.trim())
                    .filter(|url| !url.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let sync_revisions = status.and_then(|s| s.sync.as_ref()).and_then(|sync| {
            match (&sync.revisions, &sync.revision) {
                (Some(revisions), _) if !revisions.is_empty() => Some(revisions.clone()),
                (_, Some(revision)) if !revision.is_empty() => Some(vec![revision.clone()]),
                _ => None,
            }
        });

        Self {
            name: app.name_any(),
            namespace: app
                .spec
                .destination
                .as_ref()
                .and_then(|d| d.namespace.clone())
                .filter(|ns| !ns.is_empty()),
            owner_references,
            annotations: app.annotations().clone(),
            external_urls,
            sync_revisions,
            health: status
                .and_then(|s| s.health.as_ref())
                .and_then(|h| h.status),
        }
    }
}
