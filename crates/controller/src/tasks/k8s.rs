//! Kubernetes collaborators: application listing and base domain lookup.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::crds::{Application, ManagedApplication};
use crate::tasks::error::{ReconcileError, Result};

/// ConfigMap key holding the cluster base domain
pub const CAPTAIN_DOMAIN_KEY: &str = "captain_domain";

/// Source of application snapshots.
#[async_trait]
pub trait ApplicationLister: Send + Sync {
    /// Full snapshot of the managed applications in scope.
    async fn list_applications(&self) -> Result<Vec<ManagedApplication>>;
}

/// Lists Argo CD applications through the Kubernetes API
pub struct KubeApplicationLister {
    api: Api<Application>,
}

impl KubeApplicationLister {
    /// List across all namespaces, or only `namespace` when given.
    pub fn new(client: Client, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self { api }
    }
}

#[async_trait]
impl ApplicationLister for KubeApplicationLister {
    async fn list_applications(&self) -> Result<Vec<ManagedApplication>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| ReconcileError::TransientFetch {
                what: "applications",
                message: e.to_string(),
            })?;

        debug!(count = list.items.len(), "Listed applications");
        Ok(list.items.iter().map(ManagedApplication::from).collect())
    }
}

/// Read the base domain from `namespace/configmap_name`.
pub async fn resolve_base_domain(
    client: &Client,
    namespace: &str,
    configmap_name: &str,
) -> Result<String> {
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    let cm = configmaps.get(configmap_name).await.map_err(|e| {
        ReconcileError::FatalStartup(format!(
            "cannot read ConfigMap {namespace}/{configmap_name}: {e}"
        ))
    })?;

    let domain = base_domain_from_data(cm.data.as_ref()).map_err(|reason| {
        ReconcileError::FatalStartup(format!(
            "ConfigMap {namespace}/{configmap_name} {reason}"
        ))
    })?;

    info!(base_domain = %domain, "Resolved base domain");
    Ok(domain)
}

fn base_domain_from_data(data: Option<&BTreeMap<String, String>>) -> Result<String, String> {
    let data = data.ok_or_else(|| "has no data".to_string())?;
    let domain = data
        .get(CAPTAIN_DOMAIN_KEY)
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| format!("is missing key {CAPTAIN_DOMAIN_KEY}"))?;
    Ok(domain.to_string())
}
