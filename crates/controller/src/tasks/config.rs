//! Preview bot configuration
//!
//! Every setting comes from an environment variable and can be overridden
//! with the matching command line flag. There are no subcommands.

use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::tasks::render::{LinkBuilder, DEFAULT_ARGOCD_HOST, DEFAULT_GRAFANA_HOST, DEFAULT_QR_CODE_HOST};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Watches preview environment applications and comments on their pull requests
#[derive(Debug, Clone, Parser)]
#[command(name = "preview-bot", version, about)]
pub struct ControllerConfig {
    /// Namespace holding the credentials Secret and the base domain ConfigMap
    #[arg(long, env = "NAMESPACE", default_value = "glueops-core")]
    pub namespace: String,

    /// Secret with githubAppID, githubAppInstallationID and githubAppPrivateKey
    #[arg(long, env = "GITHUB_APP_SECRET_NAME", default_value = "tenant-repo-creds")]
    pub github_app_secret_name: String,

    /// ConfigMap whose captain_domain key holds the cluster base domain
    #[arg(
        long,
        env = "CAPTAIN_DOMAIN_K8S_CONFIGMAP_NAME",
        default_value = "glueops-captain-domain"
    )]
    pub captain_domain_configmap_name: String,

    /// Seconds between polls
    #[arg(long, env = "WATCH_FOR_APPS_DELAY_SECONDS", default_value_t = 10)]
    pub watch_delay_seconds: u64,

    /// Upper bound for the delay after repeated listing failures
    #[arg(long, env = "MAX_BACKOFF_SECONDS", default_value_t = 300)]
    pub max_backoff_seconds: u64,

    /// Only watch applications in this namespace (default: all namespaces)
    #[arg(long, env = "APPLICATIONS_NAMESPACE")]
    pub applications_namespace: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = notify::DEFAULT_API_URL)]
    pub github_api_url: String,

    /// Timeout for outbound HTTP requests, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECONDS", default_value_t = 15)]
    pub http_timeout_seconds: u64,

    /// Use this token instead of minting GitHub App installation tokens
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Host label of Argo CD under the base domain
    #[arg(long, env = "ARGOCD_HOST", default_value = DEFAULT_ARGOCD_HOST)]
    pub argocd_host: String,

    /// Host label of Grafana under the base domain
    #[arg(long, env = "GRAFANA_HOST", default_value = DEFAULT_GRAFANA_HOST)]
    pub grafana_host: String,

    /// Host label of the QR code service under the base domain
    #[arg(long, env = "QR_CODE_GENERATOR_HOST", default_value = DEFAULT_QR_CODE_HOST)]
    pub qr_code_host: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl ControllerConfig {
    pub fn watch_delay(&self) -> Duration {
        Duration::from_secs(self.watch_delay_seconds.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds).max(self.watch_delay())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Link builder for the resolved base domain.
    pub fn link_builder(&self, base_domain: &str) -> LinkBuilder {
        LinkBuilder::new(base_domain).with_hosts(
            self.argocd_host.as_str(),
            self.grafana_host.as_str(),
            self.qr_code_host.as_str(),
        )
    }
}
