//! Pull request comment rendering
//!
//! Links are derived from the cluster base domain; the comment itself is a
//! markdown table rendered from a [`PreviewComment`] with no I/O.

use std::fmt::Write as _;

/// Loki logs dashboard path (Grafana dashboard uid + slug)
const LOGS_DASHBOARD_PATH: &str = "d/tBmi6B0Vz/loki-logs";

/// Workload compute resources dashboard path
const METRICS_DASHBOARD_PATH: &str =
    "d/a164a7f0339f99e89cea5cb47e9be617/kubernetes-compute-resources-workload";

pub const DEFAULT_ARGOCD_HOST: &str = "argocd";
pub const DEFAULT_GRAFANA_HOST: &str = "grafana";
pub const DEFAULT_QR_CODE_HOST: &str = "qr-code-generator";

/// Builds the links embedded in a preview comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    base_domain: String,
    argocd_host: String,
    grafana_host: String,
    qr_code_host: String,
}

impl LinkBuilder {
    /// Links under `base_domain` using the default host labels.
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
            argocd_host: DEFAULT_ARGOCD_HOST.to_string(),
            grafana_host: DEFAULT_GRAFANA_HOST.to_string(),
            qr_code_host: DEFAULT_QR_CODE_HOST.to_string(),
        }
    }

    /// Override the host labels placed in front of the base domain.
    #[must_use]
    pub fn with_hosts(
        mut self,
        argocd: impl Into<String>,
        grafana: impl Into<String>,
        qr_code: impl Into<String>,
    ) -> Self {
        self.argocd_host = argocd.into();
        self.grafana_host = grafana.into();
        self.qr_code_host = qr_code.into();
        self
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    fn origin(&self, host: &str) -> String {
        format!("https://{host}.{}", self.base_domain)
    }

    /// Argo CD application view.
    pub fn deployment_url(&self, app_name: &str) -> String {
        format!(
            "{}/applications/{}",
            self.origin(&self.argocd_host),
            urlencoding::encode(app_name)
        )
    }

    /// Log query for the workload over the last three hours.
    pub fn logs_url(&self, app_name: &str) -> String {
        format!(
            "{}/{LOGS_DASHBOARD_PATH}?orgId=1&var-workload={}&from=now-3h&to=now",
            self.origin(&self.grafana_host),
            urlencoding::encode(app_name)
        )
    }

    /// Compute resources dashboard for the workload's deployment.
    pub fn metrics_url(&self, namespace: &str, app_name: &str) -> String {
        format!(
            "{}/{METRICS_DASHBOARD_PATH}?var-datasource=Prometheus&var-cluster=&var-namespace={}&var-workload={}&var-type=deployment&orgId=1",
            self.origin(&self.grafana_host),
            urlencoding::encode(namespace),
            urlencoding::encode(app_name)
        )
    }

    /// QR code image encoding `external_url`.
    pub fn qr_code_url(&self, external_url: &str) -> String {
        format!(
            "{}/v1/qr?url={}",
            self.origin(&self.qr_code_host),
            urlencoding::encode(external_url)
        )
    }

    /// Assemble everything needed to render the comment for one application.
    pub fn comment(
        &self,
        app_name: &str,
        namespace: &str,
        commit_sha: &str,
        external_urls: &[String],
    ) -> PreviewComment {
        PreviewComment {
            application_name: app_name.to_string(),
            commit_sha: commit_sha.to_string(),
            deployment_url: self.deployment_url(app_name),
            previews: external_urls
                .iter()
                .map(|url| PreviewLink {
                    url: url.clone(),
                    qr_code_url: self.qr_code_url(url),
                })
                .collect(),
            metrics_url: self.metrics_url(namespace, app_name),
            logs_url: self.logs_url(app_name),
        }
    }
}

/// One external URL and the QR image that encodes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLink {
    pub url: String,
    pub qr_code_url: String,
}

/// Inputs of a preview comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewComment {
    pub application_name: String,
    pub commit_sha: String,
    pub deployment_url: String,
    pub previews: Vec<PreviewLink>,
    pub metrics_url: String,
    pub logs_url: String,
}

impl PreviewComment {
    /// Representative preview URL, when one link has to stand for all.
    pub fn primary_url(&self) -> Option<&str> {
        self.previews.first().map(|p| p.url.as_str())
    }
}

fn first_column(out: &mut String, emoji: &str, text: &str) {
    let _ = write!(out, "\n|<span aria-hidden=\"true\">{emoji}</span>  {text} |  ");
}

/// Render the comment body. Row order is fixed: commit, deployment details,
/// deployment preview, metrics, logs.
pub fn render_comment(comment: &PreviewComment) -> String {
    let mut body =
        String::from("|  Name | Link |\n|---------------------------------|------------------------|");

    first_column(&mut body, "🔨", "Latest commit");
    let _ = write!(body, "{} |", html_escape(&comment.commit_sha));

    first_column(&mut body, "🦄", "Deployment Details");
    let _ = write!(body, "[ArgoCD]({}) |", comment.deployment_url);

    first_column(&mut body, "🖥️", "Deployment Preview");
    if comment.previews.is_empty() {
        body.push_str("Not available. No Ingress was configured.");
    }
    for preview in &comment.previews {
        let url = html_escape(&preview.url);
        let _ = write!(
            body,
            "<details><summary><a href=\"{url}\">{url}</a></summary><br><img src=\"{}\" width=\"100\" height=\"100\" alt=\"QR code for {}\"></details>",
            html_escape(&preview.qr_code_url),
            html_escape(&comment.application_name),
        );
    }
    body.push('|');

    first_column(&mut body, "📊", "Metrics");
    let _ = write!(body, "[Grafana]({}) |", comment.metrics_url);

    first_column(&mut body, "📜", "Logs");
    let _ = write!(body, "[Loki]({}) |", comment.logs_url);

    body
}

/// Escape text for HTML inside a markdown table cell.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '|' => out.push_str("&#124;"),
            _ => out.push(c),
        }
    }
    out
}
