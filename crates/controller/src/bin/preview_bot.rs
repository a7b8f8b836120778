/*
 * 5D Labs Agent Platform - Preview Bot
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Preview Bot - pull request comments for Argo CD preview environments
//!
//! Resolves the cluster base domain once at startup, then polls preview
//! applications forever and comments on each pull request commit once its
//! environment is ready.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use notify::{CommentChannel, GitHubCommentChannel};
use preview_controller::tasks::config::{ControllerConfig, LogFormat};
use preview_controller::tasks::github::{
    GitHubAppAuth, GitHubAppTokenProvider, StaticTokenProvider, TokenProvider,
};
use preview_controller::tasks::k8s::{resolve_base_domain, KubeApplicationLister};
use preview_controller::tasks::reconcile::PreviewReconciler;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = ControllerConfig::parse();
    init_tracing(config.log_format);

    info!(
        namespace = %config.namespace,
        "Starting preview bot v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .context("cannot connect to the Kubernetes API")?;
    info!("Connected to Kubernetes cluster");

    let base_domain = resolve_base_domain(
        &client,
        &config.namespace,
        &config.captain_domain_configmap_name,
    )
    .await?;

    let tokens: Arc<dyn TokenProvider> = if let Some(token) = &config.github_token {
        warn!("GITHUB_TOKEN is set, skipping GitHub App installation tokens");
        Arc::new(StaticTokenProvider::new(token.as_str()))
    } else {
        let auth = GitHubAppAuth::new(config.github_api_url.as_str(), config.http_timeout())
            .context("cannot build GitHub App client")?;
        Arc::new(GitHubAppTokenProvider::new(
            client.clone(),
            &config.namespace,
            &config.github_app_secret_name,
            auth,
        ))
    };

    let channel: Arc<dyn CommentChannel> = Arc::new(
        GitHubCommentChannel::new(config.github_api_url.as_str(), config.http_timeout())
            .context("cannot build GitHub comment client")?,
    );

    let lister = Arc::new(KubeApplicationLister::new(
        client,
        config.applications_namespace.as_deref(),
    ));

    let reconciler = PreviewReconciler::new(
        lister,
        tokens,
        channel,
        config.link_builder(&base_domain),
    )
    .with_interval(config.watch_delay(), config.max_backoff());

    tokio::select! {
        () = reconciler.run() => {},
        () = shutdown_signal() => {},
    }

    info!("Preview bot stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
