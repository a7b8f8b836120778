//! Preview reconciliation loop
//!
//! Each cycle lists every application once and walks them sequentially:
//! classify, skip anything not ready or already commented on, render the
//! comment, fetch a fresh token and deliver. A commit is recorded as
//! processed only after the provider accepted its comment, so any failure
//! is retried on the next cycle.
//!
//! Only the terminal "notified" state is remembered (through
//! [`ProcessedSet`]); pending and ineligible applications are re-evaluated
//! from scratch every cycle.

use std::sync::Arc;
use std::time::Duration;

use notify::{CommentChannel, CommentReceipt, PullRequestRef};
use tracing::{debug, error, info, warn};

use crate::crds::application::{
    ManagedApplication, ANNOTATION_PULL_REQUEST_NUMBER, ANNOTATION_REPOSITORY_NAME,
    ANNOTATION_REPOSITORY_ORGANIZATION,
};
use crate::tasks::eligibility::{
    classify, generator_name, Eligibility, NotPreviewReason, PendingReason,
};
use crate::tasks::error::{ReconcileError, Result};
use crate::tasks::github::TokenProvider;
use crate::tasks::k8s::ApplicationLister;
use crate::tasks::processed::ProcessedSet;
use crate::tasks::render::{render_comment, LinkBuilder};

/// What happened to one application during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationOutcome {
    NotPreview(NotPreviewReason),
    Pending(PendingReason),
    /// Ready, but its commit was already commented on
    AlreadyNotified,
    Notified(CommentReceipt),
}

/// Counters for one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub not_preview: usize,
    pub pending: usize,
    pub already_notified: usize,
    pub notified: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &Result<ApplicationOutcome>) {
        match outcome {
            Ok(ApplicationOutcome::NotPreview(_)) => self.not_preview += 1,
            Ok(ApplicationOutcome::Pending(_)) => self.pending += 1,
            Ok(ApplicationOutcome::AlreadyNotified) => self.already_notified += 1,
            Ok(ApplicationOutcome::Notified(_)) => self.notified += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Exponential delay after `failures` consecutive listing failures.
pub fn backoff_delay(interval: Duration, failures: u32, max: Duration) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
    interval.saturating_mul(factor).min(max.max(interval))
}

/// Drives preview comments for ready applications
pub struct PreviewReconciler {
    lister: Arc<dyn ApplicationLister>,
    tokens: Arc<dyn TokenProvider>,
    channel: Arc<dyn CommentChannel>,
    links: LinkBuilder,
    processed: ProcessedSet,
    interval: Duration,
    max_backoff: Duration,
}

impl PreviewReconciler {
    pub fn new(
        lister: Arc<dyn ApplicationLister>,
        tokens: Arc<dyn TokenProvider>,
        channel: Arc<dyn CommentChannel>,
        links: LinkBuilder,
    ) -> Self {
        Self {
            lister,
            tokens,
            channel,
            links,
            processed: ProcessedSet::new(),
            interval: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
        }
    }

    /// Set the poll interval and the cap for failure backoff.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration, max_backoff: Duration) -> Self {
        self.interval = interval;
        self.max_backoff = max_backoff;
        self
    }

    /// Commits notified so far.
    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Poll forever. Never returns; the process is stopped by termination.
    pub async fn run(mut self) {
        info!(
            channel = self.channel.name(),
            interval_secs = self.interval.as_secs(),
            base_domain = %self.links.base_domain(),
            "Starting preview reconciliation loop"
        );

        let mut consecutive_failures: u32 = 0;
        loop {
            match self.reconcile_once().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    debug!(?report, "Cycle complete");
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    error!(error = %e, consecutive_failures, "Cycle aborted");
                }
            }

            let delay = backoff_delay(self.interval, consecutive_failures, self.max_backoff);
            tokio::time::sleep(delay).await;
        }
    }

    /// One full pass over all applications.
    ///
    /// Fails only when the application list itself cannot be fetched;
    /// per-application errors are logged and counted in the report.
    pub async fn reconcile_once(&mut self) -> Result<CycleReport> {
        let apps = self.lister.list_applications().await?;

        let mut report = CycleReport {
            listed: apps.len(),
            ..CycleReport::default()
        };

        for app in &apps {
            let outcome = self.process_application(app).await;
            if let Err(e) = &outcome {
                error!(
                    application = %app.name,
                    head_sha = app.head_sha().unwrap_or_default(),
                    error = %e,
                    "Failed to process preview comment"
                );
            }
            report.record(&outcome);
        }

        if report.notified > 0 || report.failed > 0 {
            info!(
                listed = report.listed,
                notified = report.notified,
                failed = report.failed,
                pending = report.pending,
                "Reconciliation cycle finished"
            );
        }

        Ok(report)
    }

    /// Evaluate one application and deliver its comment if due.
    pub async fn process_application(
        &mut self,
        app: &ManagedApplication,
    ) -> Result<ApplicationOutcome> {
        match classify(app) {
            Eligibility::NotPreview(reason) => {
                debug!(application = %app.name, %reason, "Skipping, not a preview environment");
                return Ok(ApplicationOutcome::NotPreview(reason));
            }
            Eligibility::Pending(reason) => {
                debug!(application = %app.name, %reason, "Waiting for preview environment");
                return Ok(ApplicationOutcome::Pending(reason));
            }
            Eligibility::Ready => {}
        }

        let head_sha = app
            .head_sha()
            .ok_or_else(|| ReconcileError::malformed(&app.name, "head_sha annotation"))?;

        if self.processed.has(head_sha) {
            debug!(application = %app.name, head_sha, "Skipping, already processed");
            return Ok(ApplicationOutcome::AlreadyNotified);
        }

        let target = pull_request_target(app)?;
        let namespace = app
            .namespace
            .as_deref()
            .ok_or_else(|| ReconcileError::malformed(&app.name, "destination namespace"))?;

        let comment = self
            .links
            .comment(&app.name, namespace, head_sha, &app.external_urls);
        let body = render_comment(&comment);

        let token = self.tokens.token().await?;

        let receipt = self
            .channel
            .post_comment(&target, &token, &body)
            .await
            .inspect_err(|e| {
                warn!(
                    application = %app.name,
                    head_sha,
                    pull_request = %target,
                    status = ?e.status(),
                    "Provider rejected preview comment"
                );
            })?;

        self.processed.mark_processed(head_sha);
        info!(
            application = %app.name,
            head_sha,
            pull_request = %target,
            generator = generator_name(app).unwrap_or_default(),
            comment_id = ?receipt.id,
            preview_url = comment.primary_url().unwrap_or_default(),
            "Posted preview comment"
        );

        Ok(ApplicationOutcome::Notified(receipt))
    }
}

/// Resolve the pull request an application was generated for.
pub fn pull_request_target(app: &ManagedApplication) -> Result<PullRequestRef> {
    let owner = app
        .annotation(ANNOTATION_REPOSITORY_ORGANIZATION)
        .ok_or_else(|| ReconcileError::malformed(&app.name, "repository_organization annotation"))?;
    let repo = app
        .annotation(ANNOTATION_REPOSITORY_NAME)
        .ok_or_else(|| ReconcileError::malformed(&app.name, "repository_name annotation"))?;
    let number = app
        .annotation(ANNOTATION_PULL_REQUEST_NUMBER)
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| ReconcileError::malformed(&app.name, "pull_request_number annotation"))?;

    Ok(PullRequestRef::new(owner, repo, number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{HealthStatus, OwnerRef};
    use crate::tasks::github::{CredentialError, MockTokenProvider};
    use async_trait::async_trait;
    use notify::ChannelError;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct FakeLister {
        snapshots: Mutex<Vec<Result<Vec<ManagedApplication>>>>,
    }

    impl FakeLister {
        fn always(apps: Vec<ManagedApplication>) -> Arc<Self> {
            Self::sequence((0..8).map(|_| Ok(apps.clone())).collect())
        }

        fn sequence(mut snapshots: Vec<Result<Vec<ManagedApplication>>>) -> Arc<Self> {
            snapshots.reverse();
            Arc::new(Self {
                snapshots: Mutex::new(snapshots),
            })
        }
    }

    #[async_trait]
    impl ApplicationLister for FakeLister {
        async fn list_applications(&self) -> Result<Vec<ManagedApplication>> {
            self.snapshots
                .lock()
                .unwrap()
                .pop()
                .expect("no more snapshots")
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        calls: Mutex<Vec<(PullRequestRef, String, String)>>,
        fail_with: Mutex<Vec<u16>>,
    }

    impl RecordingChannel {
        fn failing(statuses: &[u16]) -> Arc<Self> {
            let channel = Self::default();
            *channel.fail_with.lock().unwrap() = statuses.iter().rev().copied().collect();
            Arc::new(channel)
        }

        fn calls(&self) -> Vec<(PullRequestRef, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommentChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn post_comment(
            &self,
            target: &PullRequestRef,
            token: &str,
            body: &str,
        ) -> Result<CommentReceipt, ChannelError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((target.clone(), token.to_string(), body.to_string()));
            if let Some(status) = self.fail_with.lock().unwrap().pop() {
                return Err(ChannelError::Delivery {
                    status,
                    body: "boom".to_string(),
                });
            }
            Ok(CommentReceipt {
                id: Some(calls.len() as u64),
                html_url: None,
            })
        }
    }

    fn tokens(times: usize) -> Arc<MockTokenProvider> {
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(times)
            .returning(|| Ok("ghs_test".to_string()));
        Arc::new(mock)
    }

    fn preview_app() -> ManagedApplication {
        let mut app = ManagedApplication {
            name: "svc-pr-42".to_string(),
            namespace: Some("svc-pr-42".to_string()),
            owner_references: vec![OwnerRef {
                kind: "ApplicationSet".to_string(),
                name: "svc-previews".to_string(),
            }],
            external_urls: vec!["https://preview-42.example.com".to_string()],
            sync_revisions: Some(vec!["abc123".to_string()]),
            health: Some(HealthStatus::Healthy),
            ..Default::default()
        };
        for (k, v) in [
            ("preview_environment", "true"),
            ("head_sha", "abc123"),
            ("repository_name", "svc"),
            ("repository_organization", "acme"),
            ("pull_request_number", "42"),
        ] {
            app.annotations.insert(k.to_string(), v.to_string());
        }
        app
    }

    fn reconciler(
        lister: Arc<dyn ApplicationLister>,
        tokens: Arc<dyn TokenProvider>,
        channel: Arc<dyn CommentChannel>,
    ) -> PreviewReconciler {
        PreviewReconciler::new(lister, tokens, channel, LinkBuilder::new("example.io"))
    }

    #[tokio::test]
    async fn test_ready_application_is_notified_once() {
        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(
            FakeLister::always(vec![preview_app()]),
            tokens(1),
            channel.clone(),
        );

        assert!(!reconciler.processed().has("abc123"));
        let first = reconciler.reconcile_once().await.unwrap();
        assert_eq!(first.notified, 1);
        assert!(reconciler.processed().has("abc123"));

        let calls = channel.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PullRequestRef::new("acme", "svc", 42));
        assert_eq!(calls[0].1, "ghs_test");
        assert!(calls[0].2.contains("abc123"));
        assert!(calls[0]
            .2
            .contains("https://qr-code-generator.example.io/v1/qr?url=https%3A%2F%2Fpreview-42.example.com"));

        let second = reconciler.reconcile_once().await.unwrap();
        assert_eq!(second.notified, 0);
        assert_eq!(second.already_notified, 1);
        assert_eq!(channel.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_preview_application_is_ignored() {
        let mut app = preview_app();
        app.annotations.remove("preview_environment");

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(FakeLister::always(vec![app]), tokens(0), channel.clone());

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.not_preview, 1);
        assert!(channel.calls().is_empty());
        assert!(reconciler.processed().is_empty());
    }

    #[tokio::test]
    async fn test_pending_without_external_urls() {
        let mut app = preview_app();
        app.external_urls.clear();

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(FakeLister::always(vec![app]), tokens(0), channel.clone());

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.pending, 1);
        assert!(channel.calls().is_empty());
        assert!(reconciler.processed().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_pending_application_logged_below_info() {
        let mut app = preview_app();
        app.health = Some(HealthStatus::Progressing);

        let mut reconciler = reconciler(
            FakeLister::always(vec![app]),
            tokens(0),
            Arc::new(RecordingChannel::default()),
        );

        for _ in 0..3 {
            assert_eq!(reconciler.reconcile_once().await.unwrap().pending, 1);
        }

        assert!(logs_contain("Waiting for preview environment"));
        logs_assert(|lines: &[&str]| {
            let noisy = lines
                .iter()
                .filter(|line| line.contains("Waiting for preview environment"))
                .filter(|line| line.contains(" INFO ") || line.contains(" WARN "))
                .count();
            if noisy == 0 {
                Ok(())
            } else {
                Err(format!("{noisy} pending lines logged at info or above"))
            }
        });
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_cycle() {
        let channel = RecordingChannel::failing(&[500]);
        let mut reconciler = reconciler(
            FakeLister::always(vec![preview_app()]),
            tokens(2),
            channel.clone(),
        );

        let first = reconciler.reconcile_once().await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(!reconciler.processed().has("abc123"));

        let second = reconciler.reconcile_once().await.unwrap();
        assert_eq!(second.notified, 1);
        assert!(reconciler.processed().has("abc123"));
        assert_eq!(channel.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_token_failure_skips_delivery() {
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .returning(|| Err(CredentialError::MissingToken));

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(
            FakeLister::always(vec![preview_app()]),
            Arc::new(mock),
            channel.clone(),
        );

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(channel.calls().is_empty());
        assert!(reconciler.processed().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_application_does_not_block_others() {
        let mut broken = preview_app();
        broken.name = "broken".to_string();
        broken
            .annotations
            .insert("pull_request_number".to_string(), "not-a-number".to_string());
        broken
            .annotations
            .insert("head_sha".to_string(), "fff000".to_string());
        broken.sync_revisions = Some(vec!["fff000".to_string()]);

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(
            FakeLister::always(vec![broken, preview_app()]),
            tokens(1),
            channel.clone(),
        );

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.notified, 1);
        assert!(!reconciler.processed().has("fff000"));
        assert!(reconciler.processed().has("abc123"));
    }

    #[tokio::test]
    async fn test_missing_head_sha_without_revisions_is_malformed() {
        let mut app = preview_app();
        app.annotations.remove("head_sha");
        app.sync_revisions = None;

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(FakeLister::always(vec![]), tokens(0), channel.clone());

        let err = reconciler.process_application(&app).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MalformedObject {
                field: "head_sha annotation",
                ..
            }
        ));
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let lister = FakeLister::sequence(vec![
            Err(ReconcileError::TransientFetch {
                what: "applications",
                message: "connection refused".to_string(),
            }),
            Ok(vec![preview_app()]),
        ]);
        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(lister, tokens(1), channel.clone());

        assert!(reconciler.reconcile_once().await.is_err());
        assert!(channel.calls().is_empty());

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.notified, 1);
    }

    #[tokio::test]
    async fn test_same_commit_in_two_applications_notified_once() {
        let mut twin = preview_app();
        twin.name = "svc-pr-42-worker".to_string();

        let channel = Arc::new(RecordingChannel::default());
        let mut reconciler = reconciler(
            FakeLister::always(vec![preview_app(), twin]),
            tokens(1),
            channel.clone(),
        );

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(report.already_notified, 1);
        assert_eq!(channel.calls().len(), 1);
    }

    #[test]
    fn test_pull_request_target() {
        let target = pull_request_target(&preview_app()).unwrap();
        assert_eq!(target, PullRequestRef::new("acme", "svc", 42));

        let mut app = preview_app();
        app.annotations.remove("repository_organization");
        assert!(matches!(
            pull_request_target(&app),
            Err(ReconcileError::MalformedObject { .. })
        ));
    }

    #[test]
    fn test_backoff_delay() {
        let interval = Duration::from_secs(10);
        let max = Duration::from_secs(300);
        assert_eq!(backoff_delay(interval, 0, max), interval);
        assert_eq!(backoff_delay(interval, 1, max), Duration::from_secs(20));
        assert_eq!(backoff_delay(interval, 3, max), Duration::from_secs(80));
        assert_eq!(backoff_delay(interval, 10, max), max);
        assert_eq!(backoff_delay(interval, u32::MAX, max), max);
    }
}
