//! GitHub pull request comment channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client as HttpClient};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::target::{CommentReceipt, PullRequestRef};
use crate::CommentChannel;

/// Public GitHub REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version pinned on every request.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("preview-bot/", env!("CARGO_PKG_VERSION"));

/// Posts comments through the GitHub issues API.
pub struct GitHubCommentChannel {
    client: HttpClient,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

impl GitHubCommentChannel {
    /// Create a channel against `base_url` (e.g. [`DEFAULT_API_URL`]).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        let client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn comments_url(&self, target: &PullRequestRef) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.base_url, target.owner, target.repo, target.number
        )
    }
}

#[async_trait]
impl CommentChannel for GitHubCommentChannel {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn post_comment(
        &self,
        target: &PullRequestRef,
        token: &str,
        body: &str,
    ) -> Result<CommentReceipt, ChannelError> {
        let url = self.comments_url(target);

        debug!(
            channel = "github",
            repository = %target.repo_path(),
            number = target.number,
            "Posting pull request comment"
        );

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("token {token}"))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&CreateCommentRequest { body })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let receipt = match response.text().await {
                Ok(text) => parse_receipt(target, &text),
                Err(e) => {
                    warn!(
                        channel = "github",
                        pull_request = %target,
                        error = %e,
                        "Comment accepted but response body could not be read"
                    );
                    CommentReceipt::default()
                }
            };
            debug!(
                channel = "github",
                pull_request = %target,
                comment_id = ?receipt.id,
                "Comment created"
            );
            Ok(receipt)
        } else {
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "github",
                pull_request = %target,
                status = %status,
                body = %body,
                "GitHub comment request failed"
            );

            Err(ChannelError::Delivery {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Receipt from a 2xx response body. The comment exists once GitHub answered
/// 2xx, so an unreadable body only loses the receipt details.
fn parse_receipt(target: &PullRequestRef, text: &str) -> CommentReceipt {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(
            channel = "github",
            pull_request = %target,
            error = %e,
            "Comment accepted but response body is not a comment"
        );
        CommentReceipt::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> GitHubCommentChannel {
        GitHubCommentChannel::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_post_comment_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/issues/42/comments"))
            .and(header("authorization", "token ghs_test"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", GITHUB_API_VERSION))
            .and(body_json(json!({ "body": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 1001,
                "html_url": "https://github.com/acme/svc/pull/42#issuecomment-1001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = channel(&server)
            .post_comment(&PullRequestRef::new("acme", "svc", 42), "ghs_test", "hello")
            .await
            .unwrap();

        assert_eq!(receipt.id, Some(1001));
        assert_eq!(
            receipt.html_url.as_deref(),
            Some("https://github.com/acme/svc/pull/42#issuecomment-1001")
        );
    }

    #[tokio::test]
    async fn test_post_comment_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/issues/42/comments"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let err = channel(&server)
            .post_comment(&PullRequestRef::new("acme", "svc", 42), "t", "hello")
            .await
            .unwrap_err();

        match err {
            ChannelError::Delivery { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_post_comment_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "Resource not accessible by integration"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = channel(&server)
            .post_comment(&PullRequestRef::new("acme", "svc", 1), "t", "x")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let channel =
            GitHubCommentChannel::new("https://ghe.example.com/api/v3/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            channel.comments_url(&PullRequestRef::new("o", "r", 9)),
            "https://ghe.example.com/api/v3/repos/o/r/issues/9/comments"
        );
    }

    #[tokio::test]
    async fn test_accepted_comment_with_unparseable_body_is_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/svc/issues/42/comments"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = channel(&server)
            .post_comment(&PullRequestRef::new("acme", "svc", 42), "t", "hello")
            .await
            .unwrap();
        assert_eq!(receipt, CommentReceipt::default());
    }

    #[test]
    fn test_parse_receipt_falls_back_on_non_json() {
        let target = PullRequestRef::new("acme", "svc", 42);
        assert_eq!(
            parse_receipt(&target, "<html>ok</html>"),
            CommentReceipt::default()
        );
        assert_eq!(parse_receipt(&target, r#"{"id": 5}"#).id, Some(5));
    }
}
