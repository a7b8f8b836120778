//! # GitHub App installation tokens
//!
//! Installation tokens expire after an hour, so a fresh one is minted for
//! every delivery attempt. The app credentials live in a Kubernetes Secret
//! and are re-read on each call, which also picks up key rotation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{Api, Client};
use reqwest::{header, Client as HttpClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Secret key holding the GitHub App id
pub const SECRET_KEY_APP_ID: &str = "githubAppID";
/// Secret key holding the installation id
pub const SECRET_KEY_INSTALLATION_ID: &str = "githubAppInstallationID";
/// Secret key holding the PEM encoded private key
pub const SECRET_KEY_PRIVATE_KEY: &str = "githubAppPrivateKey";

const USER_AGENT: &str = concat!("preview-bot/", env!("CARGO_PKG_VERSION"));

/// Backdating of `iat` to absorb clock skew with GitHub
const JWT_CLOCK_SKEW_SECS: i64 = 30;
/// GitHub rejects app JWTs valid for longer than ten minutes
const JWT_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read secret {name}: {message}")]
    Secret { name: String, message: String },

    #[error("Secret is missing key {0}")]
    MissingKey(&'static str),

    #[error("Invalid GitHub App private key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Installation token exchange failed: {status} - {body}")]
    Exchange { status: u16, body: String },

    #[error("GitHub response did not include a token")]
    MissingToken,
}

/// Supplies a bearer token for the code-hosting provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// GitHub App identity loaded from the credentials Secret
#[derive(Clone)]
pub struct GitHubAppCredentials {
    pub app_id: String,
    pub installation_id: String,
    private_key_pem: String,
}

impl std::fmt::Debug for GitHubAppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    #[serde(default)]
    token: Option<String>,
}

impl GitHubAppCredentials {
    pub fn new(
        app_id: impl Into<String>,
        installation_id: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            installation_id: installation_id.into(),
            private_key_pem: private_key_pem.into(),
        }
    }

    /// Parse the three app keys out of Secret data.
    pub fn from_secret_data(
        data: Option<&BTreeMap<String, ByteString>>,
    ) -> Result<Self, CredentialError> {
        let get = |key: &'static str| -> Result<String, CredentialError> {
            data.and_then(|d| d.get(key))
                .map(|bytes| String::from_utf8_lossy(&bytes.0).trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(CredentialError::MissingKey(key))
        };

        Ok(Self {
            app_id: get(SECRET_KEY_APP_ID)?,
            installation_id: get(SECRET_KEY_INSTALLATION_ID)?,
            private_key_pem: get(SECRET_KEY_PRIVATE_KEY)?,
        })
    }

    /// Sign the short-lived RS256 JWT that authenticates as the app.
    pub fn app_jwt(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let claims = AppClaims {
            iat: now.timestamp() - JWT_CLOCK_SKEW_SECS,
            exp: now.timestamp() + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };
        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())?;
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &key,
        )?)
    }
}

/// Exchanges app JWTs for installation tokens
#[derive(Clone)]
pub struct GitHubAppAuth {
    http: HttpClient,
    api_base: String,
}

impl GitHubAppAuth {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, CredentialError> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self, credentials), fields(installation_id = %credentials.installation_id))]
    pub async fn installation_token(
        &self,
        credentials: &GitHubAppCredentials,
    ) -> Result<String, CredentialError> {
        let jwt = credentials.app_jwt(Utc::now())?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, credentials.installation_id
        );

        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
            .header("X-GitHub-Api-Version", notify::GITHUB_API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InstallationToken = response.json().await?;
        let token = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or(CredentialError::MissingToken)?;

        debug!("Minted installation token");
        Ok(token)
    }
}

/// Mints installation tokens from the app credentials Secret
pub struct GitHubAppTokenProvider {
    secrets: Api<Secret>,
    secret_name: String,
    auth: GitHubAppAuth,
}

impl GitHubAppTokenProvider {
    pub fn new(client: Client, namespace: &str, secret_name: &str, auth: GitHubAppAuth) -> Self {
        Self {
            secrets: Api::namespaced(client, namespace),
            secret_name: secret_name.to_string(),
            auth,
        }
    }
}

#[async_trait]
impl TokenProvider for GitHubAppTokenProvider {
    async fn token(&self) -> Result<String, CredentialError> {
        let secret = self
            .secrets
            .get(&self.secret_name)
            .await
            .map_err(|e| CredentialError::Secret {
                name: self.secret_name.clone(),
                message: e.to_string(),
            })?;

        let credentials = GitHubAppCredentials::from_secret_data(secret.data.as_ref())?;
        self.auth.installation_token(&credentials).await
    }
}

/// Fixed token, for running against a personal or CI token
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.token.clone())
    }
}
