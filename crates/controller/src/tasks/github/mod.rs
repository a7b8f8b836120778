//! GitHub credentials for comment delivery

pub mod auth;

pub use auth::{
    CredentialError, GitHubAppAuth, GitHubAppCredentials, GitHubAppTokenProvider,
    StaticTokenProvider, TokenProvider,
};

#[cfg(test)]
pub use auth::MockTokenProvider;
