//! Identity tokens for upstreams that sit behind an identity-aware proxy.

use crate::config::IdentityConfig;
use async_trait::async_trait;
use http::StatusCode;
use std::time::Duration;

const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("identity provider returned status {0}")]
    Status(StatusCode),
    #[error("identity provider returned no token for audience {0}")]
    EmptyToken(String),
}

/// Source of bearer tokens scoped to an audience.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, audience: &str) -> Result<String, IdentityError>;
}

/// Fetches identity tokens from the compute metadata server of the host the
/// proxy runs on.
pub struct MetadataServerTokenProvider {
    client: reqwest::Client,
    identity_url: String,
}

impl MetadataServerTokenProvider {
    pub fn new(config: &IdentityConfig, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let identity_url = format!(
            "http://{}{}",
            config.metadata_host.trim_end_matches('/'),
            IDENTITY_PATH
        );

        Ok(MetadataServerTokenProvider {
            client,
            identity_url,
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataServerTokenProvider {
    async fn fetch_token(&self, audience: &str) -> Result<String, IdentityError> {
        let response = self
            .client
            .get(&self.identity_url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", audience), ("format", "full")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Status(response.status()));
        }

        let token = response.text().await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::EmptyToken(audience.to_string()));
        }

        Ok(token.to_string())
    }
}
