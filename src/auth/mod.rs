/// Credential acquisition for the voice-agent channel
///
/// The remote agent authenticates each session with a short-lived access
/// token issued by a separate credential endpoint. The provider is a trait
/// seam so tests and embedders can substitute their own source.

/// Credential error types
pub mod error;

pub use error::{CredentialError, CredentialResult};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Short-lived access credential for one session
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    /// The opaque token value
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Source of short-lived access tokens
///
/// Implementations must treat every failure as fatal to the current
/// connect attempt; expiry is handled by reconnecting, not refreshing.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch a fresh access token
    ///
    /// # Errors
    /// Returns [`CredentialError`] if the token cannot be obtained
    async fn fetch_token(&self) -> CredentialResult<AccessToken>;
}

/// HTTP credential provider
///
/// Posts to the configured token endpoint and deserializes the
/// `{"accessToken": "..."}` response body.
///
/// # Example
/// ```no_run
/// use vocalink::auth::HttpTokenProvider;
///
/// let provider = HttpTokenProvider::new("https://backend.example/voice/token");
/// ```
pub struct HttpTokenProvider {
    client: reqwest::Client,
    token_url: String,
}

impl HttpTokenProvider {
    /// Create a provider for the given token endpoint
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> CredentialResult<AccessToken> {
        debug!(url = %self.token_url, "Requesting access token");

        let token: AccessToken = self
            .client
            .post(&self.token_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if token.access_token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }

        info!("Access token obtained");
        Ok(token)
    }
}

/// Credential provider wrapping an already-issued token
///
/// Useful for the demo binary and for tests that stand in for the
/// credential endpoint.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap an existing token value
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> CredentialResult<AccessToken> {
        if self.token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(AccessToken {
            access_token: self.token.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_deserialization() {
        let json = r#"{ "accessToken": "tok-abc123" }"#;
        let token: AccessToken = serde_json::from_str(json).unwrap();

        assert_eq!(token.access_token, "tok-abc123");
    }

    #[test]
    fn test_access_token_rejects_wrong_field() {
        let json = r#"{ "access_token": "tok" }"#;
        assert!(serde_json::from_str::<AccessToken>(json).is_err());
    }

    #[tokio::test]
    async fn test_static_provider_returns_token() {
        let provider = StaticTokenProvider::new("tok-1");
        let token = provider.fetch_token().await.unwrap();

        assert_eq!(token.access_token, "tok-1");
    }

    #[tokio::test]
    async fn test_static_provider_rejects_empty_token() {
        let provider = StaticTokenProvider::new("");
        let result = provider.fetch_token().await;

        assert!(matches!(result, Err(CredentialError::EmptyToken)));
    }
}
