use thiserror::Error;

/// Credential acquisition errors
///
/// Fatal to the connect attempt that triggered them; there is no
/// automatic retry and no refresh path for the short-lived token.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The token request failed (transport, non-success status, or body)
    #[error("Token request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The endpoint answered but handed back no usable token
    #[error("Token endpoint returned an empty token")]
    EmptyToken,
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;
