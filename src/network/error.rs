/// Network error types for the duplex channel
///
/// This module defines error types used throughout the network layer.

use thiserror::Error;

/// Network-related errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to open the duplex channel
    #[error("Failed to connect to agent: {0}")]
    ConnectionFailed(String),

    /// Authentication rejected (expired or invalid access token)
    #[error("Authentication failed: access token rejected")]
    AuthenticationFailed,

    /// Channel open timed out
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize an outbound frame
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Failed to build the HTTP upgrade request
    #[error("Failed to build HTTP request: {0}")]
    HttpError(String),

    /// Channel closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<tokio_tungstenite::tungstenite::http::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        NetworkError::HttpError(err.to_string())
    }
}
