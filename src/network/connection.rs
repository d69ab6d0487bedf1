/// WebSocket connection to the voice-agent realtime API
///
/// This module provides the duplex channel used for streaming audio out
/// and receiving transcript/speech events in.

use crate::network::error::{NetworkError, NetworkResult};
use futures_util::{
    SinkExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Configuration for a voice-agent connection
///
/// Contains everything needed to open the duplex channel and declare the
/// agent's persona.
///
/// # Example
/// ```no_run
/// use vocalink::network::ConnectionConfig;
///
/// let config = ConnectionConfig::new("You are a patient tutor.")
///     .with_config_id("b3a1f")
///     .with_timeout(5000);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the conversational agent
    pub endpoint: String,

    /// Optional server-side agent configuration id
    pub config_id: Option<String>,

    /// Agent persona / system instructions, sent once at channel open
    pub system_prompt: String,

    /// Audio sample rate in Hz for both directions (typically 16000)
    pub sample_rate: u32,

    /// Channel open timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Create a new configuration with the given system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            endpoint: "wss://api.hume.ai/v0/evi/chat".to_string(),
            config_id: None,
            system_prompt: system_prompt.into(),
            sample_rate: 16000,
            timeout_ms: 10000, // 10 seconds default
        }
    }

    /// Set the WebSocket endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the server-side agent configuration id
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Set the audio sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the channel open timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL with query parameters
    pub fn build_url(&self, access_token: &str) -> NetworkResult<String> {
        if self.endpoint.is_empty() {
            return Err(NetworkError::InvalidConfig("empty endpoint".to_string()));
        }

        let mut url = format!("{}?access_token={}", self.endpoint, access_token);

        if let Some(ref config_id) = self.config_id {
            url.push_str(&format!("&config_id={}", config_id));
        }

        Ok(url)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Duplex WebSocket connection to the conversational agent
///
/// Thin lifecycle wrapper: opens the channel with a timeout, sends the
/// one-time configuration frame, then splits into read/write halves for
/// the concurrent sender and receiver tasks.
#[derive(Debug)]
pub struct AgentConnection {
    ws_stream: WsStream,
}

impl AgentConnection {
    /// Open the duplex channel
    ///
    /// The returned connection is ready as soon as the WebSocket handshake
    /// completes; no remote acknowledgement is awaited.
    ///
    /// # Arguments
    /// * `access_token` - short-lived credential from the token provider
    /// * `config` - connection configuration
    ///
    /// # Errors
    /// Returns [`NetworkError::Timeout`] if the open-timeout elapses,
    /// [`NetworkError::AuthenticationFailed`] on a 401 response, or
    /// [`NetworkError::ConnectionFailed`] for any other handshake failure.
    pub async fn connect(access_token: &str, config: &ConnectionConfig) -> NetworkResult<Self> {
        info!("Connecting to voice agent");

        let url = config.build_url(access_token)?;
        debug!(endpoint = %config.endpoint, "Opening duplex channel");

        let connect_future = connect_async(url);
        let timeout = tokio::time::Duration::from_millis(config.timeout_ms);

        let (ws_stream, response) = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| NetworkError::Timeout(config.timeout_ms))?
            .map_err(|e| {
                if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                    if resp.status() == 401 {
                        return NetworkError::AuthenticationFailed;
                    }
                }
                NetworkError::ConnectionFailed(e.to_string())
            })?;

        info!(status = %response.status(), "Duplex channel open");

        Ok(Self { ws_stream })
    }

    /// Send a frame to the agent
    ///
    /// Serializes the frame to JSON and sends it as a text message.
    ///
    /// # Errors
    /// Returns `NetworkError` if serialization or sending fails
    pub async fn send<T: Serialize>(&mut self, message: &T) -> NetworkResult<()> {
        let json = serde_json::to_string(message)?;
        debug!(bytes = json.len(), "Sending frame");

        self.ws_stream
            .send(Message::Text(json.into()))
            .await
            .map_err(NetworkError::WebSocketError)?;

        Ok(())
    }

    /// Split the connection into separate read and write halves
    ///
    /// This consumes the connection; the halves are handed to the sender
    /// and receiver tasks which run independently.
    pub fn split(self) -> (WsWriter, WsReader) {
        use futures_util::StreamExt;
        self.ws_stream.split()
    }
}
