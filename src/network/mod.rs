/// Network communication and WebSocket handling
///
/// This module provides types and utilities for communicating with the
/// remote conversational agent over a duplex WebSocket channel.

/// WebSocket connection management
pub mod connection;

/// Network error types
pub mod error;

/// Wire message type definitions
pub mod messages;

/// Async tasks for concurrent send/receive operations
pub mod tasks;

// Re-export commonly used types
pub use connection::{AgentConnection, ConnectionConfig, WsReader, WsWriter};
pub use error::{NetworkError, NetworkResult};
pub use messages::{AudioInput, ClientMessage, InboundMessage, MessageContent, SessionSettings};
