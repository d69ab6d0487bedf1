/// Wire message types for the voice-agent duplex channel
///
/// This module defines every frame exchanged with the remote conversational
/// agent. All frames are JSON text messages tagged by a `type` field.

use serde::{Deserialize, Serialize};

// ============================================================================
// Client -> Agent Messages
// ============================================================================

/// One-time session configuration frame
///
/// Sent exactly once, immediately after the channel reports open. Carries
/// the agent persona / system instructions for the conversation.
///
/// # Example
/// ```
/// use vocalink::network::messages::SessionSettings;
///
/// let settings = SessionSettings::new("You are a friendly storyteller.");
/// let json = serde_json::to_string(&settings).unwrap();
/// assert!(json.contains("\"type\":\"session_settings\""));
/// ```
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Frame type identifier (always "session_settings")
    #[serde(rename = "type")]
    pub message_type: &'static str,

    /// Agent persona / system instructions
    pub system_prompt: String,
}

impl SessionSettings {
    /// Create a new session settings frame
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            message_type: "session_settings",
            system_prompt: system_prompt.into(),
        }
    }
}

/// Captured audio slice frame
///
/// One frame per 100ms slice of microphone audio, Base64-encoded
/// PCM (i16 little-endian, 16kHz mono).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioInput {
    /// Frame type identifier (always "audio_input")
    #[serde(rename = "type")]
    pub message_type: &'static str,

    /// Base64-encoded PCM audio data
    pub data: String,
}

impl AudioInput {
    /// Create a new audio input frame
    pub fn new(data: String) -> Self {
        Self {
            message_type: "audio_input",
            data,
        }
    }
}

/// Union type for all client frames
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ClientMessage {
    /// One-time session configuration
    SessionSettings(SessionSettings),
    /// Captured audio slice
    AudioInput(AudioInput),
}

// ============================================================================
// Agent -> Client Messages
// ============================================================================

/// Chat message body carried by transcript frames
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MessageContent {
    /// Transcript text
    #[serde(default)]
    pub content: String,
}

/// Frames received from the agent
///
/// Uses serde's tagged enum feature to deserialize based on the `type`
/// field. Every frame is consumed immediately by the dispatcher and never
/// retained.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Final transcript of what the user said
    #[serde(rename = "user_message")]
    UserMessage {
        /// Transcript body
        message: MessageContent,
    },

    /// Assistant transcript for the current turn
    ///
    /// Cumulative: each frame carries the full content-so-far, so the
    /// latest frame supersedes all earlier ones within the turn.
    #[serde(rename = "assistant_message")]
    AssistantMessage {
        /// Transcript body (content-so-far)
        message: MessageContent,
    },

    /// End of the assistant's turn
    #[serde(rename = "assistant_end")]
    AssistantEnd,

    /// Synthesized speech chunk (Base64-encoded PCM)
    #[serde(rename = "audio_output")]
    AudioOutput {
        /// Base64-encoded audio payload
        data: String,
    },

    /// The user started talking over the agent
    #[serde(rename = "user_interruption")]
    UserInterruption,

    /// Error reported by the agent
    #[serde(rename = "error")]
    Error {
        /// Error description
        message: String,
    },
}

impl InboundMessage {
    /// Check if this frame carries transcript text
    pub fn is_transcript(&self) -> bool {
        matches!(
            self,
            InboundMessage::UserMessage { .. } | InboundMessage::AssistantMessage { .. }
        )
    }

    /// Check if this frame carries audio
    pub fn is_audio(&self) -> bool {
        matches!(self, InboundMessage::AudioOutput { .. })
    }

    /// Check if this is an error frame
    pub fn is_error(&self) -> bool {
        matches!(self, InboundMessage::Error { .. })
    }

    /// Get the transcript text if this is a transcript frame
    pub fn text(&self) -> Option<&str> {
        match self {
            InboundMessage::UserMessage { message } => Some(&message.content),
            InboundMessage::AssistantMessage { message } => Some(&message.content),
            _ => None,
        }
    }

    /// Get the error message if this is an error frame
    pub fn error_message(&self) -> Option<&str> {
        match self {
            InboundMessage::Error { message } => Some(message),
            _ => None,
        }
    }
}
