use tracing::debug;

use crate::audio::PlaybackQueue;
use crate::network::messages::InboundMessage;
use crate::session::{EventCallback, VoiceEvent};

/// Inbound event dispatcher
///
/// A reducer over the ordered stream of inbound frames: each frame is
/// processed synchronously and completely before the next is taken, so the
/// transport's arrival order is the only order there is. Owns the per-turn
/// transcript accumulation buffer.
pub struct EventDispatcher {
    /// Assistant transcript for the current turn (content-so-far)
    turn_buffer: String,
    /// Playback queue fed by audio frames
    playback: PlaybackQueue,
    /// Caller's event callback
    on_event: EventCallback,
}

impl EventDispatcher {
    /// Create a dispatcher feeding the given queue and callback
    pub fn new(playback: PlaybackQueue, on_event: EventCallback) -> Self {
        Self {
            turn_buffer: String::new(),
            playback,
            on_event,
        }
    }

    /// Process one inbound frame
    pub fn dispatch(&mut self, msg: InboundMessage) {
        match msg {
            InboundMessage::UserMessage { message } => {
                debug!("User transcript received");
                (self.on_event)(VoiceEvent::UserMessage {
                    text: message.content,
                });
            }

            InboundMessage::AssistantMessage { message } => {
                // Each frame carries the full content-so-far: overwrite,
                // never append
                self.turn_buffer = message.content;
            }

            InboundMessage::AssistantEnd => {
                if !self.turn_buffer.is_empty() {
                    let text = std::mem::take(&mut self.turn_buffer);
                    debug!(chars = text.len(), "Assistant turn complete");
                    (self.on_event)(VoiceEvent::AssistantMessage { text });
                }
            }

            InboundMessage::AudioOutput { data } => {
                self.playback.enqueue(data);
            }

            InboundMessage::UserInterruption => {
                debug!("User interruption");
                self.playback.interrupt();
                (self.on_event)(VoiceEvent::Interrupted);
            }

            InboundMessage::Error { message } => {
                // Surfaced to the caller; the session stays open until
                // the caller decides to disconnect
                (self.on_event)(VoiceEvent::Error { message });
            }
        }
    }
}
