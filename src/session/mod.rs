/// Voice conversation session management
///
/// Ties the credential provider, duplex channel, capture pipeline, and
/// playback queue together behind the public `VoiceSession` API.

/// Inbound event dispatcher
pub mod dispatcher;

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{
    AudioError, AudioOutput, CaptureDevice, CapturePipeline, PlaybackQueue,
};
use crate::auth::{CredentialError, CredentialProvider};
use crate::network::tasks::{receiver_task, sender_task};
use crate::network::{
    AgentConnection, ConnectionConfig, InboundMessage, NetworkError, SessionSettings,
};
use crate::session::dispatcher::EventDispatcher;
use crate::state::{ControlFlags, SessionPhase, StateError, StateManager};

/// Events delivered to the caller
///
/// Emitted in the order the underlying frames arrived; transcript events
/// always carry final text for their turn.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// Final transcript of what the user said
    UserMessage {
        /// Transcript text
        text: String,
    },

    /// Completed assistant turn transcript
    AssistantMessage {
        /// Transcript text
        text: String,
    },

    /// The user talked over the agent; playback was dropped
    Interrupted,

    /// Error reported by the agent or transport; the session stays open
    Error {
        /// Error description
        message: String,
    },

    /// The channel closed; the session will not reconnect by itself
    Closed,
}

/// Caller's event callback
pub type EventCallback = Arc<dyn Fn(VoiceEvent) + Send + Sync>;

/// Session errors surfaced by the public API
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token acquisition failed
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Channel open or transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    /// Audio capture or playback failure
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Lifecycle violation (e.g. connect while already active)
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Operation requires an active session
    #[error("Session is not connected")]
    NotConnected,
}

/// Observable session status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Channel open and session active
    pub is_connected: bool,
    /// Microphone acquired and capturing
    pub is_listening: bool,
    /// Inbound audio queued or rendering
    pub is_speaking: bool,
    /// Microphone muted
    pub is_muted: bool,
    /// Speaker muted
    pub speaker_muted: bool,
    /// Most recent error, if any
    pub last_error: Option<String>,
}

/// One voice conversation with a remote agent
///
/// Owns the whole session lifecycle: credential acquisition, channel open,
/// one-time configuration, the concurrent sender/receiver/dispatcher
/// tasks, and deterministic teardown. One logical session per instance;
/// reconnection is always explicit.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use vocalink::audio::{CpalAudioOutput, CpalCaptureDevice};
/// use vocalink::auth::HttpTokenProvider;
/// use vocalink::network::ConnectionConfig;
/// use vocalink::session::VoiceSession;
///
/// #[tokio::main]
/// async fn main() {
///     let config = ConnectionConfig::new("You are a friendly storyteller.");
///     let output = Arc::new(CpalAudioOutput::new(16000).unwrap());
///
///     let mut session = VoiceSession::new(
///         config,
///         Arc::new(HttpTokenProvider::new("https://backend.example/voice/token")),
///         Box::new(CpalCaptureDevice::new()),
///         output,
///         |event| println!("{:?}", event),
///     );
///
///     session.connect().await.unwrap();
///     session.start_listening().unwrap();
///     // ...
///     session.disconnect().await.unwrap();
/// }
/// ```
pub struct VoiceSession {
    /// Connection configuration
    config: ConnectionConfig,
    /// Injected credential source
    credentials: Arc<dyn CredentialProvider>,
    /// Lifecycle phase
    state: Arc<StateManager>,
    /// Mute flags
    flags: Arc<ControlFlags>,
    /// Inbound playback queue
    playback: PlaybackQueue,
    /// Outbound capture pipeline
    pipeline: CapturePipeline,
    /// Most recent error
    last_error: Arc<ArcSwapOption<String>>,
    /// Caller's event callback
    on_event: EventCallback,
    /// Outbound audio channel (present while connected)
    outbound_tx: Option<mpsc::Sender<String>>,
    /// Sender task handle
    sender_handle: Option<JoinHandle<crate::network::NetworkResult<()>>>,
    /// Receiver wrapper task handle
    receiver_handle: Option<JoinHandle<()>>,
    /// Dispatcher task handle
    dispatch_handle: Option<JoinHandle<()>>,
}

impl VoiceSession {
    /// Create a session over injected capabilities
    ///
    /// Nothing is acquired or connected until [`connect`](Self::connect)
    /// and [`start_listening`](Self::start_listening) are called.
    pub fn new<F>(
        config: ConnectionConfig,
        credentials: Arc<dyn CredentialProvider>,
        capture: Box<dyn CaptureDevice>,
        output: Arc<dyn AudioOutput>,
        on_event: F,
    ) -> Self
    where
        F: Fn(VoiceEvent) + Send + Sync + 'static,
    {
        let flags = Arc::new(ControlFlags::new());
        let playback = PlaybackQueue::new(output, Arc::clone(&flags));
        let pipeline = CapturePipeline::new(capture, Arc::clone(&flags), config.sample_rate);

        Self {
            config,
            credentials,
            state: Arc::new(StateManager::new()),
            flags,
            playback,
            pipeline,
            last_error: Arc::new(ArcSwapOption::empty()),
            on_event: Arc::new(on_event),
            outbound_tx: None,
            sender_handle: None,
            receiver_handle: None,
            dispatch_handle: None,
        }
    }

    /// Open the session
    ///
    /// Obtains a credential, opens the duplex channel, sends the one-time
    /// configuration frame, and spawns the sender/receiver/dispatcher
    /// tasks. Completes as soon as the channel reports open; readiness is
    /// declared optimistically, no remote acknowledgement is awaited.
    ///
    /// # Errors
    /// [`SessionError::Credential`] if the provider fails (the session
    /// settles `Closed`, never `Active`); [`SessionError::Transport`] if
    /// the channel fails to open or the open-timeout elapses.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.state.transition(SessionPhase::Connecting)?;
        self.last_error.store(None);

        info!("Connecting voice session");

        let token = match self.credentials.fetch_token().await {
            Ok(token) => token,
            Err(e) => {
                self.record_error(e.to_string());
                self.state.force_set(SessionPhase::Closed);
                return Err(SessionError::Credential(e));
            }
        };

        let mut connection =
            match AgentConnection::connect(&token.access_token, &self.config).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.record_error(e.to_string());
                    self.state.force_set(SessionPhase::Closed);
                    return Err(SessionError::Transport(e));
                }
            };

        // Exactly one configuration frame, immediately after open
        let settings = SessionSettings::new(self.config.system_prompt.clone());
        if let Err(e) = connection.send(&settings).await {
            self.record_error(e.to_string());
            self.state.force_set(SessionPhase::Closed);
            return Err(SessionError::Transport(e));
        }

        let (writer, reader) = connection.split();

        let (audio_tx, audio_rx) = mpsc::channel::<String>(100);
        let (msg_tx, mut msg_rx) = mpsc::channel::<InboundMessage>(100);

        self.outbound_tx = Some(audio_tx);
        self.sender_handle = Some(tokio::spawn(sender_task(writer, audio_rx)));

        let state = Arc::clone(&self.state);
        let last_error = Arc::clone(&self.last_error);
        self.receiver_handle = Some(tokio::spawn(async move {
            if let Err(e) = receiver_task(reader, msg_tx).await {
                warn!("Transport failed: {}", e);
                last_error.store(Some(Arc::new(e.to_string())));
                if state.current().is_active() {
                    state.force_set(SessionPhase::Errored);
                }
            }
        }));

        let mut dispatcher =
            EventDispatcher::new(self.playback.clone(), Arc::clone(&self.on_event));
        let state = Arc::clone(&self.state);
        let on_event = Arc::clone(&self.on_event);
        self.dispatch_handle = Some(tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                // One frame fully dispatched before the next is taken
                dispatcher.dispatch(msg);
            }

            // The frame stream ended: remote closure (clean or errored).
            // User-initiated teardown goes through Closing and is not
            // reported again here.
            match state.current() {
                SessionPhase::Active => {
                    debug!("Channel closed by remote");
                    state.force_set(SessionPhase::Closed);
                    on_event(VoiceEvent::Closed);
                }
                SessionPhase::Errored => {
                    on_event(VoiceEvent::Closed);
                }
                _ => {}
            }
        }));

        self.state.transition(SessionPhase::Active)?;
        info!("Voice session active");

        Ok(())
    }

    /// Tear the session down
    ///
    /// Stops the capture pipeline (releasing the microphone), closes the
    /// channel, flushes the playback queue, and resets the mute flags.
    /// Idempotent: a second call is a no-op. Safe to call while a decode
    /// or playback is outstanding; discarded in-flight work is ignored.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        let phase = self.state.current();
        if phase.is_closed() {
            debug!("Session already closed");
            return Ok(());
        }

        info!("Disconnecting voice session");
        self.state.force_set(SessionPhase::Closing);

        // Release the microphone first
        self.pipeline.stop().await;

        // Dropping the outbound channel ends the sender task, which closes
        // the socket
        self.outbound_tx = None;
        if let Some(handle) = self.sender_handle.take() {
            match handle.await {
                Ok(Ok(())) => debug!("Sender task completed"),
                Ok(Err(e)) => warn!("Sender task completed with error: {}", e),
                Err(e) => error!("Sender task panicked: {}", e),
            }
        }

        // Don't wait on the remote to acknowledge the close; any in-flight
        // inbound work is discarded and its results ignored
        if let Some(handle) = self.receiver_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.dispatch_handle.take() {
            handle.abort();
        }

        self.playback.flush();
        self.flags.reset();

        self.state.force_set(SessionPhase::Closed);
        info!("Voice session closed");

        Ok(())
    }

    /// Acquire the microphone and start streaming captured audio
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] if the session is not active;
    /// [`SessionError::Audio`] with
    /// [`AudioError::PermissionDenied`](crate::audio::AudioError::PermissionDenied)
    /// if microphone access is denied; listening stays false and the open
    /// session is unaffected.
    pub fn start_listening(&mut self) -> Result<(), SessionError> {
        if !self.state.current().is_active() {
            return Err(SessionError::NotConnected);
        }

        let outbound = self
            .outbound_tx
            .clone()
            .ok_or(SessionError::NotConnected)?;

        self.pipeline.start(outbound)?;
        Ok(())
    }

    /// Stop capturing and release the microphone
    ///
    /// Safe to call when not listening.
    pub async fn stop_listening(&mut self) {
        self.pipeline.stop().await;
    }

    /// Flip the microphone mute flag, returning the new value
    ///
    /// Never starts or stops hardware; a muted pipeline keeps the device
    /// acquired and drops slices before transmission.
    pub fn toggle_mute(&self) -> bool {
        let muted = self.flags.toggle_microphone();
        debug!(muted, "Microphone mute toggled");
        muted
    }

    /// Flip the speaker mute flag, returning the new value
    ///
    /// Muting lets the chunk currently rendering finish, then discards the
    /// rest of the queue.
    pub fn toggle_speaker_mute(&self) -> bool {
        let muted = !self.flags.speaker_muted();
        self.playback.set_speaker_muted(muted);
        debug!(muted, "Speaker mute toggled");
        muted
    }

    /// Whether the session is active
    pub fn is_connected(&self) -> bool {
        self.state.current().is_active()
    }

    /// Whether the microphone is acquired and capturing
    pub fn is_listening(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Whether inbound audio is queued or rendering
    pub fn is_speaking(&self) -> bool {
        self.playback.is_speaking()
    }

    /// Whether the microphone is muted
    pub fn is_muted(&self) -> bool {
        self.flags.microphone_muted()
    }

    /// Whether the speaker is muted
    pub fn speaker_muted(&self) -> bool {
        self.flags.speaker_muted()
    }

    /// Most recent error, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.load_full().map(|e| (*e).clone())
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.state.current()
    }

    /// Full status snapshot
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_connected: self.is_connected(),
            is_listening: self.is_listening(),
            is_speaking: self.is_speaking(),
            is_muted: self.is_muted(),
            speaker_muted: self.speaker_muted(),
            last_error: self.last_error(),
        }
    }

    fn record_error(&self, message: String) {
        warn!("Session error: {}", message);
        self.last_error.store(Some(Arc::new(message)));
    }
}
