use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use serde::Serialize;

use super::error::{StateError, StateResult};

/// Session lifecycle phase
///
/// Represents where the session is in its connect/disconnect lifecycle.
/// Exactly one phase is current at any time; transitions are validated
/// by [`StateManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// No session has been opened yet
    Idle,

    /// Credential acquisition and channel open in progress
    Connecting,

    /// Duplex channel open, audio and events flowing
    Active,

    /// Teardown in progress
    Closing,

    /// Session ended (cleanly, or after a failed connect)
    Closed,

    /// The transport failed while the session was active
    Errored,
}

impl SessionPhase {
    /// Check if this phase allows audio to flow
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the session is fully torn down
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if a new connect attempt may start from this phase
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Errored)
    }

    /// Get the phase name (for logs and debugging)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Active => "Active",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Errored => "Errored",
        }
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Session phase manager
///
/// Holds the current [`SessionPhase`] behind an `ArcSwap` so reads are
/// lock-free from any thread, and validates every transition against the
/// lifecycle state machine.
pub struct StateManager {
    phase: ArcSwap<SessionPhase>,
}

impl StateManager {
    /// Create a new manager starting in [`SessionPhase::Idle`]
    ///
    /// # Examples
    ///
    /// ```
    /// use vocalink::state::StateManager;
    ///
    /// let manager = StateManager::new();
    /// assert_eq!(manager.current().name(), "Idle");
    /// ```
    pub fn new() -> Self {
        Self {
            phase: ArcSwap::new(Arc::new(SessionPhase::Idle)),
        }
    }

    /// Get the current phase
    ///
    /// Lock-free; safe to call from any thread.
    pub fn current(&self) -> SessionPhase {
        **self.phase.load()
    }

    /// Transition to a new phase
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] if the lifecycle state
    /// machine does not permit the move.
    ///
    /// # Examples
    ///
    /// ```
    /// use vocalink::state::{SessionPhase, StateManager};
    ///
    /// let manager = StateManager::new();
    /// assert!(manager.transition(SessionPhase::Connecting).is_ok());
    /// assert!(manager.transition(SessionPhase::Active).is_ok());
    /// assert!(manager.transition(SessionPhase::Connecting).is_err());
    /// ```
    pub fn transition(&self, new_phase: SessionPhase) -> StateResult<()> {
        let current = self.current();

        if !Self::is_valid_transition(current, new_phase) {
            return Err(StateError::InvalidTransition {
                from: current,
                to: new_phase,
            });
        }

        self.phase.store(Arc::new(new_phase));
        Ok(())
    }

    /// Set the phase unconditionally, skipping validation
    ///
    /// Used for error recovery paths where the normal state machine has
    /// already been abandoned (e.g. a transport failure racing teardown).
    pub fn force_set(&self, new_phase: SessionPhase) {
        self.phase.store(Arc::new(new_phase));
    }

    /// Validate a phase transition against the lifecycle state machine
    fn is_valid_transition(from: SessionPhase, to: SessionPhase) -> bool {
        use SessionPhase::*;

        match (from, to) {
            // Connect attempt starts from any settled phase
            (Idle, Connecting) => true,
            (Closed, Connecting) => true,
            (Errored, Connecting) => true,

            // A connect attempt either succeeds or settles back to Closed
            (Connecting, Active) => true,
            (Connecting, Closed) => true,
            (Connecting, Closing) => true,

            // An active session tears down, is closed by the remote, or errors
            (Active, Closing) => true,
            (Active, Closed) => true,
            (Active, Errored) => true,

            (Closing, Closed) => true,

            // Errored sessions are torn down explicitly
            (Errored, Closing) => true,
            (Errored, Closed) => true,

            _ => false,
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// User-controlled mute flags
///
/// `microphone_muted` gates outbound slice transmission; `speaker_muted`
/// gates playback draining. Both are plain atomics: a toggle lands
/// synchronously and is consulted on every relevant event before it takes
/// effect. Toggling never touches hardware.
#[derive(Debug, Default)]
pub struct ControlFlags {
    microphone_muted: AtomicBool,
    speaker_muted: AtomicBool,
}

impl ControlFlags {
    /// Create flags with both mutes off
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the microphone is muted
    pub fn microphone_muted(&self) -> bool {
        self.microphone_muted.load(Ordering::SeqCst)
    }

    /// Check whether the speaker is muted
    pub fn speaker_muted(&self) -> bool {
        self.speaker_muted.load(Ordering::SeqCst)
    }

    /// Flip the microphone mute flag, returning the new value
    pub fn toggle_microphone(&self) -> bool {
        !self.microphone_muted.fetch_xor(true, Ordering::SeqCst)
    }

    /// Flip the speaker mute flag, returning the new value
    pub fn toggle_speaker(&self) -> bool {
        !self.speaker_muted.fetch_xor(true, Ordering::SeqCst)
    }

    /// Set the speaker mute flag directly
    pub fn set_speaker_muted(&self, muted: bool) {
        self.speaker_muted.store(muted, Ordering::SeqCst);
    }

    /// Reset both flags to their defaults (unmuted)
    pub fn reset(&self) {
        self.microphone_muted.store(false, Ordering::SeqCst);
        self.speaker_muted.store(false, Ordering::SeqCst);
    }
}
