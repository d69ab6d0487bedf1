use thiserror::Error;

use super::session_state::SessionPhase;

/// State-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    /// Invalid phase transition
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
