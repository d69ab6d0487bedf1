/// Session lifecycle phase machine and user-controlled mute flags
pub mod session_state;

/// State-related error types
pub mod error;

// Re-export commonly used types
pub use error::{StateError, StateResult};
pub use session_state::{ControlFlags, SessionPhase, StateManager};
