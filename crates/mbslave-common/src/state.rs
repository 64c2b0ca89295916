//! Lifecycle state of the request serialization engine.
//!
//! The engine starts in RUNNING as soon as the server is built and moves to
//! CLOSED exactly once, when the owning server closes its inbound queue.
//! There is no way back: a closed server is discarded, not restarted.

use crate::error::{SlaveError, SlaveResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Draining the inbound request queue.
    #[default]
    Running,
    /// Queue closed; the worker has exited or is about to.
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl EngineState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        matches!((self, target), (Self::Running, Self::Closed))
    }

    /// Attempt to transition to `target`, returning error if invalid.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::InvalidStateTransition`] for anything other
    /// than RUNNING to CLOSED.
    pub fn transition_to(&mut self, target: EngineState) -> SlaveResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(SlaveError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Whether requests are still being accepted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self == Self::Running
    }
}
