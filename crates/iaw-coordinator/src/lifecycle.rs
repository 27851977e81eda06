//! Poll lifecycle of one album coordinator
//!
//! ```text
//! Uninitialized → Polling ⇄ AlbumMissing
//!              ↘ AlbumMissing
//!
//! any → Stopped (terminal)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a coordinator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// No poll has completed yet
    Uninitialized,
    /// The album was fetched by the last successful poll
    Polling,
    /// The server answered 404 for the album
    AlbumMissing,
    /// Unloaded; nothing is published or persisted any more
    Stopped,
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid poll state transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: PollState,
    pub to: PollState,
    pub reason: &'static str,
}

impl PollState {
    /// Attempt a transition to a new state
    pub fn try_transition(self, to: PollState) -> Result<PollState, InvalidTransition> {
        use PollState::*;

        let valid = match (self, to) {
            // Stopped is terminal
            (Stopped, _) => false,
            (_, Stopped) => true,

            (Uninitialized, Polling) => true,
            (Uninitialized, AlbumMissing) => true,

            (Polling, Polling) => true,
            (Polling, AlbumMissing) => true,

            // A reappearing album starts from a fresh baseline
            (AlbumMissing, Polling) => true,
            (AlbumMissing, AlbumMissing) => true,

            _ => false,
        };

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: Self::transition_error_reason(self, to),
            })
        }
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition_to(self, to: PollState) -> bool {
        self.try_transition(to).is_ok()
    }

    /// Whether the coordinator still polls
    pub fn is_active(self) -> bool {
        self != PollState::Stopped
    }

    fn transition_error_reason(from: PollState, to: PollState) -> &'static str {
        use PollState::*;

        match (from, to) {
            (Stopped, _) => "Stopped is terminal - coordinator cannot restart",
            (_, Uninitialized) => "Cannot return to Uninitialized once a poll has completed",
            _ => "Invalid state transition",
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PollState::Uninitialized => "uninitialized",
            PollState::Polling => "polling",
            PollState::AlbumMissing => "album_missing",
            PollState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PollState::*;

    #[test]
    fn test_first_poll_transitions() {
        assert_eq!(Uninitialized.try_transition(Polling), Ok(Polling));
        assert!(Uninitialized.can_transition_to(AlbumMissing));
    }

    #[test]
    fn test_polling_and_missing_alternate() {
        assert!(Polling.can_transition_to(Polling));
        assert!(Polling.can_transition_to(AlbumMissing));
        assert!(AlbumMissing.can_transition_to(Polling));
        assert!(AlbumMissing.can_transition_to(AlbumMissing));
    }

    #[test]
    fn test_any_state_can_stop() {
        for state in [Uninitialized, Polling, AlbumMissing] {
            assert!(state.can_transition_to(Stopped));
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        let err = Stopped.try_transition(Polling).unwrap_err();
        assert_eq!(err.from, Stopped);
        assert!(err.reason.contains("terminal"));
        assert!(!Stopped.can_transition_to(Stopped));
        assert!(!Stopped.is_active());
    }

    #[test]
    fn test_cannot_return_to_uninitialized() {
        let err = Polling.try_transition(Uninitialized).unwrap_err();
        assert_eq!(err.to, Uninitialized);
        assert!(err.reason.contains("Uninitialized"));
    }

    #[test]
    fn test_display_is_snake_case() {
        assert_eq!(AlbumMissing.to_string(), "album_missing");
        assert_eq!(serde_json::to_string(&AlbumMissing).unwrap(), "\"album_missing\"");
    }
}
