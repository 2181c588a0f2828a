//! Bookkeeping for the global connection state.
//!
//! [`ConnectionTracker`] holds the current [`ConnectionState`], rejects
//! transitions that [`ConnectionState::can_transition_to`] forbids, and keeps
//! a bounded history of the transitions it accepted.
//!
//! ```
//! use braillink_core::ConnectionState;
//! use braillink_service::ConnectionTracker;
//!
//! let mut tracker = ConnectionTracker::new();
//! tracker.transition_to(ConnectionState::Connecting).unwrap();
//! tracker.transition_to(ConnectionState::Connected).unwrap();
//!
//! assert!(tracker.transition_to(ConnectionState::Connecting).is_err());
//! assert_eq!(tracker.history().len(), 2);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use braillink_core::{ConnectionState, Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of state transitions to keep in history.
///
/// A connect/disconnect cycle records two or three transitions, so this
/// covers the last few dozen cycles.
const MAX_HISTORY_SIZE: usize = 100;

/// A single accepted state transition.
///
/// The timestamp is not serialized; `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,

    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: ConnectionState, to: ConnectionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since the transition happened.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Current connection state plus transition history.
///
/// Not synchronized; the connection state machine owns it exclusively.
#[derive(Debug)]
pub struct ConnectionTracker {
    current_state: ConnectionState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl ConnectionTracker {
    /// Tracker starting out `Disconnected`.
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.current_state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Accepted transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The most recent `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Move to `new_state` if the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] and leaves the tracker
    /// untouched if the transition is not allowed.
    pub fn transition_to(&mut self, new_state: ConnectionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.current_state = new_state;
        self.state_entered_at = transition.timestamp;

        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        Ok(transition)
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_starts_disconnected() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.current_state(), ConnectionState::Disconnected);
        assert!(tracker.history().is_empty());
    }

    #[rstest]
    #[case::skip_connecting(ConnectionState::Connected)]
    #[case::self_loop(ConnectionState::Disconnected)]
    fn test_invalid_transition_leaves_state(#[case] target: ConnectionState) {
        let mut tracker = ConnectionTracker::new();

        let result = tracker.transition_to(target);
        assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
        assert_eq!(tracker.current_state(), ConnectionState::Disconnected);
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_error_is_terminal() {
        let mut tracker = ConnectionTracker::new();
        tracker.transition_to(ConnectionState::Error).unwrap();

        for target in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert!(tracker.transition_to(target).is_err());
        }
    }

    #[test]
    fn test_history_records_full_cycle() {
        let mut tracker = ConnectionTracker::new();
        tracker.transition_to(ConnectionState::Connecting).unwrap();
        tracker.transition_to(ConnectionState::Connected).unwrap();
        tracker.transition_to(ConnectionState::Disconnected).unwrap();

        let last = tracker.last_transitions(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].to, ConnectionState::Connected);
        assert_eq!(last[1].from, ConnectionState::Connected);
        assert_eq!(last[1].to, ConnectionState::Disconnected);
    }

    #[test]
    fn test_history_size_limit() {
        let mut tracker = ConnectionTracker::new();
        for _ in 0..60 {
            tracker.transition_to(ConnectionState::Connecting).unwrap();
            tracker.transition_to(ConnectionState::Disconnected).unwrap();
        }

        assert_eq!(tracker.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(tracker.history()[0].from, ConnectionState::Disconnected);
    }

    #[test]
    fn test_transition_serialization_skips_timestamp() {
        let transition = StateTransition::new(
            ConnectionState::Connecting,
            ConnectionState::Connected,
        );
        let json = serde_json::to_string(&transition).unwrap();
        assert_eq!(json, r#"{"from":"connecting","to":"connected"}"#);
    }
}
