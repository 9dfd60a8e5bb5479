//! Link State Machine
//!
//! Defines the connection states of a single peer link and the valid
//! transitions between them.

use std::fmt;

/// Connection state of a peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No local Bluetooth adapter; the link never connects
    NoAdapter,
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Human-readable state label
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NoAdapter => "no bluetooth available",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// No adapter found at construction
    AdapterMissing,
    /// A connect attempt was started
    ConnectStarted,
    /// The stream was established
    Established,
    /// The connect attempt failed or timed out
    ConnectFailed,
    /// Read/write failure, explicit disconnect or liveness failure
    LinkLost,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: LinkEvent,
    },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

/// State machine for one peer link
#[derive(Debug)]
pub struct LinkStateMachine {
    current_state: ConnectionState,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: LinkEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self.current_state, event) {
            (Disconnected, AdapterMissing) => Some(NoAdapter),
            (Disconnected, ConnectStarted) => Some(Connecting),
            (Connecting, Established) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Disconnected),
            (Connected, LinkLost) => Some(Disconnected),
            // NoAdapter is never left
            _ => None,
        }
    }
}
