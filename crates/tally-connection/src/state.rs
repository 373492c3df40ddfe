//! Connection lifecycle state machine.

use std::fmt;

/// The lifecycle state of the client's logical room connection.
///
/// ```text
///            ┌──────────────────────────────┐
///            ▼                              │
/// Idle → Connecting → Open → Reconnecting ──┘
///            │          │          │
///            └──────────┴──────────┴──→ Closed → Connecting
/// ```
///
/// - **Idle**: never connected.
/// - **Connecting**: a dial is in flight.
/// - **Open**: the socket is up and `join` has been sent.
/// - **Reconnecting**: the socket dropped and a retry is scheduled.
/// - **Closed**: the logical connection is over (client disconnect,
///   auth failure, server request, or retries exhausted). A new
///   `connect` starts over from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Open | Reconnecting | Closed)
                | (Open, Reconnecting | Closed)
                | (Reconnecting, Connecting | Closed)
                | (Closed, Connecting)
        )
    }

    /// Returns `true` if outbound messages can be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` while the manager is still trying to get (or stay)
    /// connected.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_connection_state_happy_path() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Open.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Connecting));
    }

    #[test]
    fn test_connection_state_rejects_skips() {
        assert!(!Idle.can_transition_to(Open));
        assert!(!Reconnecting.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Reconnecting));
        assert!(!Open.can_transition_to(Connecting));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn test_every_non_idle_state_can_close() {
        for state in [Connecting, Open, Reconnecting] {
            assert!(state.can_transition_to(Closed), "{state} → Closed");
        }
        assert!(!Idle.can_transition_to(Closed));
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(Open.is_open());
        assert!(!Reconnecting.is_open());
        assert!(Reconnecting.is_active());
        assert!(!Closed.is_active());
        assert!(!Idle.is_active());
        assert_eq!(ConnectionState::default(), Idle);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(Reconnecting.to_string(), "Reconnecting");
        assert_eq!(Idle.to_string(), "Idle");
    }
}
