//! Connection lifecycle: state machine and reconnect policy.
//!
//! The state machine is pure so transitions can be tested without a
//! transport; the adapter task drives it from socket events.

use std::time::Duration;

use thiserror::Error;

/// Lifecycle of the push-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Dialing the server.
    Connecting,
    /// Socket up, handshake credential accepted.
    Authenticated,
    /// Subscribed to at least the shared room.
    Joined,
}

/// Events that drive the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Dial started.
    DialStarted,
    /// Server accepted the presence handshake.
    HandshakeAccepted,
    /// First room subscription confirmed locally.
    RoomJoined,
    /// Transport dropped (error, close, or EOF).
    Dropped,
}

/// Rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal connection transition: {event:?} while {state:?}")]
pub struct InvalidTransition {
    /// State at the time of the event.
    pub state: ConnectionState,
    /// The offending event.
    pub event: ConnectionEvent,
}

/// Pure connection state machine.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl ConnectionStateMachine {
    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply one event; returns the new state or rejects the transition.
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        let next = match (self.state, event) {
            (Disconnected, DialStarted) => Connecting,
            (Connecting, HandshakeAccepted) => Authenticated,
            (Authenticated, RoomJoined) => Joined,
            // A drop is legal from any live state.
            (Connecting | Authenticated | Joined, Dropped) => Disconnected,
            (state, event) => return Err(InvalidTransition { state, event }),
        };
        self.state = next;
        Ok(next)
    }
}

/// Backoff schedule for automatic reconnection.
///
/// Delays grow exponentially from the base up to the cap; once the attempt
/// budget is exhausted the adapter stops and surfaces a fatal error
/// instead of retrying further.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Build a policy. `max_attempts` bounds consecutive failures.
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
        }
    }

    /// Attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given 0-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let bounded = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }

    /// Whether the budget is spent after `failures` consecutive failures.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(500, 30_000, 8)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_happy_path_transitions() {
        let mut sm = ConnectionStateMachine::default();
        assert_eq!(sm.state(), ConnectionState::Disconnected);

        sm.apply(ConnectionEvent::DialStarted).expect("dial");
        assert_eq!(sm.state(), ConnectionState::Connecting);

        sm.apply(ConnectionEvent::HandshakeAccepted).expect("auth");
        assert_eq!(sm.state(), ConnectionState::Authenticated);

        sm.apply(ConnectionEvent::RoomJoined).expect("join");
        assert_eq!(sm.state(), ConnectionState::Joined);
    }

    #[test]
    fn drop_returns_to_disconnected_from_any_live_state() {
        for events in [
            vec![ConnectionEvent::DialStarted],
            vec![ConnectionEvent::DialStarted, ConnectionEvent::HandshakeAccepted],
            vec![
                ConnectionEvent::DialStarted,
                ConnectionEvent::HandshakeAccepted,
                ConnectionEvent::RoomJoined,
            ],
        ] {
            let mut sm = ConnectionStateMachine::default();
            for event in events {
                sm.apply(event).expect("setup transition");
            }
            sm.apply(ConnectionEvent::Dropped).expect("drop is legal");
            assert_eq!(sm.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn rejects_join_before_handshake() {
        let mut sm = ConnectionStateMachine::default();
        sm.apply(ConnectionEvent::DialStarted).expect("dial");

        let err = sm
            .apply(ConnectionEvent::RoomJoined)
            .expect_err("join without auth must fail");
        assert_eq!(err.state, ConnectionState::Connecting);
    }

    #[test]
    fn rejects_drop_while_disconnected() {
        let mut sm = ConnectionStateMachine::default();
        assert!(sm.apply(ConnectionEvent::Dropped).is_err());
    }

    #[test]
    fn backoff_starts_at_base_delay() {
        let policy = ReconnectPolicy::new(250, 8_000, 5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
    }

    #[test]
    fn backoff_scales_exponentially() {
        let policy = ReconnectPolicy::new(100, 10_000, 5);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = ReconnectPolicy::new(1_000, 4_000, 5);
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(4_000));
    }

    #[test]
    fn budget_exhausts_after_max_attempts() {
        let policy = ReconnectPolicy::new(100, 1_000, 3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }
}
