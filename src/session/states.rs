use serde::{Deserialize, Serialize};
use std::fmt;

/// Session health states.
///
/// The loop runs `Disconnected → Connecting → Ready`, detours through
/// `ReconnectScheduled` on every disruption, and only an operator stop
/// reaches the terminal `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection and no reconnect pending
    Disconnected,
    /// A fresh transport is being established
    Connecting,
    /// Receiving events
    Ready,
    /// A disruption was observed and a delayed rebuild is pending
    ReconnectScheduled,
    /// Operator-initiated terminal state
    Stopped,
}

impl SessionState {
    /// Whether no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether the session is currently receiving events
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::ReconnectScheduled => write!(f, "reconnect_scheduled"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "ready" => Ok(Self::Ready),
            "reconnect_scheduled" => Ok(Self::ReconnectScheduled),
            "stopped" => Ok(Self::Stopped),
            _ => Err(format!("Invalid session state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stopped_is_terminal() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(!SessionState::Disconnected.is_terminal());
        assert!(!SessionState::ReconnectScheduled.is_terminal());
    }

    #[test]
    fn test_display_round_trip() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Ready,
            SessionState::ReconnectScheduled,
            SessionState::Stopped,
        ] {
            assert_eq!(state.to_string().parse::<SessionState>(), Ok(state));
        }
    }
}
