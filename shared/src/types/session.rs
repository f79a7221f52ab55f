//! Session identifiers and replay modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a profiling session. `0` is reserved for "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The reserved "no current session" id
    pub const NONE: SessionId = SessionId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a counter name registered with a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterId(pub u64);

/// How kernels are replayed to collect all requested counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Replay the whole application once per counter pass
    Application,
    /// Replay each kernel dispatch once per counter pass
    Kernel,
    /// Passes are driven explicitly by the user
    User,
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayMode::Application => "application",
            ReplayMode::Kernel => "kernel",
            ReplayMode::User => "user",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid replay mode: {0}")]
pub struct ParseReplayModeError(pub String);

impl FromStr for ReplayMode {
    type Err = ParseReplayModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "application" | "app" => Ok(ReplayMode::Application),
            "kernel" => Ok(ReplayMode::Kernel),
            "user" => Ok(ReplayMode::User),
            _ => Err(ParseReplayModeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_none() {
        assert!(SessionId::NONE.is_none());
        assert!(SessionId::default().is_none());
        assert!(!SessionId(7).is_none());
    }

    #[test]
    fn test_replay_mode_from_str() {
        assert_eq!("kernel".parse::<ReplayMode>().unwrap(), ReplayMode::Kernel);
        assert_eq!("APP".parse::<ReplayMode>().unwrap(), ReplayMode::Application);
        assert_eq!("User".parse::<ReplayMode>().unwrap(), ReplayMode::User);
        assert!("dispatch".parse::<ReplayMode>().is_err());
    }

    #[test]
    fn test_replay_mode_display_round_trips() {
        for mode in [ReplayMode::Application, ReplayMode::Kernel, ReplayMode::User] {
            assert_eq!(mode.to_string().parse::<ReplayMode>().unwrap(), mode);
        }
    }
}
