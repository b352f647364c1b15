use std::fmt;

use crate::config::ConfigError;
use crate::host::HostError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    Config(ConfigError),
    Host(HostError),
    NotFound,
    AlreadyExists,
    /// The word pool cannot produce a playable round.
    Misconfigured,
    GameEnded,
    NotModerator,
    Corrupt { key: String },
    /// An operation failed and undoing its partial effects failed too.
    RollbackFailed {
        error: Box<GameError>,
        cleanup: Box<GameError>,
    },
}

impl GameError {
    /// Stable identifier sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Config(_) => "invalid_config",
            GameError::Host(_) => "host_error",
            GameError::NotFound => "not_found",
            GameError::AlreadyExists => "already_exists",
            GameError::Misconfigured => "misconfigured",
            GameError::GameEnded => "game_ended",
            GameError::NotModerator => "not_moderator",
            GameError::Corrupt { .. } => "corrupt_state",
            GameError::RollbackFailed { error, .. } => error.code(),
        }
    }
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::Config(err) => write!(f, "invalid configuration: {err}"),
            GameError::Host(err) => write!(f, "host failure: {err}"),
            GameError::NotFound => write!(f, "game not found"),
            GameError::AlreadyExists => write!(f, "a game with this id is already running"),
            GameError::Misconfigured => write!(f, "the word list has no playable words"),
            GameError::GameEnded => write!(f, "the game has ended"),
            GameError::NotModerator => write!(f, "only moderators can do that"),
            GameError::Corrupt { key } => write!(f, "stored value for {key} is unreadable"),
            GameError::RollbackFailed { error, cleanup } => {
                write!(f, "{error} (cleanup failed: {cleanup})")
            }
        }
    }
}

impl std::error::Error for GameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GameError::Config(err) => Some(err),
            GameError::Host(err) => Some(err),
            GameError::RollbackFailed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for GameError {
    fn from(err: ConfigError) -> Self {
        GameError::Config(err)
    }
}

impl From<HostError> for GameError {
    fn from(err: HostError) -> Self {
        GameError::Host(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GameError::NotModerator.code(), "not_moderator");
        assert_eq!(
            GameError::from(ConfigError::EmptyWordPool).code(),
            "invalid_config"
        );
        assert_eq!(
            GameError::from(HostError::new("boom")).to_string(),
            "host failure: boom"
        );
    }

    #[test]
    fn rollback_keeps_the_original_code() {
        let err = GameError::RollbackFailed {
            error: Box::new(GameError::Misconfigured),
            cleanup: Box::new(GameError::from(HostError::new("disk gone"))),
        };
        assert_eq!(err.code(), "misconfigured");
        assert_eq!(
            err.to_string(),
            "the word list has no playable words (cleanup failed: host failure: disk gone)"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
