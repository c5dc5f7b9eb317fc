use thiserror::Error;

use crate::game::{GameCode, GameMode};

/// Failures surfaced by the engine, the gateway, and the session store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    /// Invalid settings. Reported to the caller of `start_game`, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An answer arrived for a trial that is no longer the active one.
    #[error("stale submission for trial {got} (active trial: {expected:?})")]
    StaleSubmission { expected: Option<usize>, got: usize },
    /// The gateway could not be reached or failed to complete a call.
    #[error("transport error: {0}")]
    Transport(String),
    /// Time-up fired twice for a single armed period.
    #[error("timer invariant violated: {0}")]
    TimerInvariantViolation(String),
    #[error("cannot {operation} while in {mode} mode")]
    InvalidState {
        operation: &'static str,
        mode: GameMode,
    },
    /// A previous gateway failure must be retried before the session can continue.
    #[error("trial {0} is unresolved; retry the pending call first")]
    UnresolvedTrial(usize),
    #[error("unknown session {0}")]
    UnknownSession(i64),
    #[error("session has no trials left")]
    SessionExhausted,
    #[error("the choice does not belong to {game}")]
    ChoiceMismatch { game: GameCode },
}

impl GameError {
    pub fn configuration(detail: impl Into<String>) -> Self {
        GameError::Configuration(detail.into())
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        GameError::Transport(detail.into())
    }

    /// Transport failures are the only ones the store keeps a trial pending for.
    pub fn is_transport(&self) -> bool {
        matches!(self, GameError::Transport(_))
    }
}

impl From<rusqlite::Error> for GameError {
    fn from(err: rusqlite::Error) -> Self {
        GameError::Transport(format!("storage: {err}"))
    }
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::Transport(format!("payload encoding: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = GameError::StaleSubmission {
            expected: Some(2),
            got: 1,
        };
        assert_eq!(
            err.to_string(),
            "stale submission for trial 1 (active trial: Some(2))"
        );

        let err = GameError::InvalidState {
            operation: "submit an answer",
            mode: GameMode::Setup,
        };
        assert_eq!(err.to_string(), "cannot submit an answer while in setup mode");
    }

    #[test]
    fn storage_errors_become_transport() {
        let err: GameError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_transport());
    }
}
