//! Boundary to whatever generates, grades and stores trials.
//!
//! The session store only ever talks to a [`Gateway`] and always awaits it,
//! whether the implementation answers immediately ([`memory`]) or after
//! storage I/O ([`sqlite`]).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Trial, TrialOutcome};
use crate::stats::SessionMetrics;

pub use memory::InMemoryGateway;
pub use sqlite::SqliteGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct StartedGame {
    /// Key for every later call on this session.
    pub session_id: i64,
    /// Whether `session_id` survives the process.
    pub durable: bool,
    pub first_problem: Trial,
}

/// One stored session with its metrics, as listed by the history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: i64,
    pub game_code: GameCode,
    pub settings: GameSettings,
    pub play_datetime: DateTime<Local>,
    pub metrics: SessionMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<SessionRecord>,
    pub total_count: usize,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// `false` when session ids are local-only.
    fn is_durable(&self) -> bool;

    async fn start_game(&self, code: GameCode, settings: &GameSettings) -> Result<StartedGame>;

    /// The active trial, or `None` once the session is exhausted.
    async fn get_next_problem(&self, session_id: i64) -> Result<Option<Trial>>;

    async fn submit_answer(
        &self,
        session_id: i64,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<TrialOutcome>;

    /// Newest first. `page` and `limit` are 1-based and positive; pages past
    /// the end are empty but still carry the total.
    async fn get_paginated_sessions_with_results(
        &self,
        code: Option<GameCode>,
        page: usize,
        limit: usize,
    ) -> Result<SessionPage>;

    async fn get_session_results(&self, session_id: i64) -> Result<Vec<TrialOutcome>>;

    async fn get_session_stats(&self, session_id: i64) -> Result<SessionMetrics>;

    /// Drops the live state of a session that will not be played any
    /// further. Stored results stay. Unknown or finished sessions are ignored.
    fn abandon(&self, session_id: i64) -> Result<()>;
}

/// Offset and limit for a 1-based page.
pub fn page_window(page: usize, limit: usize) -> Result<(usize, usize)> {
    if page == 0 || limit == 0 {
        return Err(GameError::configuration(format!(
            "page and limit must be positive, got page {page} limit {limit}"
        )));
    }
    Ok(((page - 1).saturating_mul(limit), limit))
}

/// Builds and starts the engine behind a new gateway session.
pub(crate) fn launch(code: GameCode, settings: &GameSettings) -> Result<(Engine, Trial)> {
    let mut engine = Engine::new(code)?;
    let first = engine.start_game(settings.clone())?;
    Ok((engine, first))
}

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| GameError::transport("gateway state is poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn page_window_is_one_based() {
        assert_eq!(page_window(1, 10).unwrap(), (0, 10));
        assert_eq!(page_window(5, 10).unwrap(), (40, 10));
    }

    #[test]
    fn page_window_rejects_zero() {
        assert_matches!(page_window(0, 10), Err(GameError::Configuration(_)));
        assert_matches!(page_window(1, 0), Err(GameError::Configuration(_)));
    }
}
