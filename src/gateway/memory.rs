use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::debug;

use super::{launch, lock, page_window, Gateway, SessionPage, SessionRecord, StartedGame};
use crate::engine::Engine;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Trial, TrialOutcome};
use crate::stats::{compute_metrics, SessionMetrics};

struct LocalSession {
    game_code: GameCode,
    settings: GameSettings,
    play_datetime: DateTime<Local>,
    engine: Engine,
}

impl LocalSession {
    fn record(&self, session_id: i64) -> SessionRecord {
        SessionRecord {
            session_id,
            game_code: self.game_code,
            settings: self.settings.clone(),
            play_datetime: self.play_datetime,
            metrics: compute_metrics(self.engine.outcomes()),
        }
    }
}

#[derive(Default)]
struct State {
    last_id: i64,
    sessions: BTreeMap<i64, LocalSession>,
}

/// Grades in-process and keeps everything for the lifetime of the value.
/// Session ids are local-only and never reported as durable.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = self.state.lock().map(|s| s.sessions.len()).unwrap_or(0);
        f.debug_struct("InMemoryGateway")
            .field("sessions", &sessions)
            .finish()
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    fn is_durable(&self) -> bool {
        false
    }

    async fn start_game(&self, code: GameCode, settings: &GameSettings) -> Result<StartedGame> {
        let (engine, first_problem) = launch(code, settings)?;
        let mut state = lock(&self.state)?;
        state.last_id += 1;
        let session_id = state.last_id;
        state.sessions.insert(
            session_id,
            LocalSession {
                game_code: code,
                settings: settings.clone(),
                play_datetime: Local::now(),
                engine,
            },
        );
        debug!(session_id, game = %code, "local session started");

        Ok(StartedGame {
            session_id,
            durable: false,
            first_problem,
        })
    }

    async fn get_next_problem(&self, session_id: i64) -> Result<Option<Trial>> {
        let state = lock(&self.state)?;
        let session = state
            .sessions
            .get(&session_id)
            .ok_or(GameError::UnknownSession(session_id))?;
        Ok(session.engine.next_problem())
    }

    async fn submit_answer(
        &self,
        session_id: i64,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<TrialOutcome> {
        let mut state = lock(&self.state)?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(GameError::UnknownSession(session_id))?;
        let (outcome, _) =
            session
                .engine
                .submit_answer(trial_index, choice, response_time_ms, confidence)?;
        Ok(outcome)
    }

    async fn get_paginated_sessions_with_results(
        &self,
        code: Option<GameCode>,
        page: usize,
        limit: usize,
    ) -> Result<SessionPage> {
        let (offset, limit) = page_window(page, limit)?;
        let state = lock(&self.state)?;
        let matching: Vec<_> = state
            .sessions
            .iter()
            .rev()
            .filter(|(_, s)| code.map_or(true, |c| s.game_code == c))
            .collect();

        Ok(SessionPage {
            total_count: matching.len(),
            sessions: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|(id, s)| s.record(*id))
                .collect(),
        })
    }

    async fn get_session_results(&self, session_id: i64) -> Result<Vec<TrialOutcome>> {
        let state = lock(&self.state)?;
        state
            .sessions
            .get(&session_id)
            .map(|s| s.engine.outcomes().to_vec())
            .ok_or(GameError::UnknownSession(session_id))
    }

    async fn get_session_stats(&self, session_id: i64) -> Result<SessionMetrics> {
        Ok(compute_metrics(&self.get_session_results(session_id).await?))
    }

    fn abandon(&self, session_id: i64) -> Result<()> {
        if let Some(session) = lock(&self.state)?.sessions.get_mut(&session_id) {
            session.engine.close();
        }
        Ok(())
    }
}
