use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{launch, lock, page_window, Gateway, SessionPage, SessionRecord, StartedGame};
use crate::app_dirs::AppDirs;
use crate::engine::Engine;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Trial, TrialOutcome};
use crate::stats::{compute_metrics, SessionMetrics};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS game_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        game_code TEXT NOT NULL,
        settings TEXT NOT NULL,
        play_datetime TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS trial_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES game_sessions(id) ON DELETE CASCADE,
        trial_index INTEGER NOT NULL,
        round INTEGER NOT NULL,
        player_choice TEXT NOT NULL,
        correct_choice TEXT NOT NULL,
        is_correct BOOLEAN NOT NULL,
        response_time_ms INTEGER NOT NULL,
        confidence INTEGER,
        score REAL,
        UNIQUE (session_id, trial_index)
    );
    CREATE INDEX IF NOT EXISTS idx_game_sessions_code ON game_sessions(game_code);
    CREATE INDEX IF NOT EXISTS idx_trial_results_session ON trial_results(session_id);
"#;

/// Durable gateway. Sessions and graded trials are written to SQLite and
/// survive the process; problem generation for live sessions stays in memory.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
    live: Mutex<HashMap<i64, Engine>>,
}

impl std::fmt::Debug for SqliteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGateway").finish_non_exhaustive()
    }
}

impl SqliteGateway {
    /// Opens the database at the default state location.
    pub fn new() -> Result<Self> {
        let path = AppDirs::db_path()
            .ok_or_else(|| GameError::transport("no home directory for the session database"))?;
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GameError::transport(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        info!(path = %path.display(), "opening session database");
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            live: Mutex::new(HashMap::new()),
        })
    }

    fn insert_outcome(conn: &Connection, session_id: i64, outcome: &TrialOutcome) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO trial_results
            (session_id, trial_index, round, player_choice, correct_choice,
             is_correct, response_time_ms, confidence, score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                session_id,
                outcome.trial_index as i64,
                outcome.round,
                serde_json::to_string(&outcome.player_choice)?,
                serde_json::to_string(&outcome.correct_choice)?,
                outcome.is_correct,
                outcome.response_time_ms as i64,
                outcome.confidence,
                outcome.score,
            ],
        )?;
        Ok(())
    }

    fn session_exists(conn: &Connection, session_id: i64) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM game_sessions WHERE id = ?1",
                [session_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_outcomes(conn: &Connection, session_id: i64) -> Result<Vec<TrialOutcome>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT trial_index, round, player_choice, correct_choice,
                   is_correct, response_time_ms, confidence, score
            FROM trial_results
            WHERE session_id = ?1
            ORDER BY trial_index
            "#,
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<u8>>(6)?,
                row.get::<_, Option<f64>>(7)?,
            ))
        })?;

        let mut outcomes = Vec::new();
        for row in rows {
            let (index, round, player, correct, is_correct, rt, confidence, score) = row?;
            outcomes.push(TrialOutcome {
                trial_index: index as usize,
                round,
                player_choice: serde_json::from_str(&player)?,
                correct_choice: serde_json::from_str(&correct)?,
                is_correct,
                response_time_ms: rt as u64,
                confidence,
                score,
            });
        }
        Ok(outcomes)
    }

    fn parse_record(
        conn: &Connection,
        id: i64,
        code: &str,
        settings: &str,
        played: &str,
    ) -> Result<SessionRecord> {
        let play_datetime = DateTime::parse_from_rfc3339(played)
            .map_err(|e| GameError::transport(format!("bad play_datetime '{played}': {e}")))?
            .with_timezone(&Local);
        Ok(SessionRecord {
            session_id: id,
            game_code: code.parse()?,
            settings: serde_json::from_str(settings)?,
            play_datetime,
            metrics: compute_metrics(&Self::load_outcomes(conn, id)?),
        })
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    fn is_durable(&self) -> bool {
        true
    }

    async fn start_game(&self, code: GameCode, settings: &GameSettings) -> Result<StartedGame> {
        let (engine, first_problem) = launch(code, settings)?;

        let session_id = {
            let conn = lock(&self.conn)?;
            conn.execute(
                "INSERT INTO game_sessions (game_code, settings, play_datetime) VALUES (?1, ?2, ?3)",
                params![
                    code.to_string(),
                    serde_json::to_string(settings)?,
                    Local::now().to_rfc3339()
                ],
            )?;
            conn.last_insert_rowid()
        };
        lock(&self.live)?.insert(session_id, engine);
        debug!(session_id, game = %code, "durable session started");

        Ok(StartedGame {
            session_id,
            durable: true,
            first_problem,
        })
    }

    async fn get_next_problem(&self, session_id: i64) -> Result<Option<Trial>> {
        if let Some(engine) = lock(&self.live)?.get(&session_id) {
            return Ok(engine.next_problem());
        }
        // Stored sessions from an earlier process cannot be resumed.
        if Self::session_exists(&*lock(&self.conn)?, session_id)? {
            Ok(None)
        } else {
            Err(GameError::UnknownSession(session_id))
        }
    }

    async fn submit_answer(
        &self,
        session_id: i64,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<TrialOutcome> {
        let mut live = lock(&self.live)?;
        let engine = live
            .get_mut(&session_id)
            .ok_or(GameError::UnknownSession(session_id))?;

        let outcome = engine.evaluate(trial_index, choice, response_time_ms, confidence)?;
        Self::insert_outcome(&*lock(&self.conn)?, session_id, &outcome)?;
        engine.accept(outcome.clone())?;

        if engine.is_finished() {
            live.remove(&session_id);
            debug!(session_id, "durable session complete");
        }
        Ok(outcome)
    }

    async fn get_paginated_sessions_with_results(
        &self,
        code: Option<GameCode>,
        page: usize,
        limit: usize,
    ) -> Result<SessionPage> {
        let (offset, limit) = page_window(page, limit)?;
        let code = code.map(|c| c.to_string());
        let conn = lock(&self.conn)?;

        let total_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM game_sessions WHERE ?1 IS NULL OR game_code = ?1",
            params![code],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, game_code, settings, play_datetime
            FROM game_sessions
            WHERE ?1 IS NULL OR game_code = ?1
            ORDER BY play_datetime DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(params![code, limit as i64, offset as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, game, settings, played) = row?;
            sessions.push(Self::parse_record(&conn, id, &game, &settings, &played)?);
        }

        Ok(SessionPage {
            sessions,
            total_count: total_count as usize,
        })
    }

    async fn get_session_results(&self, session_id: i64) -> Result<Vec<TrialOutcome>> {
        let conn = lock(&self.conn)?;
        if !Self::session_exists(&conn, session_id)? {
            return Err(GameError::UnknownSession(session_id));
        }
        Self::load_outcomes(&conn, session_id)
    }

    async fn get_session_stats(&self, session_id: i64) -> Result<SessionMetrics> {
        Ok(compute_metrics(&self.get_session_results(session_id).await?))
    }

    fn abandon(&self, session_id: i64) -> Result<()> {
        if lock(&self.live)?.remove(&session_id).is_some() {
            debug!(session_id, "live session abandoned");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cat_chaser::CaughtStatus;
    use assert_matches::assert_matches;

    fn settings(rounds: usize) -> GameSettings {
        GameSettings {
            round_count: rounds,
            level: 0,
            seed: Some(3),
            ..GameSettings::default()
        }
    }

    #[tokio::test]
    async fn outcomes_are_stored_with_their_choices() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let started = gateway
            .start_game(GameCode::CatChaser, &settings(2))
            .await
            .unwrap();
        assert!(started.durable);

        let id = started.session_id;
        let first = gateway
            .submit_answer(id, 0, PlayerChoice::Chase(CaughtStatus::Caught), 800, Some(4))
            .await
            .unwrap();
        gateway
            .submit_answer(id, 1, PlayerChoice::Timeout, 0, None)
            .await
            .unwrap();

        let stored = gateway.get_session_results(id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], first);
        assert_eq!(stored[1].player_choice, PlayerChoice::Timeout);
        assert_eq!(stored[1].score, Some(-1.0));
        assert_eq!(gateway.get_next_problem(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_answers_are_not_stored() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let id = gateway
            .start_game(GameCode::CatChaser, &settings(3))
            .await
            .unwrap()
            .session_id;
        gateway
            .submit_answer(id, 0, PlayerChoice::Timeout, 0, None)
            .await
            .unwrap();
        assert_matches!(
            gateway
                .submit_answer(id, 0, PlayerChoice::Chase(CaughtStatus::Missed), 10, Some(1))
                .await,
            Err(GameError::StaleSubmission { expected: Some(1), got: 0 })
        );
        assert_eq!(gateway.get_session_results(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn abandoned_session_leaves_the_live_set() {
        let gateway = SqliteGateway::in_memory().unwrap();
        let id = gateway
            .start_game(GameCode::CatChaser, &settings(4))
            .await
            .unwrap()
            .session_id;
        gateway
            .submit_answer(id, 0, PlayerChoice::Chase(CaughtStatus::Missed), 500, Some(2))
            .await
            .unwrap();

        gateway.abandon(id).unwrap();
        assert!(lock(&gateway.live).unwrap().is_empty());
        assert_eq!(gateway.get_next_problem(id).await.unwrap(), None);
        assert_matches!(
            gateway
                .submit_answer(id, 1, PlayerChoice::Chase(CaughtStatus::Caught), 10, Some(1))
                .await,
            Err(GameError::UnknownSession(_))
        );
        assert_eq!(gateway.get_session_results(id).await.unwrap().len(), 1);
        gateway.abandon(id).unwrap();
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let gateway = SqliteGateway::in_memory().unwrap();
        assert_matches!(
            gateway.get_next_problem(7).await,
            Err(GameError::UnknownSession(7))
        );
        assert_matches!(
            gateway.get_session_stats(7).await,
            Err(GameError::UnknownSession(7))
        );
    }
}
