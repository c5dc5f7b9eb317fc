//! Session history as CSV.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::game::GameCode;
use crate::gateway::{Gateway, SessionRecord};

const EXPORT_PAGE: usize = 100;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    session_id: i64,
    game_code: GameCode,
    play_datetime: String,
    level: u32,
    round_count: usize,
    time_limit_ms: u64,
    total_trials: usize,
    total_correct: usize,
    overall_accuracy: String,
    average_response_time_ms: String,
    total_score: String,
    shape_group: Option<&'a str>,
}

impl<'a> From<&'a SessionRecord> for ExportRow<'a> {
    fn from(record: &'a SessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            game_code: record.game_code,
            play_datetime: record.play_datetime.to_rfc3339(),
            level: record.settings.level,
            round_count: record.settings.round_count,
            time_limit_ms: record.settings.time_limit_ms,
            total_trials: record.metrics.total_trials,
            total_correct: record.metrics.total_correct,
            overall_accuracy: format!("{:.2}", record.metrics.overall_accuracy),
            average_response_time_ms: format!("{:.1}", record.metrics.average_response_time_ms),
            total_score: format!("{:.2}", record.metrics.total_score),
            shape_group: record.settings.shape_group.as_deref(),
        }
    }
}

/// Every stored session, newest first, fetched page by page.
pub async fn all_sessions(gateway: &dyn Gateway, code: Option<GameCode>) -> Result<Vec<SessionRecord>> {
    let mut sessions = Vec::new();
    for page in 1.. {
        let batch = gateway
            .get_paginated_sessions_with_results(code, page, EXPORT_PAGE)
            .await?;
        let done = batch.sessions.is_empty() || sessions.len() + batch.sessions.len() >= batch.total_count;
        sessions.extend(batch.sessions);
        if done {
            break;
        }
    }
    Ok(sessions)
}

pub fn write_csv<W: Write>(sessions: &[SessionRecord], writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in sessions {
        wtr.serialize(ExportRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rps::Hand;
    use crate::game::{GameSettings, PlayerChoice};
    use crate::gateway::InMemoryGateway;

    #[tokio::test]
    async fn exports_one_row_per_session() {
        let gateway = InMemoryGateway::new();
        let settings = GameSettings {
            round_count: 1,
            seed: Some(2),
            ..GameSettings::default()
        };
        for _ in 0..3 {
            let started = gateway.start_game(GameCode::Rps, &settings).await.unwrap();
            gateway
                .submit_answer(started.session_id, 0, PlayerChoice::Hand(Hand::Rock), 450, None)
                .await
                .unwrap();
        }

        let sessions = all_sessions(&gateway, None).await.unwrap();
        assert_eq!(sessions.len(), 3);

        let mut out = Vec::new();
        write_csv(&sessions, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("session_id,game_code,play_datetime,level"));
        assert!(lines[1].starts_with("3,RPS,"));
        assert!(lines[1].contains(",450.0,"));
    }
}
