use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::engine::cat_chaser::{CaughtStatus, ChaseProblem};
use crate::engine::count_comparison::{CountProblem, Side};
use crate::engine::nback::{NBackKey, NBackProblem};
use crate::engine::number_pressing::PressProblem;
use crate::engine::rps::{Hand, RpsProblem};
use crate::engine::shape_rotation::{RotationProblem, Transform};
use crate::error::{GameError, Result};

/// Which mini-game a session plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum_macros::Display,
)]
pub enum GameCode {
    #[serde(rename = "N_BACK")]
    #[strum(serialize = "N_BACK")]
    NBack,
    #[serde(rename = "SHAPE_ROTATION")]
    #[strum(serialize = "SHAPE_ROTATION")]
    ShapeRotation,
    #[serde(rename = "RPS")]
    #[strum(serialize = "RPS")]
    Rps,
    #[serde(rename = "NUMBER_PRESSING")]
    #[strum(serialize = "NUMBER_PRESSING")]
    NumberPressing,
    #[serde(rename = "CAT_CHASER")]
    #[strum(serialize = "CAT_CHASER")]
    CatChaser,
    #[serde(rename = "COUNT_COMPARISON")]
    #[strum(serialize = "COUNT_COMPARISON")]
    CountComparison,
}

impl GameCode {
    pub const ALL: [GameCode; 6] = [
        GameCode::NBack,
        GameCode::ShapeRotation,
        GameCode::Rps,
        GameCode::NumberPressing,
        GameCode::CatChaser,
        GameCode::CountComparison,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            GameCode::NBack => "n-back",
            GameCode::ShapeRotation => "shape-rotation",
            GameCode::Rps => "rps",
            GameCode::NumberPressing => "number-pressing",
            GameCode::CatChaser => "cat-chaser",
            GameCode::CountComparison => "count-comparison",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameCode::NBack => "N-Back",
            GameCode::ShapeRotation => "Shape Rotation",
            GameCode::Rps => "Rock-Paper-Scissors",
            GameCode::NumberPressing => "Number Pressing",
            GameCode::CatChaser => "Cat Chaser",
            GameCode::CountComparison => "Count Comparison",
        }
    }

    /// Level used when neither the caller nor the config picks one.
    pub fn default_level(&self) -> u32 {
        match self {
            GameCode::CatChaser => 0,
            _ => 1,
        }
    }
}

impl FromStr for GameCode {
    type Err = GameError;

    /// Accepts either the storage code (`N_BACK`) or the slug (`n-back`).
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        GameCode::ALL
            .into_iter()
            .find(|code| {
                code.to_string().eq_ignore_ascii_case(wanted) || code.slug().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                GameError::configuration(format!(
                    "unknown game '{wanted}', expected one of: {}",
                    GameCode::ALL.iter().map(|c| c.slug()).join(", ")
                ))
            })
    }
}

/// Lifecycle state held by the session store. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameMode {
    Setup,
    Loading,
    Playing,
    Result,
}

/// Configuration chosen at setup. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub round_count: usize,
    /// Per-trial limit; 0 disables the trial timer.
    pub time_limit_ms: u64,
    /// Optional limit for the whole session.
    #[serde(default)]
    pub session_time_limit_ms: Option<u64>,
    /// Variant-specific difficulty, see each engine module.
    pub level: u32,
    /// Levels played one after another, splitting `round_count` into
    /// consecutive blocks. Empty plays `level` throughout.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rounds: Vec<u32>,
    /// Suppresses per-trial feedback in front-ends.
    #[serde(default)]
    pub real_mode: bool,
    /// N-back stimulus group; `None` or `"random"` picks one.
    #[serde(default)]
    pub shape_group: Option<String>,
    /// Fixed seed for reproducible problem generation.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            round_count: 10,
            time_limit_ms: 3000,
            session_time_limit_ms: None,
            level: 1,
            rounds: Vec::new(),
            real_mode: false,
            shape_group: None,
            seed: None,
        }
    }
}

impl GameSettings {
    /// Checks shared by every variant; level ranges are checked by the variant rules.
    pub fn validate_common(&self) -> Result<()> {
        if self.round_count == 0 {
            return Err(GameError::configuration("round count must be greater than zero"));
        }
        if self.session_time_limit_ms == Some(0) {
            return Err(GameError::configuration(
                "session time limit must be positive when set",
            ));
        }
        if self.rounds.len() > self.round_count {
            return Err(GameError::configuration(format!(
                "{} rounds do not fit into {} trials",
                self.rounds.len(),
                self.round_count
            )));
        }
        Ok(())
    }

    /// Every level the session plays, in order.
    pub fn levels(&self) -> Vec<u32> {
        if self.rounds.is_empty() {
            vec![self.level]
        } else {
            self.rounds.clone()
        }
    }

    /// Level of the trial at `index`. Block sizes differ by at most one
    /// when `round_count` is not a multiple of the number of rounds.
    pub fn level_at(&self, index: usize) -> u32 {
        if self.rounds.is_empty() || self.round_count == 0 {
            return self.level;
        }
        let slot = index * self.rounds.len() / self.round_count;
        self.rounds[slot.min(self.rounds.len() - 1)]
    }

    /// For variants whose difficulty cannot change mid-session.
    pub fn require_single_level(&self, game: GameCode) -> Result<()> {
        if self.rounds.is_empty() {
            Ok(())
        } else {
            Err(GameError::configuration(format!(
                "{game} plays a single level; use `level` instead of `rounds`"
            )))
        }
    }

    pub fn timing_enabled(&self) -> bool {
        self.time_limit_ms > 0
    }
}

/// Variant-specific problem payload of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Problem {
    NBack(NBackProblem),
    ShapeRotation(RotationProblem),
    Rps(RpsProblem),
    NumberPressing(PressProblem),
    CatChaser(ChaseProblem),
    CountComparison(CountProblem),
}

impl Problem {
    pub fn game_code(&self) -> GameCode {
        match self {
            Problem::NBack(_) => GameCode::NBack,
            Problem::ShapeRotation(_) => GameCode::ShapeRotation,
            Problem::Rps(_) => GameCode::Rps,
            Problem::NumberPressing(_) => GameCode::NumberPressing,
            Problem::CatChaser(_) => GameCode::CatChaser,
            Problem::CountComparison(_) => GameCode::CountComparison,
        }
    }

    /// Grouping key used for per-round statistics. Count comparison groups
    /// by the number of traps applied.
    pub fn round(&self) -> u32 {
        match self {
            Problem::NBack(p) => p.level,
            Problem::ShapeRotation(p) => p.level,
            Problem::Rps(p) => p.round,
            Problem::NumberPressing(p) => p.round(),
            Problem::CatChaser(p) => p.mice.len() as u32,
            Problem::CountComparison(p) => p.traps.len() as u32,
        }
    }
}

/// What the player answered. `Timeout` is synthesized when the round timer fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PlayerChoice {
    NBack(NBackKey),
    Transforms(Vec<Transform>),
    Hand(Hand),
    Presses(Vec<u8>),
    Chase(CaughtStatus),
    Side(Side),
    Timeout,
}

impl PlayerChoice {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlayerChoice::Timeout)
    }
}

impl fmt::Display for PlayerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerChoice::NBack(key) => write!(f, "{key}"),
            PlayerChoice::Transforms(moves) => write!(f, "{}", moves.iter().join(" ")),
            PlayerChoice::Hand(hand) => write!(f, "{hand}"),
            PlayerChoice::Presses(presses) => write!(f, "{}", presses.iter().join(",")),
            PlayerChoice::Chase(status) => write!(f, "{status}"),
            PlayerChoice::Side(side) => write!(f, "{side}"),
            PlayerChoice::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Graded result of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialOutcome {
    pub trial_index: usize,
    pub round: u32,
    pub player_choice: PlayerChoice,
    pub correct_choice: PlayerChoice,
    pub is_correct: bool,
    pub response_time_ms: u64,
    pub confidence: Option<u8>,
    /// Confidence-weighted score, reported only.
    pub score: Option<f64>,
}

/// One timed question-and-answer unit within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub index: usize,
    pub problem: Problem,
    /// Deadline relative to the trial start; `None` when timing is disabled.
    pub deadline_ms: Option<u64>,
    outcome: Option<TrialOutcome>,
}

impl Trial {
    pub fn new(index: usize, problem: Problem, settings: &GameSettings) -> Self {
        Self {
            index,
            problem,
            deadline_ms: settings.timing_enabled().then_some(settings.time_limit_ms),
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<&TrialOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Attaches the outcome. A trial accepts at most one.
    pub fn record(&mut self, outcome: TrialOutcome) -> Result<()> {
        if self.outcome.is_some() {
            return Err(GameError::StaleSubmission {
                expected: None,
                got: self.index,
            });
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

/// One play-through, owned by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    /// Durable identifier; absent while the session is local-only.
    pub session_id: Option<i64>,
    pub game_code: GameCode,
    pub settings: GameSettings,
    pub started_at: DateTime<Local>,
}
