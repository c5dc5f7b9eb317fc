//! Color-chase attention test.
//!
//! Mice and the same number of cats are flashed on a 6x6 board. Two of the
//! cats are marked red and blue; each trial asks whether one of them landed
//! on a mouse. The player also rates their confidence from 1 to 4, which only
//! feeds the reported score.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

pub const BOARD_CELLS: usize = 36;
pub const MOUSE_COUNTS: [u32; 7] = [4, 6, 8, 10, 12, 14, 16];
const AUTO_RAMP: [u32; 6] = [4, 6, 8, 10, 12, 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CaughtStatus {
    Caught,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CatColor {
    Red,
    Blue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaseProblem {
    /// Board cells (0..36) holding a mouse.
    pub mice: Vec<usize>,
    /// Board cells holding a cat.
    pub cats: Vec<usize>,
    /// Index into `cats` of the red cat.
    pub red_cat: usize,
    /// Index into `cats` of the blue cat.
    pub blue_cat: usize,
    pub target: CatColor,
}

impl ChaseProblem {
    pub fn status_of(&self, color: CatColor) -> CaughtStatus {
        let cat = match color {
            CatColor::Red => self.red_cat,
            CatColor::Blue => self.blue_cat,
        };
        match self.cats.get(cat) {
            Some(cell) if self.mice.contains(cell) => CaughtStatus::Caught,
            _ => CaughtStatus::Missed,
        }
    }

    pub fn answer(&self) -> CaughtStatus {
        self.status_of(self.target)
    }
}

/// Multiplier applied to the +1/-1 score for a confidence rating.
pub fn confidence_multiplier(confidence: Option<u8>) -> f64 {
    match confidence {
        Some(1) => 0.1,
        Some(2) => 0.5,
        Some(3) => 1.0,
        Some(4) => 2.0,
        _ => 0.0,
    }
}

/// Mouse count for trial `index`. Level 0 ramps up linearly across the session.
pub fn mice_for(index: usize, settings: &GameSettings) -> usize {
    if settings.level == 0 {
        let step = (index * AUTO_RAMP.len()) / settings.round_count.max(1);
        AUTO_RAMP[step.min(AUTO_RAMP.len() - 1)] as usize
    } else {
        settings.level as usize
    }
}

fn board(mice: usize, rng: &mut StdRng) -> ChaseProblem {
    let mouse_cells = sample(rng, BOARD_CELLS, mice).into_vec();
    let cat_cells = sample(rng, BOARD_CELLS, mice).into_vec();
    let marked = sample(rng, mice, 2).into_vec();
    ChaseProblem {
        mice: mouse_cells,
        cats: cat_cells,
        red_cat: marked[0],
        blue_cat: marked[1],
        target: if rng.gen_bool(0.5) {
            CatColor::Red
        } else {
            CatColor::Blue
        },
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CatChaserRules;

impl CatChaserRules {
    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a ChaseProblem> {
        match problem {
            Problem::CatChaser(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::CatChaser,
            }),
        }
    }
}

impl GameRules for CatChaserRules {
    fn code(&self) -> GameCode {
        GameCode::CatChaser
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        settings.require_single_level(GameCode::CatChaser)?;
        if settings.level != 0 && !MOUSE_COUNTS.contains(&settings.level) {
            return Err(GameError::configuration(format!(
                "cat chaser difficulty must be 0 (auto) or one of {MOUSE_COUNTS:?}, got {}",
                settings.level
            )));
        }
        Ok(())
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        Problem::CatChaser(board(mice_for(index, settings), rng))
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::Chase(self.problem(problem)?.answer()))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        match choice {
            PlayerChoice::Chase(status) => Ok(*status == problem.answer()),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::CatChaser,
            }),
        }
    }

    fn score(&self, is_correct: bool, choice: &PlayerChoice, confidence: Option<u8>) -> Option<f64> {
        if choice.is_timeout() {
            return Some(-1.0);
        }
        let multiplier = confidence_multiplier(confidence);
        Some(if is_correct { multiplier } else { -multiplier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fixed_problem(target: CatColor) -> ChaseProblem {
        ChaseProblem {
            mice: vec![0, 5, 10, 15],
            cats: vec![5, 20, 30, 10],
            red_cat: 0,
            blue_cat: 1,
            target,
        }
    }

    #[test]
    fn status_depends_on_the_marked_cat() {
        assert_eq!(fixed_problem(CatColor::Red).answer(), CaughtStatus::Caught);
        assert_eq!(fixed_problem(CatColor::Blue).answer(), CaughtStatus::Missed);
    }

    #[test]
    fn auto_difficulty_ramps_up() {
        let settings = GameSettings {
            round_count: 12,
            level: 0,
            ..GameSettings::default()
        };
        let counts: Vec<usize> = (0..12).map(|i| mice_for(i, &settings)).collect();
        assert_eq!(counts.first(), Some(&4));
        assert_eq!(counts.last(), Some(&16));
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn boards_use_unique_cells() {
        let mut rng = StdRng::seed_from_u64(9);
        for mice in MOUSE_COUNTS {
            let problem = board(mice as usize, &mut rng);
            let mut cats = problem.cats.clone();
            cats.sort_unstable();
            cats.dedup();
            assert_eq!(cats.len(), mice as usize);
            assert_ne!(problem.red_cat, problem.blue_cat);
            assert!(problem.mice.iter().all(|c| *c < BOARD_CELLS));
        }
    }

    #[test]
    fn score_is_confidence_weighted_and_reported_only() {
        let rules = CatChaserRules;
        let caught = PlayerChoice::Chase(CaughtStatus::Caught);
        assert_eq!(rules.score(true, &caught, Some(4)), Some(2.0));
        assert_eq!(rules.score(false, &caught, Some(2)), Some(-0.5));
        assert_eq!(rules.score(false, &PlayerChoice::Timeout, None), Some(-1.0));

        let problem = Problem::CatChaser(fixed_problem(CatColor::Red));
        assert!(rules.grade(&problem, &caught).unwrap());
    }

    #[test]
    fn unsupported_difficulty_is_rejected() {
        let settings = GameSettings {
            level: 5,
            ..GameSettings::default()
        };
        assert!(CatChaserRules.validate(&settings).is_err());
    }
}
