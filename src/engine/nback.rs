//! Pattern-memory (n-back) test.
//!
//! A stream of shapes from a three-shape group is shown one per trial. At
//! level 1 the player presses LEFT when the shape matches the one two steps
//! back and SPACE otherwise. At level 2 a two-back match is LEFT, a three-back
//! match is RIGHT, anything else SPACE. No shape appears four times in a row.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

pub const SHAPE_GROUPS: &[(&str, [&str; 3])] = &[
    ("group1", ["circle", "square", "triangle"]),
    ("group2", ["trapezoid", "hourglass", "diamond"]),
    ("group3", ["rhombus", "butterfly", "star"]),
    ("group4", ["check", "horns", "pyramid"]),
    ("group5", ["double_triangle", "x_shape", "crown"]),
];

const RANDOM_GROUP: &str = "random";

pub fn shapes_of(group: &str) -> Option<&'static [&'static str; 3]> {
    SHAPE_GROUPS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, shapes)| shapes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NBackKey {
    Left,
    Right,
    Space,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NBackProblem {
    pub shape: String,
    pub group: String,
    pub level: u32,
    pub expected: NBackKey,
}

/// Keeps the stimulus history of the running session.
#[derive(Debug, Default, Clone)]
pub struct NBackRules {
    group: Option<&'static str>,
    sequence: Vec<&'static str>,
}

impl NBackRules {
    fn pick_group(settings: &GameSettings, rng: &mut StdRng) -> &'static str {
        match settings.shape_group.as_deref() {
            Some(name) if name != RANDOM_GROUP => SHAPE_GROUPS
                .iter()
                .map(|(group, _)| *group)
                .find(|group| *group == name)
                .unwrap_or(SHAPE_GROUPS[0].0),
            _ => SHAPE_GROUPS[rng.gen_range(0..SHAPE_GROUPS.len())].0,
        }
    }

    fn expected_at(&self, index: usize, level: u32) -> NBackKey {
        let back = |n: usize| index >= n && self.sequence[index] == self.sequence[index - n];
        if back(2) {
            NBackKey::Left
        } else if level >= 2 && back(3) {
            NBackKey::Right
        } else {
            NBackKey::Space
        }
    }

    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a NBackProblem> {
        match problem {
            Problem::NBack(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::NBack,
            }),
        }
    }
}

impl GameRules for NBackRules {
    fn code(&self) -> GameCode {
        GameCode::NBack
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        settings.require_single_level(GameCode::NBack)?;
        if !(1..=2).contains(&settings.level) {
            return Err(GameError::configuration(format!(
                "n-back level must be 1 or 2, got {}",
                settings.level
            )));
        }
        if let Some(group) = settings.shape_group.as_deref() {
            if group != RANDOM_GROUP && shapes_of(group).is_none() {
                return Err(GameError::configuration(format!("unknown shape group '{group}'")));
            }
        }
        Ok(())
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        if index == 0 {
            self.sequence.clear();
            self.group = Some(Self::pick_group(settings, rng));
        }
        let group = self.group.unwrap_or(SHAPE_GROUPS[0].0);
        let shapes = shapes_of(group).unwrap_or(&SHAPE_GROUPS[0].1);

        let shape = loop {
            let candidate = *shapes.choose(rng).unwrap_or(&shapes[0]);
            let n = self.sequence.len();
            let fourth_in_a_row = n >= 3 && self.sequence[n - 3..].iter().all(|s| *s == candidate);
            if !fourth_in_a_row {
                break candidate;
            }
        };
        self.sequence.push(shape);

        Problem::NBack(NBackProblem {
            shape: shape.to_string(),
            group: group.to_string(),
            level: settings.level,
            expected: self.expected_at(self.sequence.len() - 1, settings.level),
        })
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::NBack(self.problem(problem)?.expected))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        match choice {
            PlayerChoice::NBack(key) => Ok(*key == problem.expected),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::NBack,
            }),
        }
    }
}
