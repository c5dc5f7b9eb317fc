//! Rapid number pressing.
//!
//! Level 1 shows a single target digit to press. Level 2 asks for the digits
//! 1 through 9 in order, pressing some twice and skipping others. With
//! `rounds: [1, 2]` the target block comes first, then the sequences.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PressProblem {
    Target(u8),
    Sequence { double_press: Vec<u8>, skip: Vec<u8> },
}

impl PressProblem {
    pub fn round(&self) -> u32 {
        match self {
            PressProblem::Target(_) => 1,
            PressProblem::Sequence { .. } => 2,
        }
    }

    pub fn expected_presses(&self) -> Vec<u8> {
        match self {
            PressProblem::Target(target) => vec![*target],
            PressProblem::Sequence { double_press, skip } => (1..=9u8)
                .filter(|n| !skip.contains(n))
                .flat_map(|n| {
                    let times = if double_press.contains(&n) { 2 } else { 1 };
                    std::iter::repeat(n).take(times)
                })
                .collect(),
        }
    }
}

fn sequence_problem(rng: &mut StdRng) -> PressProblem {
    let double_count = rng.gen_range(0..=2usize);
    let mut skip_count = rng.gen_range(0..=2usize);
    if skip_count == 2 && double_count > 0 {
        skip_count = 1;
    }

    let mut digits: Vec<u8> = (1..=9).collect();
    digits.shuffle(rng);
    let mut double_press = digits[..double_count].to_vec();
    let mut skip = digits[double_count..double_count + skip_count].to_vec();
    double_press.sort_unstable();
    skip.sort_unstable();

    PressProblem::Sequence { double_press, skip }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NumberPressingRules;

impl NumberPressingRules {
    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a PressProblem> {
        match problem {
            Problem::NumberPressing(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::NumberPressing,
            }),
        }
    }
}

impl GameRules for NumberPressingRules {
    fn code(&self) -> GameCode {
        GameCode::NumberPressing
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        for level in settings.levels() {
            if !(1..=2).contains(&level) {
                return Err(GameError::configuration(format!(
                    "number pressing round must be 1 or 2, got {level}"
                )));
            }
        }
        Ok(())
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        let problem = match settings.level_at(index) {
            1 => PressProblem::Target(rng.gen_range(1..=9)),
            _ => sequence_problem(rng),
        };
        Problem::NumberPressing(problem)
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::Presses(self.problem(problem)?.expected_presses()))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        match choice {
            PlayerChoice::Presses(presses) => Ok(*presses == problem.expected_presses()),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::NumberPressing,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sequence_skips_and_doubles() {
        let problem = PressProblem::Sequence {
            double_press: vec![2, 7],
            skip: vec![5],
        };
        assert_eq!(
            problem.expected_presses(),
            vec![1, 2, 2, 3, 4, 6, 7, 7, 8, 9]
        );
    }

    #[test]
    fn target_expects_a_single_press() {
        assert_eq!(PressProblem::Target(4).expected_presses(), vec![4]);
    }

    #[test]
    fn generated_sequences_respect_the_limits() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            match sequence_problem(&mut rng) {
                PressProblem::Sequence { double_press, skip } => {
                    assert!(double_press.len() <= 2);
                    assert!(skip.len() <= 2);
                    if !double_press.is_empty() {
                        assert!(skip.len() <= 1);
                    }
                    assert!(double_press.iter().all(|d| !skip.contains(d)));
                    assert!(double_press.windows(2).all(|w| w[0] < w[1]));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn both_rounds_in_one_session() {
        let mut rules = NumberPressingRules;
        let mut rng = StdRng::seed_from_u64(1);
        let settings = GameSettings {
            round_count: 5,
            rounds: vec![1, 2],
            ..GameSettings::default()
        };
        rules.validate(&settings).unwrap();
        let rounds: Vec<u32> = (0..5)
            .map(|i| rules.generate(i, &settings, &mut rng).round())
            .collect();
        assert_eq!(rounds, vec![1, 1, 1, 2, 2]);
    }

    #[test]
    fn grading_requires_the_exact_order() {
        let rules = NumberPressingRules;
        let problem = Problem::NumberPressing(PressProblem::Sequence {
            double_press: vec![],
            skip: vec![1, 9],
        });
        let right: Vec<u8> = (2..=8).collect();
        let mut wrong = right.clone();
        wrong.swap(0, 1);

        assert!(rules.grade(&problem, &PlayerChoice::Presses(right)).unwrap());
        assert!(!rules.grade(&problem, &PlayerChoice::Presses(wrong)).unwrap());
    }
}
