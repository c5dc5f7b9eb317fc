//! Rock-paper-scissors reflex test.
//!
//! One card is shown along with who holds it. When the player holds it the
//! answer is the card that beats it; when the opponent holds it the answer is
//! the card it beats. Level 1 is always the player's card, level 2 always the
//! opponent's, level 3 mixes both. A `rounds` list such as `[1, 2, 3]` plays
//! the levels back to back in one session.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    pub const ALL: [Hand; 3] = [Hand::Rock, Hand::Paper, Hand::Scissors];

    /// The hand that wins against `self`.
    pub fn beaten_by(self) -> Hand {
        match self {
            Hand::Rock => Hand::Paper,
            Hand::Paper => Hand::Scissors,
            Hand::Scissors => Hand::Rock,
        }
    }

    /// The hand that `self` wins against.
    pub fn beats(self) -> Hand {
        match self {
            Hand::Rock => Hand::Scissors,
            Hand::Paper => Hand::Rock,
            Hand::Scissors => Hand::Paper,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CardHolder {
    Me,
    Opponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpsProblem {
    pub round: u32,
    pub holder: CardHolder,
    pub given: Hand,
}

impl RpsProblem {
    pub fn answer(&self) -> Hand {
        match self.holder {
            CardHolder::Me => self.given.beaten_by(),
            CardHolder::Opponent => self.given.beats(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RpsRules;

impl RpsRules {
    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a RpsProblem> {
        match problem {
            Problem::Rps(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch { game: GameCode::Rps }),
        }
    }
}

impl GameRules for RpsRules {
    fn code(&self) -> GameCode {
        GameCode::Rps
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        match settings.levels().into_iter().find(|l| !(1..=3).contains(l)) {
            Some(level) => Err(GameError::configuration(format!(
                "rps round must be 1, 2 or 3, got {level}"
            ))),
            None => Ok(()),
        }
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        let round = settings.level_at(index);
        let holder = match round {
            1 => CardHolder::Me,
            2 => CardHolder::Opponent,
            _ if rng.gen_bool(0.5) => CardHolder::Me,
            _ => CardHolder::Opponent,
        };
        Problem::Rps(RpsProblem {
            round,
            holder,
            given: Hand::ALL[rng.gen_range(0..Hand::ALL.len())],
        })
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::Hand(self.problem(problem)?.answer()))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        match choice {
            PlayerChoice::Hand(hand) => Ok(*hand == problem.answer()),
            _ => Err(GameError::ChoiceMismatch { game: GameCode::Rps }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn problem(holder: CardHolder, given: Hand) -> Problem {
        Problem::Rps(RpsProblem {
            round: 1,
            holder,
            given,
        })
    }

    #[test]
    fn holder_decides_the_answer() {
        let rules = RpsRules;
        let mine = problem(CardHolder::Me, Hand::Rock);
        assert!(rules.grade(&mine, &PlayerChoice::Hand(Hand::Paper)).unwrap());
        assert!(!rules.grade(&mine, &PlayerChoice::Hand(Hand::Scissors)).unwrap());

        let theirs = problem(CardHolder::Opponent, Hand::Rock);
        assert!(rules.grade(&theirs, &PlayerChoice::Hand(Hand::Scissors)).unwrap());
        assert!(!rules.grade(&theirs, &PlayerChoice::Hand(Hand::Paper)).unwrap());
    }

    #[test]
    fn beats_and_beaten_by_are_inverse() {
        for hand in Hand::ALL {
            assert_eq!(hand.beaten_by().beats(), hand);
            assert_ne!(hand.beats(), hand);
        }
    }

    #[test]
    fn levels_fix_the_holder() {
        let mut rules = RpsRules;
        let mut rng = StdRng::seed_from_u64(3);
        for (level, holder) in [(1, CardHolder::Me), (2, CardHolder::Opponent)] {
            let settings = GameSettings {
                level,
                ..GameSettings::default()
            };
            for i in 0..20 {
                match rules.generate(i, &settings, &mut rng) {
                    Problem::Rps(p) => {
                        assert_eq!(p.holder, holder);
                        assert_eq!(p.round, level);
                    }
                    other => panic!("unexpected problem {other:?}"),
                }
            }
        }
    }

    #[test]
    fn round_list_plays_each_round_in_turn() {
        let mut rules = RpsRules;
        let mut rng = StdRng::seed_from_u64(8);
        let settings = GameSettings {
            round_count: 6,
            rounds: vec![1, 2, 3],
            ..GameSettings::default()
        };
        rules.validate(&settings).unwrap();
        let rounds: Vec<u32> = (0..6)
            .map(|i| match rules.generate(i, &settings, &mut rng) {
                Problem::Rps(p) => p.round,
                other => panic!("unexpected problem {other:?}"),
            })
            .collect();
        assert_eq!(rounds, vec![1, 1, 2, 2, 3, 3]);

        let bad = GameSettings {
            rounds: vec![1, 4],
            ..settings
        };
        assert!(rules.validate(&bad).is_err());
    }

    #[test]
    fn wrong_choice_kind_is_a_mismatch() {
        let rules = RpsRules;
        let p = problem(CardHolder::Me, Hand::Paper);
        assert!(rules.grade(&p, &PlayerChoice::Presses(vec![1])).is_err());
    }
}
