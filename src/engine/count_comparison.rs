//! Count comparison under visual distraction.
//!
//! Two word clouds are shown side by side and the player picks the side
//! holding more words. Counts are drawn around a random mean with a spread
//! that narrows over the session, so later trials are closer calls. Traps
//! make the smaller cloud look busier: larger type, bolder type or more gaps.
//! The per-round statistics group trials by how many traps were applied.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

pub const MIN_COUNT: u32 = 5;
pub const MAX_COUNT: u32 = 30;
const BASE_GAP_PROBABILITY: f64 = 0.4;
const TRAP_GAP_PROBABILITY: f64 = 0.8;
/// Gaps tried before and after each word.
const MAX_GAP_RUN: usize = 3;

const WORD_PAIRS: [(&str, &str); 12] = [
    ("apple", "apply"),
    ("form", "from"),
    ("trail", "trial"),
    ("quiet", "quite"),
    ("angel", "angle"),
    ("dairy", "diary"),
    ("lose", "loose"),
    ("cloth", "clothe"),
    ("sight", "site"),
    ("breath", "breathe"),
    ("stair", "stare"),
    ("desert", "dessert"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum Trap {
    GapProbability,
    FontSize,
    FontWeight,
}

/// One slot of a cloud: a word in some size and weight, or blank space.
/// Sizes and widths are in rem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Cell {
    Word { size: f64, bold: bool },
    Gap { width: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cloud {
    pub word: String,
    pub gap_probability: f64,
    pub cells: Vec<Cell>,
}

impl Cloud {
    pub fn count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, Cell::Word { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountProblem {
    pub left: Cloud,
    pub right: Cloud,
    /// Traps applied to the smaller cloud.
    pub traps: Vec<Trap>,
}

impl CountProblem {
    pub fn answer(&self) -> Side {
        if self.right.count() > self.left.count() {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn trap_side(&self) -> Side {
        self.answer().other()
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn draw_count(mean: f64, std_dev: f64, rng: &mut StdRng) -> u32 {
    let z: f64 = rng.sample(StandardNormal);
    (z * std_dev + mean)
        .round()
        .clamp(MIN_COUNT as f64, MAX_COUNT as f64) as u32
}

/// Two different counts in `MIN_COUNT..=MAX_COUNT`. The spread shrinks from
/// half the mean on the first trial to a tenth of it on the last.
pub fn counts_for(index: usize, round_count: usize, rng: &mut StdRng) -> (u32, u32) {
    let difficulty = index as f64 / round_count.max(1) as f64;
    let mean = rng.gen_range(MIN_COUNT as f64..MAX_COUNT as f64);
    let std_dev = mean * (0.5 - 0.4 * difficulty);
    let a = draw_count(mean, std_dev, rng);
    let b = draw_count(mean, std_dev, rng);
    if a != b {
        (a, b)
    } else if a < MAX_COUNT {
        (a + 1, b)
    } else {
        (a - 1, b)
    }
}

fn push_gaps(cells: &mut Vec<Cell>, gap_probability: f64, rng: &mut StdRng) {
    for _ in 0..MAX_GAP_RUN {
        if !rng.gen_bool(gap_probability) {
            break;
        }
        cells.push(Cell::Gap {
            width: round2(rng.gen_range(1.0..2.0)),
        });
    }
}

fn cloud(word: &str, count: u32, traps: &[Trap], rng: &mut StdRng) -> Cloud {
    let large = if traps.contains(&Trap::FontSize) { 0.5 } else { 0.4 };
    let heavy = if traps.contains(&Trap::FontWeight) { 0.5 } else { 0.4 };
    let gap_probability = if traps.contains(&Trap::GapProbability) {
        TRAP_GAP_PROBABILITY
    } else {
        BASE_GAP_PROBABILITY
    };

    let mut cells = Vec::new();
    for _ in 0..count {
        push_gaps(&mut cells, gap_probability, rng);
        let size = if rng.gen_bool(large) {
            rng.gen_range(1.2..1.5)
        } else {
            rng.gen_range(0.8..1.2)
        };
        cells.push(Cell::Word {
            size: round2(size),
            bold: rng.gen_bool(heavy),
        });
        push_gaps(&mut cells, gap_probability, rng);
    }
    Cloud {
        word: word.to_string(),
        gap_probability,
        cells,
    }
}

/// Walks the word pairs in a shuffled order, cycling when the session is
/// longer than the list.
#[derive(Debug, Default, Clone)]
pub struct CountComparisonRules {
    order: Vec<usize>,
}

impl CountComparisonRules {
    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a CountProblem> {
        match problem {
            Problem::CountComparison(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::CountComparison,
            }),
        }
    }

    fn pair(&mut self, index: usize, rng: &mut StdRng) -> (&'static str, &'static str) {
        if self.order.is_empty() {
            self.order = (0..WORD_PAIRS.len()).collect();
            self.order.shuffle(rng);
        }
        WORD_PAIRS[self.order[index % self.order.len()]]
    }
}

impl GameRules for CountComparisonRules {
    fn code(&self) -> GameCode {
        GameCode::CountComparison
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        settings.require_single_level(GameCode::CountComparison)?;
        if settings.level != 1 {
            return Err(GameError::configuration(format!(
                "count comparison has a single level 1, got {}",
                settings.level
            )));
        }
        Ok(())
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        let (mut left_word, mut right_word) = self.pair(index, rng);
        if rng.gen_bool(0.5) {
            std::mem::swap(&mut left_word, &mut right_word);
        }
        let (left_count, right_count) = counts_for(index, settings.round_count, rng);

        let mut traps = Vec::new();
        let gap = rng.gen_bool(0.33);
        let size = rng.gen_bool(0.5);
        let weight = rng.gen_bool(0.5);
        for (applied, trap) in [(gap, Trap::GapProbability), (size, Trap::FontSize), (weight, Trap::FontWeight)] {
            if applied {
                traps.push(trap);
            }
        }

        let untouched: &[Trap] = &[];
        let (left_traps, right_traps) = if left_count < right_count {
            (traps.as_slice(), untouched)
        } else {
            (untouched, traps.as_slice())
        };
        let left = cloud(left_word, left_count, left_traps, rng);
        let right = cloud(right_word, right_count, right_traps, rng);

        Problem::CountComparison(CountProblem { left, right, traps })
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::Side(self.problem(problem)?.answer()))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        match choice {
            PlayerChoice::Side(side) => Ok(*side == problem.answer()),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::CountComparison,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn words(word: &str, n: usize) -> Cloud {
        Cloud {
            word: word.to_string(),
            gap_probability: BASE_GAP_PROBABILITY,
            cells: (0..n)
                .flat_map(|_| [Cell::Word { size: 1.0, bold: false }, Cell::Gap { width: 1.5 }])
                .collect(),
        }
    }

    #[test]
    fn gaps_do_not_count_as_words() {
        let problem = Problem::CountComparison(CountProblem {
            left: words("form", 7),
            right: words("from", 9),
            traps: vec![],
        });
        let rules = CountComparisonRules::default();
        assert_eq!(rules.expected(&problem).unwrap(), PlayerChoice::Side(Side::Right));
        assert!(rules.grade(&problem, &PlayerChoice::Side(Side::Right)).unwrap());
        assert!(!rules.grade(&problem, &PlayerChoice::Side(Side::Left)).unwrap());
        assert!(rules.grade(&problem, &PlayerChoice::Hand(crate::engine::rps::Hand::Rock)).is_err());
    }

    #[test]
    fn counts_differ_and_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(4);
        for index in 0..400 {
            let (a, b) = counts_for(index % 20, 20, &mut rng);
            assert_ne!(a, b);
            assert!((MIN_COUNT..=MAX_COUNT).contains(&a), "{a}");
            assert!((MIN_COUNT..=MAX_COUNT).contains(&b), "{b}");
        }
    }

    #[test]
    fn traps_only_touch_the_smaller_cloud() {
        let mut rules = CountComparisonRules::default();
        let mut rng = StdRng::seed_from_u64(12);
        let settings = GameSettings {
            round_count: 40,
            ..GameSettings::default()
        };
        for index in 0..40 {
            let Problem::CountComparison(p) = rules.generate(index, &settings, &mut rng) else {
                panic!("expected a count comparison problem");
            };
            assert_ne!(p.left.count(), p.right.count());
            let (trapped, plain) = match p.trap_side() {
                Side::Left => (&p.left, &p.right),
                Side::Right => (&p.right, &p.left),
            };
            assert!(trapped.count() < plain.count());
            assert_eq!(plain.gap_probability, BASE_GAP_PROBABILITY);
            let expected_gap = if p.traps.contains(&Trap::GapProbability) {
                TRAP_GAP_PROBABILITY
            } else {
                BASE_GAP_PROBABILITY
            };
            assert_eq!(trapped.gap_probability, expected_gap);
            assert!(p.left.cells.iter().chain(&p.right.cells).all(|c| match c {
                Cell::Word { size, .. } => (0.8..=1.5).contains(size),
                Cell::Gap { width } => (1.0..=2.0).contains(width),
            }));
        }
    }

    #[test]
    fn word_pairs_cycle_through_the_list() {
        let mut rules = CountComparisonRules::default();
        let mut rng = StdRng::seed_from_u64(6);
        let first: Vec<_> = (0..WORD_PAIRS.len()).map(|i| rules.pair(i, &mut rng)).collect();
        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), WORD_PAIRS.len());
        assert_eq!(rules.pair(WORD_PAIRS.len(), &mut rng), first[0]);
    }

    #[test]
    fn only_level_one_is_valid() {
        let rules = CountComparisonRules::default();
        assert!(rules.validate(&GameSettings::default()).is_ok());
        let wrong = GameSettings {
            level: 2,
            ..GameSettings::default()
        };
        assert!(rules.validate(&wrong).is_err());
    }
}
