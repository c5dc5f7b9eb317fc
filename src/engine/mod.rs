//! Generic trial engine.
//!
//! Every mini-game follows the same contract: validate settings, hand out one
//! problem per trial, grade exactly one answer per trial, and stop after
//! `round_count` trials. The variants only differ in how problems are made
//! and graded, which is what [`GameRules`] captures. [`Engine`] owns the round
//! counter and the stale-submission check so no variant repeats them.

pub mod cat_chaser;
pub mod count_comparison;
pub mod nback;
pub mod number_pressing;
pub mod rps;
pub mod shape_rotation;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem, Trial, TrialOutcome};

/// Problem generation and grading for one game variant.
pub trait GameRules: Send {
    fn code(&self) -> GameCode;

    /// Variant-specific settings checks (level range and the like).
    fn validate(&self, settings: &GameSettings) -> Result<()>;

    /// Produces the problem for trial `index`. Called once per trial, in order.
    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem;

    /// The reference answer for a problem.
    fn expected(&self, problem: &Problem) -> Result<PlayerChoice>;

    /// Pure grading predicate over `(problem, choice)`.
    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool>;

    /// Reported-only score. Never feeds back into `is_correct`.
    fn score(&self, _is_correct: bool, _choice: &PlayerChoice, _confidence: Option<u8>) -> Option<f64> {
        None
    }
}

/// Registry entry for constructing variant rules.
pub struct RulesFactory {
    pub code: GameCode,
    pub make: fn() -> Box<dyn GameRules>,
}

static RULES: &[RulesFactory] = &[
    RulesFactory {
        code: GameCode::NBack,
        make: make_nback,
    },
    RulesFactory {
        code: GameCode::ShapeRotation,
        make: make_shape_rotation,
    },
    RulesFactory {
        code: GameCode::Rps,
        make: make_rps,
    },
    RulesFactory {
        code: GameCode::NumberPressing,
        make: make_number_pressing,
    },
    RulesFactory {
        code: GameCode::CatChaser,
        make: make_cat_chaser,
    },
    RulesFactory {
        code: GameCode::CountComparison,
        make: make_count_comparison,
    },
];

pub fn registered_rules() -> &'static [RulesFactory] {
    RULES
}

pub fn by_code(code: GameCode) -> Option<&'static RulesFactory> {
    registered_rules().iter().find(|factory| factory.code == code)
}

/// Runs both the shared and the variant checks without starting anything.
pub fn validate_settings(code: GameCode, settings: &GameSettings) -> Result<()> {
    settings.validate_common()?;
    let factory = by_code(code)
        .ok_or_else(|| GameError::configuration(format!("no rules registered for {code}")))?;
    (factory.make)().validate(settings)
}

fn make_nback() -> Box<dyn GameRules> {
    Box::new(nback::NBackRules::default())
}

fn make_shape_rotation() -> Box<dyn GameRules> {
    Box::new(shape_rotation::ShapeRotationRules)
}

fn make_rps() -> Box<dyn GameRules> {
    Box::new(rps::RpsRules)
}

fn make_number_pressing() -> Box<dyn GameRules> {
    Box::new(number_pressing::NumberPressingRules)
}

fn make_cat_chaser() -> Box<dyn GameRules> {
    Box::new(cat_chaser::CatChaserRules)
}

fn make_count_comparison() -> Box<dyn GameRules> {
    Box::new(count_comparison::CountComparisonRules::default())
}

/// What follows an accepted outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(Trial),
    Finished,
}

/// Drives one session of one variant.
pub struct Engine {
    rules: Box<dyn GameRules>,
    settings: GameSettings,
    rng: StdRng,
    current: Option<Trial>,
    outcomes: Vec<TrialOutcome>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("game", &self.rules.code())
            .field("settings", &self.settings)
            .field("current", &self.current.as_ref().map(|t| t.index))
            .field("resolved", &self.outcomes.len())
            .finish()
    }
}

impl Engine {
    pub fn new(code: GameCode) -> Result<Self> {
        let factory = by_code(code)
            .ok_or_else(|| GameError::configuration(format!("no rules registered for {code}")))?;
        Ok(Self::with_rules((factory.make)()))
    }

    pub fn with_rules(rules: Box<dyn GameRules>) -> Self {
        Self {
            rules,
            settings: GameSettings::default(),
            rng: StdRng::from_entropy(),
            current: None,
            outcomes: Vec::new(),
        }
    }

    pub fn code(&self) -> GameCode {
        self.rules.code()
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Validates `settings`, resets the round counter and returns the first trial.
    pub fn start_game(&mut self, settings: GameSettings) -> Result<Trial> {
        settings.validate_common()?;
        self.rules.validate(&settings)?;

        self.rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.settings = settings;
        self.outcomes.clear();

        let first = self.make_trial(0);
        self.current = Some(first.clone());
        debug!(game = %self.code(), rounds = self.settings.round_count, "engine started");
        Ok(first)
    }

    fn make_trial(&mut self, index: usize) -> Trial {
        let problem = self.rules.generate(index, &self.settings, &mut self.rng);
        Trial::new(index, problem, &self.settings)
    }

    /// The active, unanswered trial; `None` once the session is exhausted.
    pub fn next_problem(&self) -> Option<Trial> {
        self.current.clone()
    }

    /// Ends the session early. Later submissions are stale and
    /// [`Engine::next_problem`] returns `None`.
    pub fn close(&mut self) {
        if let Some(trial) = self.current.take() {
            debug!(game = %self.code(), trial = trial.index, "engine closed early");
        }
    }

    pub fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none() && !self.outcomes.is_empty()
    }

    /// Grades an explicit answer for `trial_index` and advances.
    ///
    /// Only the active trial can be answered; anything else is a
    /// `StaleSubmission`. A `Timeout` choice takes the timeout path.
    pub fn submit_answer(
        &mut self,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<(TrialOutcome, Advance)> {
        let outcome = self.evaluate(trial_index, choice, response_time_ms, confidence)?;
        let advance = self.accept(outcome.clone())?;
        Ok((outcome, advance))
    }

    /// Synthesizes the timeout outcome for `trial_index` and advances.
    pub fn time_up(&mut self, trial_index: usize) -> Result<(TrialOutcome, Advance)> {
        self.submit_answer(trial_index, PlayerChoice::Timeout, 0, None)
    }

    /// Grades without advancing, so callers can persist the outcome before
    /// handing it to [`Engine::accept`].
    pub fn evaluate(
        &self,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<TrialOutcome> {
        let trial = self.active(trial_index)?;
        let problem = &trial.problem;
        let correct_choice = self.rules.expected(problem)?;

        if choice.is_timeout() {
            return Ok(TrialOutcome {
                trial_index,
                round: problem.round(),
                player_choice: PlayerChoice::Timeout,
                correct_choice,
                is_correct: false,
                response_time_ms: self.settings.time_limit_ms,
                confidence: None,
                score: self.rules.score(false, &PlayerChoice::Timeout, None),
            });
        }

        let is_correct = match self.rules.grade(problem, &choice) {
            Ok(correct) => correct,
            Err(err) => {
                warn!(trial = trial_index, error = %err, "ungradable answer recorded as incorrect");
                false
            }
        };
        let score = self.rules.score(is_correct, &choice, confidence);

        Ok(TrialOutcome {
            trial_index,
            round: problem.round(),
            player_choice: choice,
            correct_choice,
            is_correct,
            response_time_ms,
            confidence,
            score,
        })
    }

    fn active(&self, trial_index: usize) -> Result<&Trial> {
        match self.current.as_ref() {
            Some(trial) if trial.index == trial_index => Ok(trial),
            other => {
                let expected = other.map(|t| t.index);
                warn!(got = trial_index, ?expected, "rejected stale submission");
                Err(GameError::StaleSubmission {
                    expected,
                    got: trial_index,
                })
            }
        }
    }

    /// Records `outcome` on the active trial and advances. This is the single
    /// advancement path shared by submissions and timeouts.
    pub fn accept(&mut self, outcome: TrialOutcome) -> Result<Advance> {
        self.active(outcome.trial_index)?;
        let Some(mut trial) = self.current.take() else {
            return Err(GameError::SessionExhausted);
        };
        trial.record(outcome.clone())?;
        self.outcomes.push(outcome);

        let advance = if self.outcomes.len() >= self.settings.round_count {
            debug!(game = %self.code(), "engine exhausted");
            Advance::Finished
        } else {
            let next = self.make_trial(trial.index + 1);
            self.current = Some(next.clone());
            Advance::Next(next)
        };
        Ok(advance)
    }
}
