//! Key handling for the terminal front-end.
//!
//! Single-key games answer on the first valid key. Games whose answer is a
//! sequence collect keys until Enter; the colour-chase game takes the answer
//! and then a confidence digit.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::engine::cat_chaser::CaughtStatus;
use crate::engine::count_comparison::Side;
use crate::engine::nback::NBackKey;
use crate::engine::number_pressing::PressProblem;
use crate::engine::rps::Hand;
use crate::engine::shape_rotation::Transform;
use crate::game::{GameCode, PlayerChoice, Problem};

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    /// The key was taken but the answer is not complete yet.
    Pending,
    Answer {
        choice: PlayerChoice,
        confidence: Option<u8>,
    },
    Quit,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct AnswerPad {
    game: GameCode,
    moves: Vec<Transform>,
    presses: Vec<u8>,
    chase: Option<CaughtStatus>,
}

impl AnswerPad {
    pub fn new(game: GameCode) -> Self {
        Self {
            game,
            moves: Vec::new(),
            presses: Vec::new(),
            chase: None,
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
        self.presses.clear();
        self.chase = None;
    }

    /// What has been typed so far for multi-key answers.
    pub fn draft(&self) -> String {
        match self.game {
            GameCode::ShapeRotation => PlayerChoice::Transforms(self.moves.clone()).to_string(),
            GameCode::NumberPressing => PlayerChoice::Presses(self.presses.clone()).to_string(),
            GameCode::CatChaser => self.chase.map(|s| s.to_string()).unwrap_or_default(),
            _ => String::new(),
        }
    }

    pub fn help(&self) -> &'static str {
        match self.game {
            GameCode::NBack => "[<-] 2-back match  [->] 3-back match  [space] no match",
            GameCode::ShapeRotation => {
                "[q] rotate left  [e] rotate right  [h] flip horizontal  [v] flip vertical  [backspace] undo  [enter] submit"
            }
            GameCode::Rps => "[r] rock  [p] paper  [s] scissors",
            GameCode::NumberPressing => "[1-9] press  [backspace] undo  [enter] submit",
            GameCode::CatChaser => "[c] caught  [m] missed, then confidence [1-4]",
            GameCode::CountComparison => "[<-] left has more  [->] right has more",
        }
    }

    pub fn on_key(&mut self, key: &KeyEvent, problem: Option<&Problem>) -> KeyAction {
        if key.code == KeyCode::Esc
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
        {
            return KeyAction::Quit;
        }

        let action = match self.game {
            GameCode::NBack => match key.code {
                KeyCode::Left => answer(PlayerChoice::NBack(NBackKey::Left)),
                KeyCode::Right => answer(PlayerChoice::NBack(NBackKey::Right)),
                KeyCode::Char(' ') => answer(PlayerChoice::NBack(NBackKey::Space)),
                _ => KeyAction::Ignored,
            },
            GameCode::Rps => match key.code {
                KeyCode::Char('r') => answer(PlayerChoice::Hand(Hand::Rock)),
                KeyCode::Char('p') => answer(PlayerChoice::Hand(Hand::Paper)),
                KeyCode::Char('s') => answer(PlayerChoice::Hand(Hand::Scissors)),
                _ => KeyAction::Ignored,
            },
            GameCode::ShapeRotation => self.on_rotation_key(key.code),
            GameCode::NumberPressing => self.on_press_key(key.code, problem),
            GameCode::CatChaser => self.on_chase_key(key.code),
            GameCode::CountComparison => match key.code {
                KeyCode::Left => answer(PlayerChoice::Side(Side::Left)),
                KeyCode::Right => answer(PlayerChoice::Side(Side::Right)),
                _ => KeyAction::Ignored,
            },
        };
        if matches!(action, KeyAction::Answer { .. }) {
            self.clear();
        }
        action
    }

    fn on_rotation_key(&mut self, code: KeyCode) -> KeyAction {
        let step = match code {
            KeyCode::Char('q') => Transform::RotateLeft45,
            KeyCode::Char('e') => Transform::RotateRight45,
            KeyCode::Char('h') => Transform::FlipHorizontal,
            KeyCode::Char('v') => Transform::FlipVertical,
            KeyCode::Backspace => {
                self.moves.pop();
                return KeyAction::Pending;
            }
            KeyCode::Enter => return answer(PlayerChoice::Transforms(self.moves.clone())),
            _ => return KeyAction::Ignored,
        };
        self.moves.push(step);
        KeyAction::Pending
    }

    fn on_press_key(&mut self, code: KeyCode, problem: Option<&Problem>) -> KeyAction {
        let single = matches!(problem, Some(Problem::NumberPressing(PressProblem::Target(_))));
        match code {
            KeyCode::Char(c @ '1'..='9') => {
                let digit = c as u8 - b'0';
                if single {
                    return answer(PlayerChoice::Presses(vec![digit]));
                }
                self.presses.push(digit);
                KeyAction::Pending
            }
            KeyCode::Backspace => {
                self.presses.pop();
                KeyAction::Pending
            }
            KeyCode::Enter if !single => answer(PlayerChoice::Presses(self.presses.clone())),
            _ => KeyAction::Ignored,
        }
    }

    fn on_chase_key(&mut self, code: KeyCode) -> KeyAction {
        match (self.chase, code) {
            (_, KeyCode::Char('c')) => {
                self.chase = Some(CaughtStatus::Caught);
                KeyAction::Pending
            }
            (_, KeyCode::Char('m')) => {
                self.chase = Some(CaughtStatus::Missed);
                KeyAction::Pending
            }
            (Some(status), KeyCode::Char(c @ '1'..='4')) => KeyAction::Answer {
                choice: PlayerChoice::Chase(status),
                confidence: Some(c as u8 - b'0'),
            },
            _ => KeyAction::Ignored,
        }
    }
}

fn answer(choice: PlayerChoice) -> KeyAction {
    KeyAction::Answer {
        choice,
        confidence: None,
    }
}
