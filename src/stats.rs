//! Results aggregation.
//!
//! Everything here is a pure function of an outcome list. Nothing is cached,
//! so metrics can be recomputed after every trial or once at the end.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::game::TrialOutcome;
use crate::util::{mean, percentage, std_dev};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub total_trials: usize,
    pub total_correct: usize,
    /// Percentage of correct trials, unrounded.
    pub overall_accuracy: f64,
    pub average_response_time_ms: f64,
    pub response_time_std_dev_ms: f64,
    /// Sum of reported scores; 0 for variants without scoring.
    pub total_score: f64,
}

impl SessionMetrics {
    pub fn total_incorrect(&self) -> usize {
        self.total_trials - self.total_correct
    }
}

/// Accuracy and response-time summary. Zero trials yields all zeros.
pub fn compute_metrics(outcomes: &[TrialOutcome]) -> SessionMetrics {
    let total_trials = outcomes.len();
    let total_correct = outcomes.iter().filter(|o| o.is_correct).count();
    let times: Vec<f64> = outcomes.iter().map(|o| o.response_time_ms as f64).collect();

    SessionMetrics {
        total_trials,
        total_correct,
        overall_accuracy: percentage(total_correct, total_trials),
        average_response_time_ms: mean(&times).unwrap_or(0.0),
        response_time_std_dev_ms: std_dev(&times).unwrap_or(0.0),
        total_score: outcomes.iter().filter_map(|o| o.score).sum(),
    }
}

/// Metrics per round key (n-back level, rps round, mouse count, ...).
pub fn round_breakdown(outcomes: &[TrialOutcome]) -> BTreeMap<u32, SessionMetrics> {
    outcomes
        .iter()
        .cloned()
        .into_group_map_by(|o| o.round)
        .into_iter()
        .map(|(round, group)| (round, compute_metrics(&group)))
        .collect()
}
