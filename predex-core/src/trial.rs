use serde::{Deserialize, Serialize};

use crate::stimulus::TrialStep;

/// Nanoseconds on the session clock
pub type Timestamp = u64;

/// Per-step state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Present,
    AwaitOpen,
    Collecting,
    Reveal,
    Done,
}

/// Raw timestamps reported by a response collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMarks {
    pub text: String,
    pub opened_at: Timestamp,
    pub first_input_at: Option<Timestamp>,
    pub closed_at: Timestamp,
}

/// Collector output in the units stored in a record
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResponse {
    pub prediction: String,
    pub typing_onset_ms: f64,
    pub confirm_rt_ms: f64,
}

impl CollectedResponse {
    /// Converts collector marks relative to the step's presentation time.
    ///
    /// Onset is measured from `presented_at`; confirm RT from the collector
    /// opening. A first-input mark later than the close is clamped to it.
    pub fn from_marks(presented_at: Timestamp, marks: &ResponseMarks) -> Self {
        let closed_at = marks.closed_at.max(marks.opened_at);
        let typing_onset_ms = marks
            .first_input_at
            .map(|at| ns_to_ms(at.min(closed_at).saturating_sub(presented_at)))
            .unwrap_or(f64::NAN);

        Self {
            prediction: marks.text.trim().to_owned(),
            typing_onset_ms,
            confirm_rt_ms: ns_to_ms(closed_at - marks.opened_at),
        }
    }

    pub fn has_onset(&self) -> bool {
        !self.typing_onset_ms.is_nan()
    }
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// One row of the results sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub participant: String,
    pub trial_index: usize,
    pub sentence_id: String,
    pub step_index: usize,
    pub displayed_prefix: String,
    pub true_next_token: String,
    pub prediction: String,
    pub typing_onset_ms: f64,
    pub confirm_rt_ms: f64,
}

impl ResponseRecord {
    pub const COLUMNS: [&'static str; 9] = [
        "participant",
        "trial_index",
        "sentence_id",
        "step_index",
        "displayed_prefix",
        "true_next_token",
        "prediction",
        "typing_onset_ms",
        "confirm_rt_ms",
    ];

    pub fn assemble(
        participant: &str,
        trial_index: usize,
        step: &TrialStep,
        response: CollectedResponse,
    ) -> Self {
        Self {
            participant: participant.to_owned(),
            trial_index,
            sentence_id: step.sentence_id.clone(),
            step_index: step.step_index,
            displayed_prefix: step.displayed_prefix.clone(),
            true_next_token: step.true_next_token.clone(),
            prediction: response.prediction,
            typing_onset_ms: response.typing_onset_ms,
            confirm_rt_ms: response.confirm_rt_ms,
        }
    }

    pub fn is_exact_match(&self) -> bool {
        self.prediction == self.true_next_token
    }
}
