use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use super::display::DisplayOptions;
use super::state::QuestionState;
use super::step::{Action, BehaviourVars, PendingStep, QtData, Step, SubmittedFile};

/// One student's interaction history with one question instance.
///
/// The initialization step is stored apart from the rest of the history, so an
/// attempt can never exist without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub usage_id: String,
    pub slot: u32,
    pub question_id: String,
    pub max_mark: f64,
    pub initial_step: Step,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
}

impl Attempt {
    /// Creates the attempt together with its initialization step carrying the retry budget.
    pub fn start(
        usage_id: &str,
        slot: u32,
        question_id: &str,
        max_mark: f64,
        total_tries: u32,
    ) -> Self {
        let mut first = PendingStep::new(Action::Start);
        first.behaviour_vars = BehaviourVars {
            tries_left: Some(total_tries),
            ..BehaviourVars::default()
        };
        first.state = QuestionState::Todo;

        Self {
            id: Uuid::new_v4().to_string(),
            usage_id: usage_id.to_string(),
            slot,
            question_id: question_id.to_string(),
            max_mark,
            initial_step: first.into_step(0),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Copy of this attempt that keeps only the initialization step. Used by regrades.
    pub fn restarted(&self) -> Self {
        Self {
            steps: Vec::new(),
            ..self.clone()
        }
    }

    pub fn first_step(&self) -> &Step {
        &self.initial_step
    }

    pub fn last_step(&self) -> &Step {
        self.steps.last().unwrap_or(&self.initial_step)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn iter_steps(&self) -> impl DoubleEndedIterator<Item = &Step> {
        std::iter::once(&self.initial_step).chain(self.steps.iter())
    }

    pub fn state(&self) -> QuestionState {
        self.last_step().state
    }

    pub fn fraction(&self) -> Option<f64> {
        self.last_step().fraction
    }

    pub fn has_marks(&self) -> bool {
        self.state().is_graded() || self.fraction().is_some()
    }

    /// Most recent `_triesleft` value anywhere in the history.
    pub fn last_tries_left(&self) -> Option<u32> {
        self.iter_steps()
            .rev()
            .find_map(|step| step.behaviour_vars.tries_left)
    }

    /// Whether the most recent step asked the renderer to reveal graded feedback.
    pub fn shows_graded_feedback(&self) -> bool {
        self.last_step().behaviour_vars.show_graded_feedback
    }

    /// The latest step that recorded response data, if any.
    pub fn last_response_step(&self) -> Option<&Step> {
        self.iter_steps().rev().find(|step| step.has_response())
    }

    pub fn last_qt_data(&self) -> QtData {
        self.last_response_step()
            .map(|step| step.qt_data.clone())
            .unwrap_or_default()
    }

    pub fn last_files(&self) -> Vec<SubmittedFile> {
        self.last_response_step()
            .map(|step| step.files.clone())
            .unwrap_or_default()
    }

    pub fn append(&mut self, pending: PendingStep) -> &Step {
        let step = pending.into_step(self.step_count());
        self.steps.push(step);
        self.last_step()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAttemptRequest {
    #[validate(length(min = 1, max = 100, message = "usage_id must be 1-100 characters"))]
    pub usage_id: String,
    #[validate(range(min = 1, message = "slot must be at least 1"))]
    pub slot: u32,
    #[validate(length(min = 1, max = 100, message = "question_id must be 1-100 characters"))]
    pub question_id: String,
    #[validate(range(min = 0.0, message = "max_mark must not be negative"))]
    pub max_mark: f64,
}

/// Student-originated action as it arrives over HTTP.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitActionRequest {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub response: QtData,
    #[serde(default)]
    #[validate(length(max = 50, message = "at most 50 files per submission"))]
    pub files: Vec<SubmittedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Keep,
    Discard,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessActionResponse {
    pub verdict: Verdict,
    pub state: QuestionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
}

/// Read-only projection handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub attempt_id: String,
    pub state: QuestionState,
    pub fraction: Option<f64>,
    pub description: String,
    pub tries_total: u32,
    pub tries_remaining: u32,
    pub expected_fields: BTreeSet<String>,
    pub expected_qt_fields: BTreeSet<String>,
    pub display: DisplayOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_answer: Option<String>,
    pub history: Vec<String>,
}
