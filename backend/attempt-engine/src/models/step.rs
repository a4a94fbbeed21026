use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::state::QuestionState;

/// Question-type data submitted by the student (`answertext0`, `answerfilename0`, ...).
pub type QtData = BTreeMap<String, String>;

/// What triggered a step. Resolved once at the boundary, matched exhaustively afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Initialization step, always `steps[0]`.
    Start,
    Save,
    Submit,
    Finish,
    TryAgain,
    /// Manual annotation by a grader, optionally overriding the mark.
    Comment {
        comment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mark: Option<f64>,
    },
    /// Asynchronous callback carrying the external grader's score.
    GradingResult {
        grade_process_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    /// Asynchronous callback: the grader could not complete the job.
    GraderUnavailable { grade_process_id: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Save => "save",
            Action::Submit => "submit",
            Action::Finish => "finish",
            Action::TryAgain => "tryagain",
            Action::Comment { .. } => "comment",
            Action::GradingResult { .. } => "gradingresult",
            Action::GraderUnavailable { .. } => "graderunavailable",
        }
    }

    pub fn is_grading_result(&self) -> bool {
        matches!(self, Action::GradingResult { .. })
    }

    /// Correlation id of an asynchronous grader callback.
    pub fn grade_process_id(&self) -> Option<&str> {
        match self {
            Action::GradingResult {
                grade_process_id, ..
            }
            | Action::GraderUnavailable { grade_process_id } => Some(grade_process_id),
            _ => None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Engine-internal flags. Never shown to the student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviourVars {
    #[serde(
        rename = "_triesleft",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tries_left: Option<u32>,

    #[serde(
        rename = "_showGradedFeedback",
        default,
        skip_serializing_if = "is_false"
    )]
    pub show_graded_feedback: bool,

    #[serde(rename = "_appliedFlag", default, skip_serializing_if = "is_false")]
    pub applied_flag: bool,
}

/// Reference to an uploaded file. Storage itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub filename: String,
    pub content_ref: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// One recorded transition. Immutable once appended to an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub sequence: usize,
    pub action: Action,
    #[serde(default)]
    pub behaviour_vars: BehaviourVars,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qt_data: QtData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SubmittedFile>,
    pub state: QuestionState,
    pub fraction: Option<f64>,
    pub response_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Step {
    pub fn has_response(&self) -> bool {
        !self.qt_data.is_empty() || !self.files.is_empty()
    }
}

/// Draft of the next step, filled in by the behaviour before a KEEP/DISCARD decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStep {
    pub action: Action,
    pub behaviour_vars: BehaviourVars,
    pub qt_data: QtData,
    pub files: Vec<SubmittedFile>,
    pub state: QuestionState,
    pub fraction: Option<f64>,
    pub response_summary: Option<String>,
}

impl PendingStep {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            behaviour_vars: BehaviourVars::default(),
            qt_data: QtData::new(),
            files: Vec::new(),
            state: QuestionState::NotStarted,
            fraction: None,
            response_summary: None,
        }
    }

    pub fn with_response(mut self, qt_data: QtData, files: Vec<SubmittedFile>) -> Self {
        self.qt_data = qt_data;
        self.files = files;
        self
    }

    /// Rebuilds the draft of an already recorded step so that history can be replayed.
    ///
    /// Only the persisted `_appliedFlag` marker survives; every other engine flag is
    /// recomputed by the replay.
    pub fn replay_of(step: &Step) -> Self {
        Self {
            action: step.action.clone(),
            behaviour_vars: BehaviourVars {
                applied_flag: step.behaviour_vars.applied_flag,
                ..BehaviourVars::default()
            },
            qt_data: step.qt_data.clone(),
            files: step.files.clone(),
            state: QuestionState::NotStarted,
            fraction: None,
            response_summary: None,
        }
    }

    pub fn into_step(self, sequence: usize) -> Step {
        Step {
            id: Uuid::new_v4().to_string(),
            sequence,
            action: self.action,
            behaviour_vars: self.behaviour_vars,
            qt_data: self.qt_data,
            files: self.files,
            state: self.state,
            fraction: self.fraction,
            response_summary: self.response_summary,
            created_at: Utc::now(),
        }
    }
}
