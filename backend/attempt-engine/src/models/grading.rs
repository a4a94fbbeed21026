use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::step::SubmittedFile;

/// Correlation record for one in-flight grading job.
///
/// Deleting it is how a submission gets superseded: a callback whose record is gone is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeProcess {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub created_at: DateTime<Utc>,
}

/// Override of a previously graded fraction kept by the quiz reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegradeRecord {
    pub usage_id: String,
    pub slot: u32,
    pub attempt_id: String,
    pub old_fraction: Option<f64>,
    pub new_fraction: Option<f64>,
    /// Grade process dispatched by the replay of a regrade that ended Finished. Its result
    /// is the only one allowed to grade the finished attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaited_grade_process_id: Option<String>,
    pub regraded_at: DateTime<Utc>,
}

/// Normalized payload sent to the grader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub files: Vec<SubmittedFile>,
    /// Resolved filename to text content.
    pub free_texts: BTreeMap<String, String>,
}

impl Submission {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.free_texts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRequest {
    pub grade_process_id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub submission: Submission,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub accepted: bool,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GraderOutcome {
    Graded {
        #[serde(default)]
        score: Option<f64>,
    },
    Unavailable,
}

/// Asynchronous result posted back by the grader.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GraderCallbackRequest {
    #[validate(length(min = 1, message = "attempt_id is required"))]
    pub attempt_id: String,
    #[validate(length(min = 1, message = "grade_process_id is required"))]
    pub grade_process_id: String,
    #[serde(flatten)]
    pub outcome: GraderOutcome,
}
