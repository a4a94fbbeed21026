use serde::{Deserialize, Serialize};
use std::fmt;

/// Fractions this close to 0 or 1 count as fully wrong or fully right.
const FRACTION_TOLERANCE: f64 = 0.000_001;

/// Lifecycle state of a question attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    NotStarted,
    Invalid,
    Todo,
    Complete,
    NeedsGrading,
    Finished,
    GradedRight,
    GradedPartial,
    GradedWrong,
    GaveUp,
}

impl Default for QuestionState {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl QuestionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Invalid => "invalid",
            Self::Todo => "todo",
            Self::Complete => "complete",
            Self::NeedsGrading => "needs_grading",
            Self::Finished => "finished",
            Self::GradedRight => "graded_right",
            Self::GradedPartial => "graded_partial",
            Self::GradedWrong => "graded_wrong",
            Self::GaveUp => "gave_up",
        }
    }

    /// Further student actions are legal in this state.
    pub fn is_active(&self) -> bool {
        !self.is_finished()
    }

    /// Terminal states: nothing but a manual comment may follow.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Finished
                | Self::GradedRight
                | Self::GradedPartial
                | Self::GradedWrong
                | Self::GaveUp
        )
    }

    pub fn is_graded(&self) -> bool {
        matches!(
            self,
            Self::GradedRight | Self::GradedPartial | Self::GradedWrong
        )
    }

    /// Maps a fraction in [0, 1] to right / partial / wrong.
    pub fn graded_state_for_fraction(fraction: f64) -> Self {
        if fraction < FRACTION_TOLERANCE {
            Self::GradedWrong
        } else if fraction > 1.0 - FRACTION_TOLERANCE {
            Self::GradedRight
        } else {
            Self::GradedPartial
        }
    }

    /// Default human readable label, used whenever no behaviour-specific wording applies.
    pub fn default_label(&self, show_correctness: bool) -> &'static str {
        match self {
            Self::NotStarted | Self::Todo => "Not yet answered",
            Self::Invalid => "Incomplete answer",
            Self::Complete => "Answer saved",
            Self::NeedsGrading => "Requires grading",
            Self::Finished => "Finished",
            Self::GaveUp => "Not answered",
            Self::GradedRight if show_correctness => "Correct",
            Self::GradedPartial if show_correctness => "Partially correct",
            Self::GradedWrong if show_correctness => "Incorrect",
            Self::GradedRight | Self::GradedPartial | Self::GradedWrong => "Complete",
        }
    }
}

impl fmt::Display for QuestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graded_state_boundaries() {
        assert_eq!(
            QuestionState::graded_state_for_fraction(0.0),
            QuestionState::GradedWrong
        );
        assert_eq!(
            QuestionState::graded_state_for_fraction(0.5),
            QuestionState::GradedPartial
        );
        assert_eq!(
            QuestionState::graded_state_for_fraction(0.9999999),
            QuestionState::GradedRight
        );
        assert_eq!(
            QuestionState::graded_state_for_fraction(1.0),
            QuestionState::GradedRight
        );
    }

    #[test]
    fn needs_grading_is_still_active() {
        assert!(QuestionState::NeedsGrading.is_active());
        assert!(QuestionState::Invalid.is_active());
        assert!(!QuestionState::GaveUp.is_active());
        assert!(QuestionState::Finished.is_finished());
    }

    #[test]
    fn labels_hide_correctness_on_request() {
        assert_eq!(QuestionState::GradedRight.default_label(true), "Correct");
        assert_eq!(QuestionState::GradedWrong.default_label(false), "Complete");
    }
}
