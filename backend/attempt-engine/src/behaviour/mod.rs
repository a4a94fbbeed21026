//! Attempt behaviours: the state machines between a student action and the persisted
//! attempt state.
//!
//! [`BaseBehaviour`] is the generic multi-try capability set (draft saving, manual
//! comments, default display rules). [`InteractiveRetries`] wraps it and adds
//! submit/grade/try-again handling with an asynchronous external grader.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::EngineResult;
use crate::models::{Attempt, DisplayOptions, PendingStep, QuestionDefinition, Step, Verdict};

pub mod base;
pub mod hints;
pub mod interactive;
pub mod reconciler;
pub mod retry_budget;

pub use base::BaseBehaviour;
pub use hints::HintSelector;
pub use interactive::InteractiveRetries;
pub use reconciler::RegradeReconciler;
pub use retry_budget::RetryBudget;

#[async_trait]
pub trait AttemptBehaviour: Send + Sync {
    fn question(&self) -> &QuestionDefinition;

    /// Decides KEEP or DISCARD for `pending`, filling in its resulting state on KEEP.
    async fn process_action(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict>;

    /// Behaviour-level inputs the form layer may render and accept.
    fn expected_fields(&self, attempt: &Attempt) -> BTreeSet<String>;

    fn adjust_display_options(&self, attempt: &Attempt, options: &mut DisplayOptions);

    fn state_description(&self, attempt: &Attempt, show_correctness: bool) -> String;

    fn summarise_action(&self, step: &Step) -> String;

    /// Question-type inputs that are editable right now.
    fn expected_qt_fields(&self, attempt: &Attempt) -> BTreeSet<String> {
        default_expected_qt_fields(self, attempt)
    }
}

/// Question inputs are expected unless the display rules make them read-only.
pub fn default_expected_qt_fields<B: AttemptBehaviour + ?Sized>(
    behaviour: &B,
    attempt: &Attempt,
) -> BTreeSet<String> {
    let mut options = DisplayOptions::default();
    behaviour.adjust_display_options(attempt, &mut options);
    if options.readonly {
        BTreeSet::new()
    } else {
        behaviour.question().expected_fields()
    }
}

/// The student got an unfavourable grade with tries left and has not yet chosen to
/// retry or finish.
pub fn is_try_again_state(attempt: &Attempt) -> bool {
    let last = attempt.last_step();
    attempt.state().is_active()
        && last.action.is_grading_result()
        && last.behaviour_vars.tries_left.is_some()
}

/// Score to fraction. A zero max mark yields 0 instead of dividing by zero.
pub fn fraction_for_score(score: Option<f64>, max_mark: f64) -> f64 {
    match score {
        Some(score) if max_mark > 0.0 => (score / max_mark).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_mark_gives_zero_fraction() {
        assert_eq!(fraction_for_score(Some(5.0), 0.0), 0.0);
        assert_eq!(fraction_for_score(None, 10.0), 0.0);
        assert_eq!(fraction_for_score(Some(5.0), 10.0), 0.5);
    }

    #[test]
    fn scores_above_max_mark_are_capped() {
        assert_eq!(fraction_for_score(Some(12.0), 10.0), 1.0);
    }
}
