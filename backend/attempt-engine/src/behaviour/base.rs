use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::models::{
    Action, Attempt, DisplayOptions, PendingStep, QuestionDefinition, QuestionState, Step, Verdict,
};

use super::{fraction_for_score, AttemptBehaviour};

/// Generic multi-try behaviour: draft saving, manual comments and the default display
/// rules. Grading is left to a human, so submit-style actions are ignored.
#[derive(Clone)]
pub struct BaseBehaviour {
    question: Arc<QuestionDefinition>,
}

impl BaseBehaviour {
    pub fn new(question: Arc<QuestionDefinition>) -> Self {
        Self { question }
    }

    pub fn process_save(&self, attempt: &Attempt, pending: &mut PendingStep) -> Verdict {
        if attempt.state().is_finished() {
            return Verdict::Discard;
        }

        if pending.qt_data == attempt.last_qt_data() && pending.files == attempt.last_files() {
            tracing::debug!("Save for attempt={} repeats the last response", attempt.id);
            return Verdict::Discard;
        }

        pending.state = if self
            .question
            .is_complete_response(&pending.qt_data, &pending.files)
        {
            QuestionState::Complete
        } else {
            QuestionState::Todo
        };
        pending.response_summary = Some(
            self.question
                .summarise_response(&pending.qt_data, &pending.files),
        );
        Verdict::Keep
    }

    pub fn process_comment(&self, attempt: &Attempt, pending: &mut PendingStep) -> Verdict {
        let mark = match &pending.action {
            Action::Comment { mark, .. } => *mark,
            _ => return Verdict::Discard,
        };

        match mark {
            Some(mark) => {
                if !(0.0..=attempt.max_mark).contains(&mark) {
                    tracing::warn!(
                        "Rejecting manual mark {} outside [0, {}] for attempt={}",
                        mark,
                        attempt.max_mark,
                        attempt.id
                    );
                    return Verdict::Discard;
                }
                let fraction = fraction_for_score(Some(mark), attempt.max_mark);
                pending.fraction = Some(fraction);
                pending.state = QuestionState::graded_state_for_fraction(fraction);
            }
            None => {
                pending.state = attempt.state();
                pending.fraction = attempt.fraction();
            }
        }

        Verdict::Keep
    }

    pub fn process_finish(&self, attempt: &Attempt, pending: &mut PendingStep) -> Verdict {
        if attempt.state().is_finished() {
            return Verdict::Discard;
        }

        let data = attempt.last_qt_data();
        let files = attempt.last_files();
        if self.question.is_gradable_response(&data, &files) {
            pending.state = QuestionState::Finished;
        } else {
            pending.state = QuestionState::GaveUp;
            pending.fraction = Some(0.0);
        }
        pending.response_summary = Some(self.question.summarise_response(&data, &files));
        Verdict::Keep
    }

    pub fn summarise_save(&self, step: &Step) -> String {
        if !step.has_response() {
            return "Started".to_string();
        }
        format!(
            "Saved: {}",
            self.question.summarise_response(&step.qt_data, &step.files)
        )
    }

    pub fn summarise_comment(&self, step: &Step) -> String {
        match &step.action {
            Action::Comment {
                comment,
                mark: Some(mark),
            } => format!("Manually graded {} with comment: {}", mark, comment),
            Action::Comment { comment, .. } => format!("Commented: {}", comment),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl AttemptBehaviour for BaseBehaviour {
    fn question(&self) -> &QuestionDefinition {
        &self.question
    }

    async fn process_action(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        let verdict = match pending.action {
            Action::Save => self.process_save(attempt, pending),
            Action::Comment { .. } => self.process_comment(attempt, pending),
            Action::Finish => self.process_finish(attempt, pending),
            _ => Verdict::Discard,
        };
        Ok(verdict)
    }

    fn expected_fields(&self, attempt: &Attempt) -> BTreeSet<String> {
        if attempt.state().is_finished() {
            BTreeSet::new()
        } else {
            BTreeSet::from(["save".to_string()])
        }
    }

    fn adjust_display_options(&self, attempt: &Attempt, options: &mut DisplayOptions) {
        let saved = options.clone();

        if !attempt.has_marks() {
            options.correctness = false;
            options.num_parts_correct = false;
        }

        let finished = attempt.state().is_finished();
        if finished {
            options.readonly = true;
        } else {
            options.hide_all_feedback();
        }

        // Just graded with tries left: let the student see what went wrong.
        if !finished && attempt.shows_graded_feedback() {
            options.feedback = saved.feedback;
            options.correctness = saved.correctness;
            options.num_parts_correct = saved.num_parts_correct;
        }
    }

    fn state_description(&self, attempt: &Attempt, show_correctness: bool) -> String {
        attempt.state().default_label(show_correctness).to_string()
    }

    fn summarise_action(&self, step: &Step) -> String {
        match step.action {
            Action::Comment { .. } => self.summarise_comment(step),
            Action::Finish => "Finished".to_string(),
            _ => self.summarise_save(step),
        }
    }
}
