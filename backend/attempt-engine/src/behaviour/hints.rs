use crate::models::{Attempt, Hint, QuestionDefinition};

use super::is_try_again_state;

/// Picks the hint that belongs to the retry the student is about to make.
pub struct HintSelector<'a> {
    question: &'a QuestionDefinition,
}

impl<'a> HintSelector<'a> {
    pub fn new(question: &'a QuestionDefinition) -> Self {
        Self { question }
    }

    /// Only defined while waiting for the retry decision; index is `hintCount - triesleft`.
    pub fn applicable_hint(&self, attempt: &Attempt) -> Option<&'a Hint> {
        if !is_try_again_state(attempt) {
            return None;
        }
        let tries_left = attempt.last_tries_left()? as usize;
        let index = self.question.hint_count().checked_sub(tries_left)?;
        self.question.hint(index)
    }

    /// Whether the next submit starts from an empty response.
    pub fn clears_wrong_answer(&self, attempt: &Attempt) -> bool {
        self.applicable_hint(attempt)
            .is_some_and(|hint| hint.clear_wrong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, PendingStep, QuestionState};

    fn question() -> QuestionDefinition {
        QuestionDefinition {
            id: "q".to_string(),
            name: "q".to_string(),
            penalty: 0.1,
            hints: vec![
                Hint {
                    text: "Check the loop bounds".to_string(),
                    ..Hint::default()
                },
                Hint {
                    text: "Off by one".to_string(),
                    clear_wrong: true,
                    ..Hint::default()
                },
            ],
            enable_file_submissions: false,
            enable_free_text_submissions: true,
            free_text_max_fields: 1,
            free_text_autogenerate_filenames: false,
            free_text_fields: Vec::new(),
            right_answer_summary: None,
        }
    }

    fn graded_wrong(attempt: &mut Attempt, tries_left: u32) {
        let mut step = PendingStep::new(Action::GradingResult {
            grade_process_id: "gp".to_string(),
            score: Some(0.0),
        });
        step.behaviour_vars.tries_left = Some(tries_left);
        step.state = QuestionState::Todo;
        attempt.append(step);
    }

    #[test]
    fn no_hint_outside_try_again_state() {
        let q = question();
        let attempt = Attempt::start("u", 1, "q", 10.0, q.total_tries());
        assert!(HintSelector::new(&q).applicable_hint(&attempt).is_none());
    }

    #[test]
    fn hints_follow_the_remaining_tries() {
        let q = question();
        let selector = HintSelector::new(&q);
        let mut attempt = Attempt::start("u", 1, "q", 10.0, q.total_tries());

        graded_wrong(&mut attempt, 2);
        assert_eq!(
            selector.applicable_hint(&attempt).map(|h| h.text.as_str()),
            Some("Check the loop bounds")
        );
        assert!(!selector.clears_wrong_answer(&attempt));

        graded_wrong(&mut attempt, 1);
        assert_eq!(
            selector.applicable_hint(&attempt).map(|h| h.text.as_str()),
            Some("Off by one")
        );
        assert!(selector.clears_wrong_answer(&attempt));
    }

    #[test]
    fn out_of_range_index_has_no_hint() {
        let q = question();
        let mut attempt = Attempt::start("u", 1, "q", 10.0, 5);
        graded_wrong(&mut attempt, 4);
        assert!(HintSelector::new(&q).applicable_hint(&attempt).is_none());
    }
}
