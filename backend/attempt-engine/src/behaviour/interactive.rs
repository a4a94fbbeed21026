use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::metrics::{ATTEMPT_ACTIONS_TOTAL, GRADING_RESULTS_TOTAL};
use crate::models::{
    Action, Attempt, DisplayOptions, Hint, MarksVisibility, PendingStep, QuestionDefinition,
    QuestionState, RenderMode, Step, Verdict,
};
use crate::services::grading_dispatcher::GradingDispatcher;
use crate::services::response_assembler::ResponseAssembler;

use super::{
    default_expected_qt_fields, fraction_for_score, is_try_again_state, AttemptBehaviour,
    BaseBehaviour, HintSelector, RegradeReconciler, RetryBudget,
};

const SENT_TO_GRADER: &str = "The submission has been sent to the grader for grading.";
const GRADED_BY_GRADER: &str = "The submission has been graded by the grader";
const ALREADY_GRADED: &str = "The submission has already been graded. \
     The last score was reused and the question attempt was finished.";
const GRADER_FAILED: &str = "Automatic grading failed";

/// Interactive behaviour with multiple tries for asynchronously graded programming tasks.
///
/// Each submit goes to the external grader. A wrong or partial result with tries left
/// puts the attempt into the try-again state, where the student either confirms a retry
/// or finishes and keeps the last score. Every used try costs `penalty` of the fraction.
pub struct InteractiveRetries {
    base: BaseBehaviour,
    question: Arc<QuestionDefinition>,
    dispatcher: Arc<GradingDispatcher>,
    reconciler: RegradeReconciler,
}

impl InteractiveRetries {
    pub fn new(
        question: Arc<QuestionDefinition>,
        dispatcher: Arc<GradingDispatcher>,
        reconciler: RegradeReconciler,
    ) -> Self {
        Self {
            base: BaseBehaviour::new(question.clone()),
            question,
            dispatcher,
            reconciler,
        }
    }

    pub fn retry_budget(&self, attempt: &Attempt) -> RetryBudget {
        RetryBudget::from_attempt(attempt)
    }

    pub fn applicable_hint(&self, attempt: &Attempt) -> Option<&Hint> {
        HintSelector::new(&self.question).applicable_hint(attempt)
    }

    pub fn right_answer_summary(&self) -> Option<&str> {
        self.question.right_answer_summary.as_deref()
    }

    fn handle_try_again(&self, pending: &mut PendingStep) -> Verdict {
        pending.state = QuestionState::Todo;
        Verdict::Keep
    }

    async fn handle_submit(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        if attempt.state().is_finished() {
            return Ok(Verdict::Discard);
        }

        if !self
            .question
            .is_complete_response(&pending.qt_data, &pending.files)
        {
            tracing::debug!("Incomplete submission for attempt={}", attempt.id);
            pending.state = QuestionState::Invalid;
            return Ok(Verdict::Keep);
        }

        let submission =
            ResponseAssembler::new(&self.question).assemble(&pending.qt_data, &pending.files);
        pending.state = self
            .dispatcher
            .grade_response_async(attempt, &self.question, submission)
            .await?;
        pending.response_summary = Some(
            self.question
                .summarise_response(&pending.qt_data, &pending.files),
        );
        Ok(Verdict::Keep)
    }

    async fn handle_finish(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        let last = attempt.last_step();

        // Finish pressed while the last submit is still being graded: no credit. The late
        // result is turned away by the finished-state guard in handle_grading_result.
        if matches!(last.action, Action::Submit) && last.state != QuestionState::Invalid {
            pending.state = QuestionState::Finished;
            pending.fraction = Some(0.0);
            return Ok(Verdict::Keep);
        }

        if attempt.state().is_finished() {
            return Ok(Verdict::Discard);
        }

        // Finishing from the try-again state reuses the last score instead of regrading.
        if let (Action::GradingResult { score, .. }, Some(tries_left)) =
            (&last.action, last.behaviour_vars.tries_left)
        {
            let fraction = fraction_for_score(*score, attempt.max_mark);
            // The reused result did not consume a fresh try.
            let adjusted = self.retry_budget(attempt).adjust_fraction_with(
                fraction,
                self.question.penalty,
                tries_left + 1,
            );
            pending.state = QuestionState::graded_state_for_fraction(fraction);
            pending.fraction = Some(adjusted);
            return Ok(Verdict::Keep);
        }

        let data = attempt.last_qt_data();
        let files = attempt.last_files();
        if !self.question.is_gradable_response(&data, &files) {
            pending.state = QuestionState::GaveUp;
            pending.fraction = Some(0.0);
        } else {
            let submission = ResponseAssembler::new(&self.question).assemble(&data, &files);
            pending.state = self
                .dispatcher
                .grade_response_async(attempt, &self.question, submission)
                .await?;
        }
        pending.response_summary = Some(self.question.summarise_response(&data, &files));
        Ok(Verdict::Keep)
    }

    async fn handle_grading_result(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        if self.reconciler.is_stale(attempt, &pending.action).await? {
            return Ok(Verdict::Discard);
        }
        let state = attempt.state();
        if state.is_finished() {
            // Only the result a regrade replay dispatched may grade a finished attempt.
            let awaited_by_regrade = match pending.action.grade_process_id() {
                Some(id) if state == QuestionState::Finished => {
                    self.reconciler.awaited_by_regrade(attempt, id).await?
                }
                _ => false,
            };
            if !awaited_by_regrade {
                tracing::info!(
                    "Ignoring grading result for finished attempt={} (state={})",
                    attempt.id,
                    state
                );
                return Ok(Verdict::Discard);
            }
        }

        let score = match &pending.action {
            Action::GradingResult { score, .. } => *score,
            _ => None,
        };
        let fraction = fraction_for_score(score, attempt.max_mark);
        let graded = QuestionState::graded_state_for_fraction(fraction);
        let budget = self.retry_budget(attempt);
        let adjusted = budget.adjust_fraction(fraction, self.question.penalty);

        let triggered_by_submit = attempt
            .iter_steps()
            .rev()
            .find(|step| matches!(step.action, Action::Submit | Action::Finish))
            .is_some_and(|step| matches!(step.action, Action::Submit));

        if triggered_by_submit && graded != QuestionState::GradedRight && !budget.is_last_try() {
            let next = budget.consume();
            pending.behaviour_vars.tries_left = Some(next.remaining());
            pending.behaviour_vars.show_graded_feedback = true;
            pending.state = QuestionState::Todo;
            GRADING_RESULTS_TOTAL.with_label_values(&["retry"]).inc();
            tracing::info!(
                "Attempt {} graded {} with {} tries left, awaiting retry decision",
                attempt.id,
                graded,
                next.remaining()
            );
        } else {
            pending.state = graded;
            pending.fraction = Some(adjusted);
            GRADING_RESULTS_TOTAL
                .with_label_values(&[graded.as_str()])
                .inc();
            tracing::info!(
                "Attempt {} finalized: state={}, raw={:.4}, adjusted={:.4}, tries_used={}",
                attempt.id,
                graded,
                fraction,
                adjusted,
                budget.used()
            );
        }

        pending.response_summary = Some(
            self.question
                .summarise_response(&attempt.last_qt_data(), &attempt.last_files()),
        );

        self.reconciler.reconcile(attempt, adjusted).await?;

        Ok(Verdict::Keep)
    }

    async fn handle_grader_unavailable(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        if attempt.state().is_finished() {
            return Ok(Verdict::Discard);
        }
        if self.reconciler.is_stale(attempt, &pending.action).await? {
            return Ok(Verdict::Discard);
        }

        GRADING_RESULTS_TOTAL
            .with_label_values(&["unavailable"])
            .inc();
        tracing::warn!(
            "Grader unavailable for attempt={}, manual grading required",
            attempt.id
        );
        pending.state = QuestionState::NeedsGrading;
        Ok(Verdict::Keep)
    }

    /// A comment replayed by a regrade refers to the old grading and is dropped.
    fn handle_comment(&self, attempt: &Attempt, pending: &mut PendingStep) -> Verdict {
        if pending.behaviour_vars.applied_flag {
            tracing::debug!(
                "Comment for attempt={} already applied, discarding replay",
                attempt.id
            );
            return Verdict::Discard;
        }

        let verdict = self.base.process_comment(attempt, pending);
        pending.behaviour_vars.applied_flag = true;
        verdict
    }

    fn handle_save(&self, attempt: &Attempt, pending: &mut PendingStep) -> Verdict {
        let verdict = self.base.process_save(attempt, pending);
        if verdict == Verdict::Keep && pending.state == QuestionState::Complete {
            pending.state = QuestionState::Todo;
        }
        verdict
    }
}

#[async_trait]
impl AttemptBehaviour for InteractiveRetries {
    fn question(&self) -> &QuestionDefinition {
        &self.question
    }

    async fn process_action(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> EngineResult<Verdict> {
        let verdict = if matches!(pending.action, Action::Finish) {
            self.handle_finish(attempt, pending).await?
        } else if is_try_again_state(attempt) {
            match pending.action {
                Action::TryAgain => self.handle_try_again(pending),
                _ => Verdict::Discard,
            }
        } else {
            match pending.action {
                Action::Comment { .. } => self.handle_comment(attempt, pending),
                Action::Submit => self.handle_submit(attempt, pending).await?,
                Action::GradingResult { .. } => {
                    self.handle_grading_result(attempt, pending).await?
                }
                Action::GraderUnavailable { .. } => {
                    self.handle_grader_unavailable(attempt, pending).await?
                }
                Action::Save => self.handle_save(attempt, pending),
                Action::TryAgain | Action::Start | Action::Finish => Verdict::Discard,
            }
        };

        let verdict_label = match verdict {
            Verdict::Keep => "keep",
            Verdict::Discard => "discard",
        };
        ATTEMPT_ACTIONS_TOTAL
            .with_label_values(&[pending.action.name(), verdict_label])
            .inc();
        tracing::debug!(
            "attempt={} action={} verdict={} state={}",
            attempt.id,
            pending.action.name(),
            verdict_label,
            pending.state
        );

        Ok(verdict)
    }

    fn expected_fields(&self, attempt: &Attempt) -> BTreeSet<String> {
        if is_try_again_state(attempt) {
            BTreeSet::from(["tryagain".to_string()])
        } else if attempt.state().is_active() {
            BTreeSet::from(["submit".to_string()])
        } else {
            self.base.expected_fields(attempt)
        }
    }

    fn expected_qt_fields(&self, attempt: &Attempt) -> BTreeSet<String> {
        if HintSelector::new(&self.question).clears_wrong_answer(attempt) {
            return self.question.expected_fields();
        }
        default_expected_qt_fields(self, attempt)
    }

    fn adjust_display_options(&self, attempt: &Attempt, options: &mut DisplayOptions) {
        if !is_try_again_state(attempt) {
            self.base.adjust_display_options(attempt, options);
            if attempt.state() == QuestionState::Invalid
                && options.marks == MarksVisibility::MarkAndMax
            {
                options.marks = MarksVisibility::MaxOnly;
            }
            return;
        }

        options.render_mode = if options.readonly {
            RenderMode::ReadOnlyAndTryAgain
        } else {
            RenderMode::TryAgainReadOnly
        };
        options.readonly = true;

        if let Some(hint) = self.applicable_hint(attempt) {
            hint.adjust_display_options(options);
        }

        let saved = options.clone();
        self.base.adjust_display_options(attempt, options);
        options.feedback = saved.feedback;
        options.num_parts_correct = saved.num_parts_correct;
    }

    fn state_description(&self, attempt: &Attempt, show_correctness: bool) -> String {
        let state = attempt.state();
        if !state.is_active() || state == QuestionState::Invalid {
            return self.base.state_description(attempt, show_correctness);
        }
        format!(
            "Tries remaining: {}",
            self.retry_budget(attempt).remaining()
        )
    }

    fn summarise_action(&self, step: &Step) -> String {
        match &step.action {
            Action::Comment { .. } => self.base.summarise_comment(step),
            Action::Finish if step.state.is_graded() => format!("Finished: {}", ALREADY_GRADED),
            Action::Finish => format!("Finished: {}", SENT_TO_GRADER),
            Action::TryAgain => "Try again".to_string(),
            Action::Submit if step.state == QuestionState::Invalid => {
                "Submit: Incomplete answer".to_string()
            }
            Action::Submit => format!("Submit: {}", SENT_TO_GRADER),
            Action::GradingResult { .. } => format!("Graded: {}", GRADED_BY_GRADER),
            Action::GraderUnavailable { .. } => format!("Grading: {}", GRADER_FAILED),
            Action::Save | Action::Start => self.base.summarise_save(step),
        }
    }
}
