use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::behaviour::{AttemptBehaviour, InteractiveRetries, RegradeReconciler};
use crate::error::{EngineError, EngineResult};
use crate::metrics::ATTEMPTS_STARTED;
use crate::models::attempt::{CreateAttemptRequest, ProcessActionResponse};
use crate::models::grading::{GraderCallbackRequest, GraderOutcome};
use crate::models::{
    Action, Attempt, AttemptView, DisplayOptions, PendingStep, QuestionDefinition, QuestionState,
    RegradeRecord, Verdict,
};
use crate::ports::{AttemptStore, GradeProcessRegistry, QuestionBank, RegradeStore};
use crate::services::grading_dispatcher::GradingDispatcher;

/// Everything the attempt service talks to.
#[derive(Clone)]
pub struct EnginePorts {
    pub questions: Arc<dyn QuestionBank>,
    pub attempts: Arc<dyn AttemptStore>,
    pub registry: Arc<dyn GradeProcessRegistry>,
    pub regrades: Arc<dyn RegradeStore>,
}

/// Runs actions against stored attempts, one writer per attempt at a time.
pub struct AttemptService {
    ports: EnginePorts,
    dispatcher: Arc<GradingDispatcher>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AttemptService {
    pub fn new(ports: EnginePorts, dispatcher: Arc<GradingDispatcher>) -> Self {
        Self {
            ports,
            dispatcher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start_attempt(&self, req: &CreateAttemptRequest) -> EngineResult<Attempt> {
        let question = self.load_question(&req.question_id).await?;
        let attempt = Attempt::start(
            &req.usage_id,
            req.slot,
            &question.id,
            req.max_mark,
            question.total_tries(),
        );

        self.ports
            .attempts
            .insert(&attempt)
            .await
            .map_err(EngineError::Storage)?;
        ATTEMPTS_STARTED.inc();

        tracing::info!(
            "Attempt started: id={}, usage={}, slot={}, question={}, tries={}",
            attempt.id,
            attempt.usage_id,
            attempt.slot,
            question.id,
            question.total_tries()
        );
        Ok(attempt)
    }

    /// Feeds one action to the behaviour and records the resulting step on KEEP.
    pub async fn process_action(
        &self,
        attempt_id: &str,
        mut pending: PendingStep,
    ) -> EngineResult<ProcessActionResponse> {
        if matches!(pending.action, Action::Start) {
            return Err(EngineError::InvalidRequest(
                "start is recorded when the attempt is created".to_string(),
            ));
        }

        let _guard = self.lock_attempt(attempt_id).await;

        let mut attempt = self.load_attempt(attempt_id).await?;
        let question = self.load_question(&attempt.question_id).await?;
        let behaviour = self.behaviour_for(question);

        let verdict = behaviour.process_action(&attempt, &mut pending).await?;
        if verdict == Verdict::Discard {
            return Ok(ProcessActionResponse {
                verdict,
                state: attempt.state(),
                step: None,
            });
        }

        let step = attempt.append(pending).clone();
        self.ports
            .attempts
            .append_step(&attempt.id, &step)
            .await
            .map_err(EngineError::Storage)?;

        tracing::info!(
            "Step recorded: attempt={}, seq={}, action={}, state={}",
            attempt.id,
            step.sequence,
            step.action.name(),
            step.state
        );

        Ok(ProcessActionResponse {
            verdict,
            state: step.state,
            step: Some(step),
        })
    }

    /// Turns a grader callback into a `gradingresult`/`graderunavailable` action.
    ///
    /// A grade process owned by the attempt is released afterwards whatever the verdict or
    /// error, so a repeated delivery is stale. One issued for another attempt is left alone.
    pub async fn handle_grader_callback(
        &self,
        req: &GraderCallbackRequest,
    ) -> EngineResult<ProcessActionResponse> {
        let action = match &req.outcome {
            GraderOutcome::Graded { score } => Action::GradingResult {
                grade_process_id: req.grade_process_id.clone(),
                score: *score,
            },
            GraderOutcome::Unavailable => Action::GraderUnavailable {
                grade_process_id: req.grade_process_id.clone(),
            },
        };

        let owned = self
            .ports
            .registry
            .find(&req.grade_process_id)
            .await
            .map_err(EngineError::Storage)?
            .is_some_and(|process| process.attempt_id == req.attempt_id);

        let result = self
            .process_action(&req.attempt_id, PendingStep::new(action))
            .await;

        if owned {
            let released = self.ports.registry.release(&req.grade_process_id).await;
            match (&result, released) {
                (Ok(_), Err(e)) => return Err(EngineError::Storage(e)),
                (Err(_), Err(e)) => tracing::error!(
                    "Failed to release grade_process={} after a failed callback: {:#}",
                    req.grade_process_id,
                    e
                ),
                (_, Ok(())) => {}
            }
        } else {
            tracing::warn!(
                "Callback grade_process={} is not live for attempt={}",
                req.grade_process_id,
                req.attempt_id
            );
        }

        result
    }

    pub async fn view_attempt(&self, attempt_id: &str) -> EngineResult<AttemptView> {
        let attempt = self.load_attempt(attempt_id).await?;
        let question = self.load_question(&attempt.question_id).await?;
        let behaviour = self.behaviour_for(question);

        let mut display = DisplayOptions::default();
        behaviour.adjust_display_options(&attempt, &mut display);
        let budget = behaviour.retry_budget(&attempt);

        let right_answer = if display.right_answer {
            behaviour.right_answer_summary().map(str::to_string)
        } else {
            None
        };

        Ok(AttemptView {
            attempt_id: attempt.id.clone(),
            state: attempt.state(),
            fraction: attempt.fraction(),
            description: behaviour.state_description(&attempt, display.correctness),
            tries_total: budget.total(),
            tries_remaining: budget.remaining(),
            expected_fields: behaviour.expected_fields(&attempt),
            expected_qt_fields: behaviour.expected_qt_fields(&attempt),
            hint: behaviour
                .applicable_hint(&attempt)
                .map(|hint| hint.text.clone()),
            right_answer,
            history: attempt
                .iter_steps()
                .map(|step| behaviour.summarise_action(step))
                .collect(),
            display,
        })
    }

    /// Replays the recorded history through a fresh copy of the attempt.
    ///
    /// In-flight grading is cancelled first, so old grading callbacks in the history are
    /// discarded and every submit is sent to the grader again. The new estimate is kept
    /// as a regrade record that later grading results bring up to date.
    pub async fn regrade(&self, attempt_id: &str) -> EngineResult<RegradeRecord> {
        let _guard = self.lock_attempt(attempt_id).await;

        let attempt = self.load_attempt(attempt_id).await?;
        let question = self.load_question(&attempt.question_id).await?;
        let behaviour = self.behaviour_for(question);

        self.reconciler().cancel_in_flight(&attempt).await?;

        let mut replay = attempt.restarted();
        let mut discarded = 0usize;
        for step in &attempt.steps {
            let mut pending = PendingStep::replay_of(step);
            match behaviour.process_action(&replay, &mut pending).await? {
                Verdict::Keep => {
                    replay.append(pending);
                }
                Verdict::Discard => discarded += 1,
            }
        }

        self.ports
            .attempts
            .replace_steps(&attempt.id, &replay.steps)
            .await
            .map_err(EngineError::Storage)?;

        // A replay that finished while its submit is still graded waits for that result.
        let awaited_grade_process_id = if replay.state() == QuestionState::Finished {
            self.ports
                .registry
                .live_for_attempt(&attempt.id)
                .await
                .map_err(EngineError::Storage)?
                .into_iter()
                .max_by_key(|process| process.created_at)
                .map(|process| process.id)
        } else {
            None
        };

        let record = RegradeRecord {
            usage_id: attempt.usage_id.clone(),
            slot: attempt.slot,
            attempt_id: attempt.id.clone(),
            old_fraction: attempt.fraction(),
            new_fraction: replay.fraction(),
            awaited_grade_process_id,
            regraded_at: Utc::now(),
        };
        self.ports
            .regrades
            .record_estimate(&record)
            .await
            .map_err(EngineError::Storage)?;

        tracing::info!(
            "Attempt {} regraded: {} step(s) replayed, {} discarded, state {} -> {}",
            attempt.id,
            replay.steps.len(),
            discarded,
            attempt.state(),
            replay.state()
        );
        Ok(record)
    }

    fn reconciler(&self) -> RegradeReconciler {
        RegradeReconciler::new(self.ports.registry.clone(), self.ports.regrades.clone())
    }

    fn behaviour_for(&self, question: QuestionDefinition) -> InteractiveRetries {
        InteractiveRetries::new(Arc::new(question), self.dispatcher.clone(), self.reconciler())
    }

    async fn lock_attempt(&self, attempt_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(attempt_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn load_attempt(&self, attempt_id: &str) -> EngineResult<Attempt> {
        self.ports
            .attempts
            .find(attempt_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::AttemptNotFound(attempt_id.to_string()))
    }

    async fn load_question(&self, question_id: &str) -> EngineResult<QuestionDefinition> {
        self.ports
            .questions
            .find(question_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::QuestionNotFound(question_id.to_string()))
    }
}
