use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::metrics::GRADER_DISPATCH_TOTAL;
use crate::models::grading::GradingRequest;
use crate::models::{Attempt, QuestionDefinition, QuestionState, Submission};
use crate::ports::{GradeProcessRegistry, GraderClient};
use crate::utils::retry::{retry_async, RetryPolicy};

/// Hands submissions to the external grader without waiting for the score.
pub struct GradingDispatcher {
    registry: Arc<dyn GradeProcessRegistry>,
    grader: Arc<dyn GraderClient>,
    retry: RetryPolicy,
}

impl GradingDispatcher {
    pub fn new(
        registry: Arc<dyn GradeProcessRegistry>,
        grader: Arc<dyn GraderClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            grader,
            retry,
        }
    }

    /// Registers a fresh grade process and dispatches the submission.
    ///
    /// Any older in-flight job of the attempt is cancelled first, so only the newest
    /// submission can still deliver a result. Returns the state the attempt is in while
    /// grading runs. A grader that cannot be reached escalates to manual grading.
    pub async fn grade_response_async(
        &self,
        attempt: &Attempt,
        question: &QuestionDefinition,
        submission: Submission,
    ) -> EngineResult<QuestionState> {
        let superseded = self
            .registry
            .cancel_for_attempt(&attempt.id)
            .await
            .map_err(EngineError::Storage)?;
        if superseded > 0 {
            tracing::info!(
                "New submission for attempt={} supersedes {} in-flight grade process(es)",
                attempt.id,
                superseded
            );
        }

        let process = self
            .registry
            .register(&attempt.id, &question.id)
            .await
            .map_err(EngineError::Storage)?;

        let request = GradingRequest {
            grade_process_id: process.id.clone(),
            attempt_id: attempt.id.clone(),
            question_id: question.id.clone(),
            submission,
        };

        let result = retry_async(&self.retry, "grader submit", || {
            self.grader.submit(&request)
        })
        .await;

        match result {
            Ok(receipt) if receipt.accepted => {
                GRADER_DISPATCH_TOTAL.with_label_values(&["accepted"]).inc();
                tracing::info!(
                    "Submission dispatched: attempt={}, grade_process={}, job={:?}",
                    attempt.id,
                    process.id,
                    receipt.job_id
                );
            }
            Ok(_) => {
                GRADER_DISPATCH_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::warn!(
                    "Grader rejected submission for attempt={}, escalating to manual grading",
                    attempt.id
                );
                self.release_quietly(&process.id).await;
            }
            Err(e) => {
                GRADER_DISPATCH_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!(
                    "Grader unreachable for attempt={}: {:#}. Escalating to manual grading",
                    attempt.id,
                    e
                );
                self.release_quietly(&process.id).await;
            }
        }

        Ok(QuestionState::NeedsGrading)
    }

    async fn release_quietly(&self, grade_process_id: &str) {
        if let Err(e) = self.registry.release(grade_process_id).await {
            tracing::error!(
                "Failed to release grade_process={}: {:#}",
                grade_process_id,
                e
            );
        }
    }
}
