use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::metrics::STALE_GRADING_RESULTS_TOTAL;
use crate::models::{Action, Attempt};
use crate::ports::{GradeProcessRegistry, RegradeStore};

/// Guards against grader callbacks that a regrade or a newer submission superseded, and
/// keeps regrade records in line with late-arriving genuine results.
///
/// The existence check and the later state update are only atomic with respect to a
/// concurrent regrade if the caller serializes them; the reconciler itself does not lock.
#[derive(Clone)]
pub struct RegradeReconciler {
    registry: Arc<dyn GradeProcessRegistry>,
    regrades: Arc<dyn RegradeStore>,
}

impl RegradeReconciler {
    pub fn new(registry: Arc<dyn GradeProcessRegistry>, regrades: Arc<dyn RegradeStore>) -> Self {
        Self { registry, regrades }
    }

    /// A callback is stale when its grade process record no longer exists or was issued
    /// for another attempt.
    pub async fn is_stale(&self, attempt: &Attempt, action: &Action) -> EngineResult<bool> {
        let Some(grade_process_id) = action.grade_process_id() else {
            return Ok(false);
        };

        let process = self
            .registry
            .find(grade_process_id)
            .await
            .map_err(EngineError::Storage)?;

        let reason = match process {
            None => "superseded",
            Some(process) if process.attempt_id != attempt.id => "foreign",
            Some(_) => return Ok(false),
        };

        STALE_GRADING_RESULTS_TOTAL
            .with_label_values(&[action.name()])
            .inc();
        tracing::info!(
            "Discarding {} {} callback for attempt={}: grade_process={}",
            reason,
            action.name(),
            attempt.id,
            grade_process_id
        );
        Ok(true)
    }

    /// Drops in-flight grading for the attempt so that its result will be discarded.
    pub async fn cancel_in_flight(&self, attempt: &Attempt) -> EngineResult<usize> {
        let cancelled = self
            .registry
            .cancel_for_attempt(&attempt.id)
            .await
            .map_err(EngineError::Storage)?;

        if cancelled > 0 {
            tracing::info!(
                "Cancelled {} in-flight grade process(es) for attempt={}",
                cancelled,
                attempt.id
            );
        }

        Ok(cancelled)
    }

    /// Whether a regrade replay that finished the attempt is waiting for this result.
    pub async fn awaited_by_regrade(
        &self,
        attempt: &Attempt,
        grade_process_id: &str,
    ) -> EngineResult<bool> {
        let record = self
            .regrades
            .find(&attempt.usage_id, attempt.slot)
            .await
            .map_err(EngineError::Storage)?;
        Ok(record
            .and_then(|record| record.awaited_grade_process_id)
            .is_some_and(|awaited| awaited == grade_process_id))
    }

    /// Overwrites an existing regrade record with the reconciled fraction.
    /// Returns whether a record was found.
    pub async fn reconcile(&self, attempt: &Attempt, adjusted_fraction: f64) -> EngineResult<bool> {
        let record = self
            .regrades
            .find(&attempt.usage_id, attempt.slot)
            .await
            .map_err(EngineError::Storage)?;

        let Some(record) = record else {
            return Ok(false);
        };

        self.regrades
            .update_fraction(&attempt.usage_id, attempt.slot, adjusted_fraction)
            .await
            .map_err(EngineError::Storage)?;

        tracing::info!(
            "Regrade record updated: usage={}, slot={}, fraction {:?} -> {}",
            attempt.usage_id,
            attempt.slot,
            record.new_fraction,
            adjusted_fraction
        );

        Ok(true)
    }
}
