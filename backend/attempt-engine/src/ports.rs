//! Boundaries to the collaborators the engine depends on.
//!
//! Every port is object safe and used behind `Arc<dyn ...>` so the attempt service can be
//! wired against MongoDB/Redis/HTTP in production and against in-memory adapters in tests.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::grading::{DispatchReceipt, GradingRequest};
use crate::models::{Attempt, GradeProcess, QuestionDefinition, RegradeRecord, Step};

#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn find(&self, question_id: &str) -> Result<Option<QuestionDefinition>>;
}

/// Append-only step storage keyed by attempt.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: &Attempt) -> Result<()>;

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>>;

    async fn append_step(&self, attempt_id: &str, step: &Step) -> Result<()>;

    /// Replaces the recorded history after a regrade replay.
    async fn replace_steps(&self, attempt_id: &str, steps: &[Step]) -> Result<()>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Live correlation ids of in-flight grading jobs.
#[async_trait]
pub trait GradeProcessRegistry: Send + Sync {
    async fn register(&self, attempt_id: &str, question_id: &str) -> Result<GradeProcess>;

    /// The live record, or `None` once the job was released, cancelled or expired.
    async fn find(&self, grade_process_id: &str) -> Result<Option<GradeProcess>>;

    async fn live_for_attempt(&self, attempt_id: &str) -> Result<Vec<GradeProcess>>;

    async fn release(&self, grade_process_id: &str) -> Result<()>;

    /// Drops every live job of the attempt. Returns how many were dropped.
    async fn cancel_for_attempt(&self, attempt_id: &str) -> Result<usize>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait RegradeStore: Send + Sync {
    async fn find(&self, usage_id: &str, slot: u32) -> Result<Option<RegradeRecord>>;

    async fn update_fraction(&self, usage_id: &str, slot: u32, fraction: f64) -> Result<()>;

    /// Creates or replaces the record. Only the regrade service writes new records.
    async fn record_estimate(&self, record: &RegradeRecord) -> Result<()>;
}

#[async_trait]
pub trait GraderClient: Send + Sync {
    async fn submit(&self, request: &GradingRequest) -> Result<DispatchReceipt>;
}
