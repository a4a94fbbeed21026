use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, to_bson};
use mongodb::{Collection, Database};

use crate::metrics::track_store_operation;
use crate::models::{Attempt, QuestionDefinition, RegradeRecord, Step};
use crate::ports::{AttemptStore, QuestionBank, RegradeStore};
use crate::utils::retry::{retry_async, RetryPolicy};

const ATTEMPTS: &str = "question_attempts";
const QUESTIONS: &str = "questions";
const REGRADES: &str = "attempt_regrades";

pub struct MongoAttemptStore {
    mongo: Database,
    retry: RetryPolicy,
}

impl MongoAttemptStore {
    pub fn new(mongo: Database, retry: RetryPolicy) -> Self {
        Self { mongo, retry }
    }

    fn collection(&self) -> Collection<Attempt> {
        self.mongo.collection(ATTEMPTS)
    }
}

#[async_trait]
impl AttemptStore for MongoAttemptStore {
    async fn insert(&self, attempt: &Attempt) -> Result<()> {
        let collection = self.collection();
        track_store_operation("insert", ATTEMPTS, async {
            retry_async(&self.retry, "attempt insert", || async {
                collection.insert_one(attempt).await.map(|_| ())
            })
            .await
            .context("Failed to insert attempt")
        })
        .await?;

        tracing::info!("Attempt stored: id={}", attempt.id);
        Ok(())
    }

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        let collection = self.collection();
        track_store_operation("find", ATTEMPTS, async {
            retry_async(&self.retry, "attempt find", || async {
                collection.find_one(doc! { "_id": attempt_id }).await
            })
            .await
            .context("Failed to query question_attempts collection")
        })
        .await
    }

    async fn append_step(&self, attempt_id: &str, step: &Step) -> Result<()> {
        let collection = self.collection();
        let step_bson = to_bson(step).context("Failed to serialize step")?;

        // Not retried: a lost acknowledgement would push the step twice.
        let result = track_store_operation("append_step", ATTEMPTS, async {
            collection
                .update_one(
                    doc! { "_id": attempt_id },
                    doc! { "$push": { "steps": step_bson } },
                )
                .await
                .context("Failed to append step")
        })
        .await?;

        if result.matched_count == 0 {
            anyhow::bail!("Attempt {} disappeared before step {}", attempt_id, step.sequence);
        }
        Ok(())
    }

    async fn replace_steps(&self, attempt_id: &str, steps: &[Step]) -> Result<()> {
        let collection = self.collection();
        let steps_bson = to_bson(steps).context("Failed to serialize steps")?;

        let result = track_store_operation("replace_steps", ATTEMPTS, async {
            collection
                .update_one(
                    doc! { "_id": attempt_id },
                    doc! { "$set": { "steps": steps_bson } },
                )
                .await
                .context("Failed to replace steps")
        })
        .await?;

        if result.matched_count == 0 {
            anyhow::bail!("Attempt {} not found while replacing steps", attempt_id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

pub struct MongoQuestionBank {
    mongo: Database,
}

impl MongoQuestionBank {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionBank for MongoQuestionBank {
    async fn find(&self, question_id: &str) -> Result<Option<QuestionDefinition>> {
        let collection: Collection<QuestionDefinition> = self.mongo.collection(QUESTIONS);
        track_store_operation("find", QUESTIONS, async {
            collection
                .find_one(doc! { "_id": question_id })
                .await
                .context("Failed to query questions collection")
        })
        .await
    }
}

pub struct MongoRegradeStore {
    mongo: Database,
}

impl MongoRegradeStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<RegradeRecord> {
        self.mongo.collection(REGRADES)
    }
}

#[async_trait]
impl RegradeStore for MongoRegradeStore {
    async fn find(&self, usage_id: &str, slot: u32) -> Result<Option<RegradeRecord>> {
        let collection = self.collection();
        track_store_operation("find", REGRADES, async {
            collection
                .find_one(doc! { "usage_id": usage_id, "slot": i64::from(slot) })
                .await
                .context("Failed to query attempt_regrades collection")
        })
        .await
    }

    async fn update_fraction(&self, usage_id: &str, slot: u32, fraction: f64) -> Result<()> {
        let collection = self.collection();
        track_store_operation("update_fraction", REGRADES, async {
            collection
                .update_one(
                    doc! { "usage_id": usage_id, "slot": i64::from(slot) },
                    doc! { "$set": { "new_fraction": fraction } },
                )
                .await
                .context("Failed to update regrade fraction")
        })
        .await?;

        tracing::debug!(
            "Regrade fraction updated: usage={}, slot={}, fraction={:.4}",
            usage_id,
            slot,
            fraction
        );
        Ok(())
    }

    async fn record_estimate(&self, record: &RegradeRecord) -> Result<()> {
        let collection = self.collection();
        track_store_operation("record_estimate", REGRADES, async {
            collection
                .replace_one(
                    doc! { "usage_id": &record.usage_id, "slot": i64::from(record.slot) },
                    record,
                )
                .upsert(true)
                .await
                .context("Failed to upsert regrade record")
        })
        .await?;
        Ok(())
    }
}
