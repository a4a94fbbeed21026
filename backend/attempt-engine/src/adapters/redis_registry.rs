use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::metrics::track_store_operation;
use crate::models::GradeProcess;
use crate::ports::GradeProcessRegistry;

const COLLECTION: &str = "gradeprocess";
// A job the grader never answers expires with its key.
const GRADE_PROCESS_TTL: u64 = 24 * 3600;

fn process_key(grade_process_id: &str) -> String {
    format!("gradeprocess:{}", grade_process_id)
}

fn attempt_index_key(attempt_id: &str) -> String {
    format!("gradeprocess:attempt:{}", attempt_id)
}

/// Live grade processes in Redis. A callback is stale once its key is gone.
pub struct RedisGradeProcessRegistry {
    redis: ConnectionManager,
}

impl RedisGradeProcessRegistry {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    async fn load(&self, grade_process_id: &str) -> Result<Option<GradeProcess>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(process_key(grade_process_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read grade process")?;

        raw.map(|json| serde_json::from_str(&json).context("Corrupt grade process record"))
            .transpose()
    }
}

#[async_trait]
impl GradeProcessRegistry for RedisGradeProcessRegistry {
    async fn register(&self, attempt_id: &str, question_id: &str) -> Result<GradeProcess> {
        let process = GradeProcess {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            question_id: question_id.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&process).context("Failed to serialize grade process")?;
        let mut conn = self.redis.clone();

        track_store_operation("register", COLLECTION, async {
            let _: () = redis::pipe()
                .atomic()
                .cmd("SETEX")
                .arg(process_key(&process.id))
                .arg(GRADE_PROCESS_TTL)
                .arg(&json)
                .ignore()
                .cmd("SADD")
                .arg(attempt_index_key(attempt_id))
                .arg(&process.id)
                .ignore()
                .cmd("EXPIRE")
                .arg(attempt_index_key(attempt_id))
                .arg(GRADE_PROCESS_TTL)
                .ignore()
                .query_async(&mut conn)
                .await
                .context("Failed to register grade process")?;
            Ok(())
        })
        .await?;

        tracing::debug!(
            "Grade process registered: id={}, attempt={}",
            process.id,
            attempt_id
        );
        Ok(process)
    }

    async fn find(&self, grade_process_id: &str) -> Result<Option<GradeProcess>> {
        track_store_operation("find", COLLECTION, self.load(grade_process_id)).await
    }

    async fn live_for_attempt(&self, attempt_id: &str) -> Result<Vec<GradeProcess>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(attempt_index_key(attempt_id))
            .query_async(&mut conn)
            .await
            .context("Failed to list grade processes of attempt")?;

        let mut processes = Vec::with_capacity(ids.len());
        for id in ids {
            // Index entries outlive keys that expired on their own.
            if let Some(process) = self.load(&id).await? {
                processes.push(process);
            }
        }
        Ok(processes)
    }

    async fn release(&self, grade_process_id: &str) -> Result<()> {
        let Some(process) = self.load(grade_process_id).await? else {
            return Ok(());
        };

        let mut conn = self.redis.clone();
        track_store_operation("release", COLLECTION, async {
            let _: () = redis::pipe()
                .atomic()
                .cmd("DEL")
                .arg(process_key(grade_process_id))
                .ignore()
                .cmd("SREM")
                .arg(attempt_index_key(&process.attempt_id))
                .arg(grade_process_id)
                .ignore()
                .query_async(&mut conn)
                .await
                .context("Failed to release grade process")?;
            Ok(())
        })
        .await
    }

    async fn cancel_for_attempt(&self, attempt_id: &str) -> Result<usize> {
        let mut conn = self.redis.clone();
        let index = attempt_index_key(attempt_id);

        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&index)
            .query_async(&mut conn)
            .await
            .context("Failed to list grade processes of attempt")?;

        if ids.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = ids.iter().map(|id| process_key(id)).collect();
        track_store_operation("cancel_for_attempt", COLLECTION, async {
            let (removed,): (usize,) = redis::pipe()
                .atomic()
                .cmd("DEL")
                .arg(&keys)
                .cmd("DEL")
                .arg(&index)
                .ignore()
                .query_async(&mut conn)
                .await
                .context("Failed to cancel grade processes")?;
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }
}
