//! In-process adapters. Nothing survives a restart.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::grading::{DispatchReceipt, GradingRequest};
use crate::models::{Attempt, GradeProcess, QuestionDefinition, RegradeRecord, Step};
use crate::ports::{AttemptStore, GradeProcessRegistry, GraderClient, QuestionBank, RegradeStore};

#[derive(Default)]
pub struct MemoryQuestionBank {
    questions: RwLock<HashMap<String, QuestionDefinition>>,
}

impl MemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: impl IntoIterator<Item = QuestionDefinition>) -> Self {
        Self {
            questions: RwLock::new(questions.into_iter().map(|q| (q.id.clone(), q)).collect()),
        }
    }

    pub async fn insert(&self, question: QuestionDefinition) {
        self.questions
            .write()
            .await
            .insert(question.id.clone(), question);
    }
}

#[async_trait]
impl QuestionBank for MemoryQuestionBank {
    async fn find(&self, question_id: &str) -> Result<Option<QuestionDefinition>> {
        Ok(self.questions.read().await.get(question_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    attempts: RwLock<HashMap<String, Attempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn insert(&self, attempt: &Attempt) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&attempt.id) {
            anyhow::bail!("Attempt {} already exists", attempt.id);
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>> {
        Ok(self.attempts.read().await.get(attempt_id).cloned())
    }

    async fn append_step(&self, attempt_id: &str, step: &Step) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| anyhow::anyhow!("Attempt {} not found", attempt_id))?;
        attempt.steps.push(step.clone());
        Ok(())
    }

    async fn replace_steps(&self, attempt_id: &str, steps: &[Step]) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| anyhow::anyhow!("Attempt {} not found", attempt_id))?;
        attempt.steps = steps.to_vec();
        Ok(())
    }
}

#[derive(Default)]
struct RegistryState {
    processes: HashMap<String, GradeProcess>,
    by_attempt: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct MemoryGradeProcessRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryGradeProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn live_count(&self, attempt_id: &str) -> usize {
        self.state
            .lock()
            .await
            .by_attempt
            .get(attempt_id)
            .map_or(0, HashSet::len)
    }
}

#[async_trait]
impl GradeProcessRegistry for MemoryGradeProcessRegistry {
    async fn register(&self, attempt_id: &str, question_id: &str) -> Result<GradeProcess> {
        let process = GradeProcess {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            question_id: question_id.to_string(),
            created_at: Utc::now(),
        };

        let mut state = self.state.lock().await;
        state
            .by_attempt
            .entry(attempt_id.to_string())
            .or_default()
            .insert(process.id.clone());
        state.processes.insert(process.id.clone(), process.clone());
        Ok(process)
    }

    async fn find(&self, grade_process_id: &str) -> Result<Option<GradeProcess>> {
        Ok(self
            .state
            .lock()
            .await
            .processes
            .get(grade_process_id)
            .cloned())
    }

    async fn live_for_attempt(&self, attempt_id: &str) -> Result<Vec<GradeProcess>> {
        let state = self.state.lock().await;
        Ok(state
            .by_attempt
            .get(attempt_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.processes.get(id).cloned())
            .collect())
    }

    async fn release(&self, grade_process_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(process) = state.processes.remove(grade_process_id) {
            if let Some(ids) = state.by_attempt.get_mut(&process.attempt_id) {
                ids.remove(grade_process_id);
            }
        }
        Ok(())
    }

    async fn cancel_for_attempt(&self, attempt_id: &str) -> Result<usize> {
        let mut state = self.state.lock().await;
        let ids = state.by_attempt.remove(attempt_id).unwrap_or_default();
        let removed = ids
            .iter()
            .filter(|id| state.processes.remove(id.as_str()).is_some())
            .count();
        Ok(removed)
    }
}

#[derive(Default)]
pub struct MemoryRegradeStore {
    records: RwLock<HashMap<(String, u32), RegradeRecord>>,
}

impl MemoryRegradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegradeStore for MemoryRegradeStore {
    async fn find(&self, usage_id: &str, slot: u32) -> Result<Option<RegradeRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(usage_id.to_string(), slot))
            .cloned())
    }

    async fn update_fraction(&self, usage_id: &str, slot: u32, fraction: f64) -> Result<()> {
        if let Some(record) = self
            .records
            .write()
            .await
            .get_mut(&(usage_id.to_string(), slot))
        {
            record.new_fraction = Some(fraction);
        }
        Ok(())
    }

    async fn record_estimate(&self, record: &RegradeRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert((record.usage_id.clone(), record.slot), record.clone());
        Ok(())
    }
}

/// How [`ScriptedGrader`] answers dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraderMode {
    Accept,
    Reject,
    Fail,
}

/// Grader stand-in that records every request. Scores are delivered separately through
/// the callback endpoint, as with the real grader.
pub struct ScriptedGrader {
    mode: Mutex<GraderMode>,
    requests: Mutex<Vec<GradingRequest>>,
}

impl Default for ScriptedGrader {
    fn default() -> Self {
        Self {
            mode: Mutex::new(GraderMode::Accept),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedGrader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_mode(&self, mode: GraderMode) {
        *self.mode.lock().await = mode;
    }

    pub async fn requests(&self) -> Vec<GradingRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn last_request(&self) -> Option<GradingRequest> {
        self.requests.lock().await.last().cloned()
    }
}

#[async_trait]
impl GraderClient for ScriptedGrader {
    async fn submit(&self, request: &GradingRequest) -> Result<DispatchReceipt> {
        self.requests.lock().await.push(request.clone());
        match *self.mode.lock().await {
            GraderMode::Accept => Ok(DispatchReceipt {
                accepted: true,
                job_id: Some(format!("job-{}", request.grade_process_id)),
            }),
            GraderMode::Reject => Ok(DispatchReceipt {
                accepted: false,
                job_id: None,
            }),
            GraderMode::Fail => anyhow::bail!("grader connection refused"),
        }
    }
}
