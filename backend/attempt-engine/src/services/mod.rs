use anyhow::Context;
use std::sync::Arc;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::adapters::{
    HttpGraderClient, MemoryAttemptStore, MemoryGradeProcessRegistry, MemoryQuestionBank,
    MemoryRegradeStore, MongoAttemptStore, MongoQuestionBank, MongoRegradeStore,
    RedisGradeProcessRegistry,
};
use crate::config::{Config, StorageBackend};
use crate::models::QuestionDefinition;
use crate::ports::GraderClient;

pub mod attempt_service;
pub mod grading_dispatcher;
pub mod response_assembler;

pub use attempt_service::{AttemptService, EnginePorts};
pub use grading_dispatcher::GradingDispatcher;

pub struct AppState {
    pub config: Config,
    pub ports: EnginePorts,
    pub attempts: AttemptService,
}

impl AppState {
    /// Wires the production adapters selected by `config.storage`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let grader: Arc<dyn GraderClient> = Arc::new(HttpGraderClient::new(
            &config.grader_url,
            config.grader_timeout_secs,
        )?);

        let ports = match config.storage {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, attempts are lost on restart");
                let mut ports = Self::memory_ports();
                if let Some(path) = &config.question_seed_path {
                    let questions = load_question_seed(path).await?;
                    tracing::info!("Seeded {} question(s) from {}", questions.len(), path);
                    ports.questions = Arc::new(MemoryQuestionBank::with_questions(questions));
                }
                ports
            }
            StorageBackend::Mongo => Self::connect(&config).await?,
        };

        Ok(Self::with_ports(config, ports, grader))
    }

    pub fn with_ports(config: Config, ports: EnginePorts, grader: Arc<dyn GraderClient>) -> Self {
        let dispatcher = Arc::new(GradingDispatcher::new(
            ports.registry.clone(),
            grader,
            config.retry.clone(),
        ));
        let attempts = AttemptService::new(ports.clone(), dispatcher);

        Self {
            config,
            ports,
            attempts,
        }
    }

    pub fn memory_ports() -> EnginePorts {
        EnginePorts {
            questions: Arc::new(MemoryQuestionBank::new()),
            attempts: Arc::new(MemoryAttemptStore::new()),
            registry: Arc::new(MemoryGradeProcessRegistry::new()),
            regrades: Arc::new(MemoryRegradeStore::new()),
        }
    }

    async fn connect(config: &Config) -> anyhow::Result<EnginePorts> {
        tracing::info!("Connecting to MongoDB...");
        let mongo_client = MongoClient::with_uri_str(&config.mongo_uri).await?;
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");
        let redis_client = redis::Client::open(config.redis_uri.as_str())?;

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(EnginePorts {
            questions: Arc::new(MongoQuestionBank::new(mongo.clone())),
            attempts: Arc::new(MongoAttemptStore::new(mongo.clone(), config.retry.clone())),
            registry: Arc::new(RedisGradeProcessRegistry::new(redis)),
            regrades: Arc::new(MongoRegradeStore::new(mongo)),
        })
    }
}

async fn load_question_seed(path: &str) -> anyhow::Result<Vec<QuestionDefinition>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read question seed {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid question seed {}", path))
}
