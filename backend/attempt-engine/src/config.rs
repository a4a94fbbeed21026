use serde::Deserialize;
use std::env;

use crate::utils::retry::RetryPolicy;

/// Where attempts, questions and grade processes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, config::ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            other => Err(config::ConfigError::Message(format!(
                "unknown storage backend '{}', expected 'mongo' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub storage: StorageBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: String,
    pub grader_url: String,
    pub grader_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// JSON array of question definitions preloaded into the in-memory question bank.
    pub question_seed_path: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            // Override with environment variables (prefix: APP__)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let storage = match settings
            .get_string("storage.backend")
            .or_else(|_| env::var("STORAGE_BACKEND"))
        {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Mongo,
        };

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "attempt_engine".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let grader_url = settings
            .get_string("grader.url")
            .or_else(|_| env::var("GRADER_URL"))
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let grader_timeout_secs = settings
            .get_int("grader.timeout_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(10);

        let retry = settings
            .get::<RetryPolicy>("grader.retry")
            .unwrap_or_default();

        let question_seed_path = settings
            .get_string("storage.question_seed_path")
            .or_else(|_| env::var("QUESTION_SEED_PATH"))
            .ok();

        if app_env == "prod" && storage == StorageBackend::Memory {
            return Err(config::ConfigError::Message(
                "in-memory storage is not allowed in production".to_string(),
            ));
        }

        Ok(Config {
            bind_addr,
            storage,
            mongo_uri,
            mongo_database,
            redis_uri,
            grader_url: grader_url.trim_end_matches('/').to_string(),
            grader_timeout_secs,
            retry,
            question_seed_path,
        })
    }

    /// Self-contained settings for tests and local runs without MongoDB/Redis.
    pub fn in_memory() -> Self {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            storage: StorageBackend::Memory,
            mongo_uri: String::new(),
            mongo_database: String::new(),
            redis_uri: String::new(),
            grader_url: "http://localhost:8000".to_string(),
            grader_timeout_secs: 1,
            retry: RetryPolicy::none(),
            question_seed_path: None,
        }
    }
}
