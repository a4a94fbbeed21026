//! Port implementations: MongoDB/Redis/HTTP for deployments, in-memory for tests and
//! `storage = "memory"`.

pub mod http_grader;
pub mod memory;
pub mod mongo;
pub mod redis_registry;

pub use http_grader::HttpGraderClient;
pub use memory::{
    GraderMode, MemoryAttemptStore, MemoryGradeProcessRegistry, MemoryQuestionBank,
    MemoryRegradeStore, ScriptedGrader,
};
pub use mongo::{MongoAttemptStore, MongoQuestionBank, MongoRegradeStore};
pub use redis_registry::RedisGradeProcessRegistry;
