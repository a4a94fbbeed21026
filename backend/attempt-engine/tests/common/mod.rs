#![allow(dead_code)]

use attempt_engine::{
    adapters::{
        MemoryAttemptStore, MemoryGradeProcessRegistry, MemoryQuestionBank, MemoryRegradeStore,
        ScriptedGrader,
    },
    config::Config,
    create_router,
    models::{FreeTextField, Hint, QuestionDefinition},
    services::{AppState, EnginePorts},
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Three tries: two hints, 0.1 penalty per used try.
pub const THREE_TRIES: &str = "q-three-tries";
/// One try, no hints.
pub const SINGLE_TRY: &str = "q-single-try";
/// File uploads only.
pub const FILES_ONLY: &str = "q-files-only";

pub struct TestApp {
    pub router: Router,
    pub grader: Arc<ScriptedGrader>,
    pub registry: Arc<MemoryGradeProcessRegistry>,
    pub regrades: Arc<MemoryRegradeStore>,
}

pub async fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let grader = Arc::new(ScriptedGrader::new());
    let registry = Arc::new(MemoryGradeProcessRegistry::new());
    let regrades = Arc::new(MemoryRegradeStore::new());

    let ports = EnginePorts {
        questions: Arc::new(MemoryQuestionBank::with_questions(seed_questions())),
        attempts: Arc::new(MemoryAttemptStore::new()),
        registry: registry.clone(),
        regrades: regrades.clone(),
    };

    let app_state = Arc::new(AppState::with_ports(
        Config::in_memory(),
        ports,
        grader.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        grader,
        registry,
        regrades,
    }
}

fn seed_questions() -> Vec<QuestionDefinition> {
    vec![
        QuestionDefinition {
            id: THREE_TRIES.to_string(),
            name: "Reverse a linked list".to_string(),
            penalty: 0.1,
            hints: vec![
                Hint {
                    text: "Check the loop bounds".to_string(),
                    clear_wrong: false,
                    show_num_parts_correct: true,
                    reveal_right_answer: false,
                },
                Hint {
                    text: "Start over from an empty file".to_string(),
                    clear_wrong: true,
                    show_num_parts_correct: false,
                    reveal_right_answer: true,
                },
            ],
            enable_file_submissions: false,
            enable_free_text_submissions: true,
            free_text_max_fields: 1,
            free_text_autogenerate_filenames: false,
            free_text_fields: vec![FreeTextField {
                input_index: 0,
                preset_filename: Some("Solution.java".to_string()),
            }],
            right_answer_summary: Some("Iterate with three pointers".to_string()),
        },
        QuestionDefinition {
            id: SINGLE_TRY.to_string(),
            name: "Hello world".to_string(),
            penalty: 0.2,
            hints: Vec::new(),
            enable_file_submissions: false,
            enable_free_text_submissions: true,
            free_text_max_fields: 2,
            free_text_autogenerate_filenames: true,
            free_text_fields: Vec::new(),
            right_answer_summary: None,
        },
        QuestionDefinition {
            id: FILES_ONLY.to_string(),
            name: "Upload a project".to_string(),
            penalty: 0.0,
            hints: vec![Hint::default()],
            enable_file_submissions: true,
            enable_free_text_submissions: false,
            free_text_max_fields: 0,
            free_text_autogenerate_filenames: false,
            free_text_fields: Vec::new(),
            right_answer_summary: None,
        },
    ]
}

impl TestApp {
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read(response).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read(response).await
    }

    /// Starts an attempt with max mark 10 and returns its id.
    pub async fn start(&self, question_id: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/attempts",
                json!({
                    "usage_id": format!("usage-{}", uuid::Uuid::new_v4()),
                    "slot": 1,
                    "question_id": question_id,
                    "max_mark": 10.0
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["_id"].as_str().unwrap().to_string()
    }

    pub async fn action(&self, attempt_id: &str, body: Value) -> Value {
        let (status, body) = self
            .post(&format!("/api/v1/attempts/{}/actions", attempt_id), body)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    pub async fn submit(&self, attempt_id: &str, code: &str) -> Value {
        self.action(
            attempt_id,
            json!({ "kind": "submit", "response": { "answertext0": code } }),
        )
        .await
    }

    pub async fn try_again(&self, attempt_id: &str) -> Value {
        self.action(attempt_id, json!({ "kind": "try_again" })).await
    }

    pub async fn finish(&self, attempt_id: &str) -> Value {
        self.action(attempt_id, json!({ "kind": "finish" })).await
    }

    /// Id of the grade process created by the latest dispatch.
    pub async fn last_grade_process(&self) -> String {
        self.grader
            .last_request()
            .await
            .expect("no submission was dispatched")
            .grade_process_id
    }

    pub async fn deliver_score(&self, attempt_id: &str, grade_process_id: &str, score: f64) -> Value {
        let (status, body) = self
            .post(
                "/api/v1/grader/callback",
                json!({
                    "attempt_id": attempt_id,
                    "grade_process_id": grade_process_id,
                    "outcome": "graded",
                    "score": score
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    /// Grades the latest dispatch with `score` out of 10.
    pub async fn grade_latest(&self, attempt_id: &str, score: f64) -> Value {
        let grade_process_id = self.last_grade_process().await;
        self.deliver_score(attempt_id, &grade_process_id, score).await
    }

    pub async fn view(&self, attempt_id: &str) -> Value {
        let (status, body) = self.get(&format!("/api/v1/attempts/{}", attempt_id)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).to_string()));
    (status, value)
}

pub fn assert_close(actual: &Value, expected: f64) {
    let actual = actual.as_f64().unwrap_or_else(|| panic!("not a number: {}", actual));
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
