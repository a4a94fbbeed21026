mod common;

use attempt_engine::ports::RegradeStore;
use axum::http::StatusCode;
use common::{assert_close, SINGLE_TRY, THREE_TRIES};
use serde_json::{json, Value};

async fn regrade(app: &common::TestApp, attempt_id: &str) -> Value {
    let (status, body) = app
        .post(&format!("/api/v1/attempts/{}/regrade", attempt_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn test_regrade_of_reused_score_waits_for_new_result() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "almost").await;
    app.grade_latest(&attempt, 4.0).await;
    app.finish(&attempt).await;

    let record = regrade(&app, &attempt).await;
    assert_eq!(record["attempt_id"], attempt.as_str());
    assert_close(&record["old_fraction"], 0.4);
    // Replayed finish lands while the replayed submit is still with the grader
    assert_close(&record["new_fraction"], 0.0);
    assert_eq!(app.grader.requests().await.len(), 2);
    assert_eq!(
        record["awaited_grade_process_id"],
        app.last_grade_process().await.as_str()
    );

    let view = app.view(&attempt).await;
    assert_eq!(view["state"], "finished");

    let graded = app.grade_latest(&attempt, 8.0).await;
    assert_eq!(graded["verdict"], "keep");
    assert_eq!(graded["state"], "graded_partial");
    assert_close(&graded["step"]["fraction"], 0.8);

    let usage_id = record["usage_id"].as_str().unwrap();
    let stored = app.regrades.find(usage_id, 1).await.unwrap().unwrap();
    assert_eq!(stored.old_fraction, Some(0.4));
    assert_eq!(stored.new_fraction, Some(0.8));
}

#[tokio::test]
async fn test_regrade_drops_applied_comments() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;

    app.submit(&attempt, "print(1)").await;
    app.grade_latest(&attempt, 3.0).await;
    app.action(
        &attempt,
        json!({ "kind": "comment", "comment": "Hidden tests pass", "mark": 8.0 }),
    )
    .await;

    let record = regrade(&app, &attempt).await;
    assert_close(&record["old_fraction"], 0.8);
    assert!(record["new_fraction"].is_null());

    let view = app.view(&attempt).await;
    assert_eq!(view["state"], "needs_grading");
    assert_eq!(
        view["history"],
        json!([
            "Started",
            "Submit: The submission has been sent to the grader for grading."
        ])
    );

    let graded = app.grade_latest(&attempt, 7.0).await;
    assert_eq!(graded["state"], "graded_partial");
    assert_close(&graded["step"]["fraction"], 0.7);

    let usage_id = record["usage_id"].as_str().unwrap();
    let stored = app.regrades.find(usage_id, 1).await.unwrap().unwrap();
    assert_eq!(stored.new_fraction, Some(0.7));
}

#[tokio::test]
async fn test_regrade_makes_in_flight_result_stale() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "class Solution {}").await;
    let before = app.last_grade_process().await;

    regrade(&app, &attempt).await;
    let after = app.last_grade_process().await;
    assert_ne!(before, after);
    assert_eq!(app.registry.live_count(&attempt).await, 1);

    let stale = app.deliver_score(&attempt, &before, 10.0).await;
    assert_eq!(stale["verdict"], "discard");

    let fresh = app.deliver_score(&attempt, &after, 10.0).await;
    assert_eq!(fresh["verdict"], "keep");
    assert_eq!(fresh["state"], "graded_right");
}

#[tokio::test]
async fn test_late_result_without_regrade_cannot_reopen_finished_attempt() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;

    app.submit(&attempt, "print(1)").await;
    let grade_process = app.last_grade_process().await;
    app.finish(&attempt).await;

    let late = app.deliver_score(&attempt, &grade_process, 10.0).await;
    assert_eq!(late["verdict"], "discard");

    let view = app.view(&attempt).await;
    assert_eq!(view["state"], "finished");
    assert_close(&view["fraction"], 0.0);
}

#[tokio::test]
async fn test_finish_while_grading_stays_final_after_earlier_regrade() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    let record = regrade(&app, &attempt).await;
    assert!(record["awaited_grade_process_id"].is_null());

    app.submit(&attempt, "class Solution {}").await;
    let finished = app.finish(&attempt).await;
    assert_eq!(finished["state"], "finished");

    let late = app.grade_latest(&attempt, 10.0).await;
    assert_eq!(late["verdict"], "discard");

    let view = app.view(&attempt).await;
    assert_eq!(view["state"], "finished");
    assert_close(&view["fraction"], 0.0);
}

#[tokio::test]
async fn test_regrade_unknown_attempt() {
    let app = common::create_test_app().await;
    let (status, _) = app
        .post("/api/v1/attempts/missing/regrade", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
