mod common;

use axum::http::StatusCode;
use common::{assert_close, FILES_ONLY, SINGLE_TRY, THREE_TRIES};
use serde_json::json;

#[tokio::test]
async fn test_wrong_answers_use_up_every_try() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    let view = app.view(&attempt).await;
    assert_eq!(view["description"], "Tries remaining: 3");
    assert_eq!(view["expected_fields"], json!(["submit"]));

    // First try
    let submitted = app.submit(&attempt, "class Solution {}").await;
    assert_eq!(submitted["verdict"], "keep");
    assert_eq!(submitted["state"], "needs_grading");

    let request = app.grader.last_request().await.unwrap();
    assert_eq!(
        request.submission.free_texts.get("Solution.java").map(String::as_str),
        Some("class Solution {}")
    );

    let graded = app.grade_latest(&attempt, 2.0).await;
    assert_eq!(graded["verdict"], "keep");
    assert_eq!(graded["state"], "todo");
    assert_eq!(graded["step"]["behaviour_vars"]["_triesleft"], 2);
    assert_eq!(graded["step"]["behaviour_vars"]["_showGradedFeedback"], true);

    let view = app.view(&attempt).await;
    assert_eq!(view["expected_fields"], json!(["tryagain"]));
    assert_eq!(view["description"], "Tries remaining: 2");
    assert_eq!(view["tries_remaining"], 2);
    assert_eq!(view["hint"], "Check the loop bounds");
    assert_eq!(view["expected_qt_fields"], json!([]));

    // Second try
    app.try_again(&attempt).await;
    app.submit(&attempt, "class Solution { int x; }").await;
    let graded = app.grade_latest(&attempt, 3.0).await;
    assert_eq!(graded["state"], "todo");

    let view = app.view(&attempt).await;
    assert_eq!(view["tries_remaining"], 1);
    assert_eq!(view["hint"], "Start over from an empty file");
    assert_eq!(
        view["expected_qt_fields"],
        json!(["answerfilename0", "answertext0"])
    );

    // Last try is final whatever the score
    app.try_again(&attempt).await;
    app.submit(&attempt, "class Solution { int y; }").await;
    let graded = app.grade_latest(&attempt, 4.0).await;
    assert_eq!(graded["state"], "graded_partial");
    assert_close(&graded["step"]["fraction"], 0.2);

    let view = app.view(&attempt).await;
    assert_eq!(view["description"], "Partially correct");
    assert_eq!(view["expected_fields"], json!([]));
    assert_eq!(view["display"]["readonly"], true);
    assert_eq!(app.grader.requests().await.len(), 3);
}

#[tokio::test]
async fn test_right_answer_on_first_try_finalizes_without_penalty() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "class Solution { /* right */ }").await;
    let graded = app.grade_latest(&attempt, 10.0).await;

    assert_eq!(graded["state"], "graded_right");
    assert_close(&graded["step"]["fraction"], 1.0);

    let view = app.view(&attempt).await;
    assert_eq!(view["description"], "Correct");
    assert_eq!(view["right_answer"], "Iterate with three pointers");
}

#[tokio::test]
async fn test_right_answer_on_second_try_costs_one_penalty() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "wrong").await;
    app.grade_latest(&attempt, 0.0).await;
    app.try_again(&attempt).await;
    app.submit(&attempt, "right").await;
    let graded = app.grade_latest(&attempt, 10.0).await;

    assert_eq!(graded["state"], "graded_right");
    assert_close(&graded["step"]["fraction"], 0.9);
}

#[tokio::test]
async fn test_single_try_question_finalizes_first_grade() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;

    app.submit(&attempt, "print('hi')").await;
    let graded = app.grade_latest(&attempt, 3.0).await;

    assert_eq!(graded["state"], "graded_partial");
    assert_close(&graded["step"]["fraction"], 0.3);
}

#[tokio::test]
async fn test_try_again_state_only_accepts_try_again() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "wrong").await;
    app.grade_latest(&attempt, 1.0).await;

    let submitted = app.submit(&attempt, "other").await;
    assert_eq!(submitted["verdict"], "discard");
    assert_eq!(submitted["state"], "todo");

    let saved = app
        .action(
            &attempt,
            json!({ "kind": "save", "response": { "answertext0": "draft" } }),
        )
        .await;
    assert_eq!(saved["verdict"], "discard");

    let retried = app.try_again(&attempt).await;
    assert_eq!(retried["verdict"], "keep");
    assert_eq!(retried["state"], "todo");

    let view = app.view(&attempt).await;
    assert_eq!(view["expected_fields"], json!(["submit"]));
    assert!(view["hint"].is_null());

    // A second try-again outside the try-again state is ignored
    let again = app.try_again(&attempt).await;
    assert_eq!(again["verdict"], "discard");
}

#[tokio::test]
async fn test_try_again_display_is_read_only_with_feedback() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "wrong").await;
    app.grade_latest(&attempt, 5.0).await;

    let display = app.view(&attempt).await["display"].clone();
    assert_eq!(display["readonly"], true);
    assert_eq!(display["render_mode"], "try_again_read_only");
    assert_eq!(display["feedback"], true);
    assert_eq!(display["correctness"], true);
    assert_eq!(display["num_parts_correct"], true);
    assert_eq!(display["general_feedback"], false);
}

#[tokio::test]
async fn test_incomplete_submit_is_invalid_and_not_dispatched() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    let submitted = app.submit(&attempt, "   ").await;
    assert_eq!(submitted["verdict"], "keep");
    assert_eq!(submitted["state"], "invalid");
    assert!(app.grader.requests().await.is_empty());

    let view = app.view(&attempt).await;
    assert_eq!(view["description"], "Incomplete answer");
    assert_eq!(view["display"]["marks"], "max_only");
    assert_eq!(
        view["history"][1],
        "Submit: Incomplete answer"
    );

    // Nothing gradable was ever submitted
    let finished = app.finish(&attempt).await;
    assert_eq!(finished["state"], "gave_up");
    assert_close(&finished["step"]["fraction"], 0.0);
}

#[tokio::test]
async fn test_finish_while_grading_yields_zero_and_ignores_late_result() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "class Solution {}").await;
    let finished = app.finish(&attempt).await;
    assert_eq!(finished["state"], "finished");
    assert_close(&finished["step"]["fraction"], 0.0);

    let late = app.grade_latest(&attempt, 10.0).await;
    assert_eq!(late["verdict"], "discard");
    assert_eq!(late["state"], "finished");

    let view = app.view(&attempt).await;
    assert_eq!(view["state"], "finished");
    assert_close(&view["fraction"], 0.0);
}

#[tokio::test]
async fn test_finish_in_try_again_reuses_last_score() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "almost").await;
    app.grade_latest(&attempt, 4.0).await;

    let finished = app.finish(&attempt).await;
    assert_eq!(finished["verdict"], "keep");
    assert_eq!(finished["state"], "graded_partial");
    // The reused grade did not consume a new try
    assert_close(&finished["step"]["fraction"], 0.4);
    assert_eq!(app.grader.requests().await.len(), 1);

    let view = app.view(&attempt).await;
    assert_eq!(
        view["history"].as_array().unwrap().last().unwrap(),
        "Finished: The submission has already been graded. \
         The last score was reused and the question attempt was finished."
    );

    let again = app.finish(&attempt).await;
    assert_eq!(again["verdict"], "discard");
}

#[tokio::test]
async fn test_finish_after_save_sends_draft_to_grader() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    let saved = app
        .action(
            &attempt,
            json!({ "kind": "save", "response": { "answertext0": "draft code" } }),
        )
        .await;
    assert_eq!(saved["verdict"], "keep");
    assert_eq!(saved["state"], "todo");

    let finished = app.finish(&attempt).await;
    assert_eq!(finished["state"], "needs_grading");

    let request = app.grader.last_request().await.unwrap();
    assert_eq!(
        request.submission.free_texts.get("Solution.java").map(String::as_str),
        Some("draft code")
    );

    // Finish-triggered grading never opens another try
    let graded = app.grade_latest(&attempt, 6.0).await;
    assert_eq!(graded["state"], "graded_partial");
    assert_close(&graded["step"]["fraction"], 0.6);
}

#[tokio::test]
async fn test_finish_without_response_gives_up() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;

    let finished = app.finish(&attempt).await;
    assert_eq!(finished["state"], "gave_up");
    assert_close(&finished["step"]["fraction"], 0.0);
    assert!(app.grader.requests().await.is_empty());
}

#[tokio::test]
async fn test_repeated_save_is_discarded() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;
    let draft = json!({ "kind": "save", "response": { "answertext0": "x = 1" } });

    assert_eq!(app.action(&attempt, draft.clone()).await["verdict"], "keep");
    assert_eq!(app.action(&attempt, draft).await["verdict"], "discard");
}

#[tokio::test]
async fn test_manual_comment_overrides_mark() {
    let app = common::create_test_app().await;
    let attempt = app.start(SINGLE_TRY).await;

    app.submit(&attempt, "print('hi')").await;
    app.grade_latest(&attempt, 3.0).await;

    let commented = app
        .action(
            &attempt,
            json!({ "kind": "comment", "comment": "Works on the hidden tests", "mark": 8.0 }),
        )
        .await;
    assert_eq!(commented["verdict"], "keep");
    assert_eq!(commented["state"], "graded_partial");
    assert_close(&commented["step"]["fraction"], 0.8);
    assert_eq!(commented["step"]["behaviour_vars"]["_appliedFlag"], true);

    let out_of_range = app
        .action(
            &attempt,
            json!({ "kind": "comment", "comment": "Too generous", "mark": 11.0 }),
        )
        .await;
    assert_eq!(out_of_range["verdict"], "discard");

    let view = app.view(&attempt).await;
    assert_close(&view["fraction"], 0.8);
    assert_eq!(
        view["history"].as_array().unwrap().last().unwrap(),
        "Manually graded 8 with comment: Works on the hidden tests"
    );
}

#[tokio::test]
async fn test_file_uploads_reach_the_grader() {
    let app = common::create_test_app().await;
    let attempt = app.start(FILES_ONLY).await;

    let submitted = app
        .action(
            &attempt,
            json!({
                "kind": "submit",
                "files": [
                    { "filename": "Main.java", "content_ref": "blob-1", "size_bytes": 120 }
                ]
            }),
        )
        .await;
    assert_eq!(submitted["state"], "needs_grading");

    let request = app.grader.last_request().await.unwrap();
    assert_eq!(request.submission.files.len(), 1);
    assert_eq!(request.submission.files[0].filename, "Main.java");
    assert!(request.submission.free_texts.is_empty());
}

#[tokio::test]
async fn test_history_describes_each_step() {
    let app = common::create_test_app().await;
    let attempt = app.start(THREE_TRIES).await;

    app.submit(&attempt, "wrong").await;
    app.grade_latest(&attempt, 0.0).await;
    app.try_again(&attempt).await;

    let view = app.view(&attempt).await;
    assert_eq!(
        view["history"],
        json!([
            "Started",
            "Submit: The submission has been sent to the grader for grading.",
            "Graded: The submission has been graded by the grader",
            "Try again"
        ])
    );
}

#[tokio::test]
async fn test_request_errors() {
    let app = common::create_test_app().await;

    let (status, _) = app.get("/api/v1/attempts/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/api/v1/attempts",
            json!({ "usage_id": "u", "slot": 0, "question_id": THREE_TRIES, "max_mark": 10.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/attempts",
            json!({ "usage_id": "u", "slot": 1, "question_id": "missing", "max_mark": 10.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let attempt = app.start(THREE_TRIES).await;
    let actions = format!("/api/v1/attempts/{}/actions", attempt);

    let (status, _) = app.post(&actions, json!({ "kind": "start" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &actions,
            json!({ "kind": "grading_result", "grade_process_id": "gp", "score": 10.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post(&actions, json!({ "kind": "explode" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
}
