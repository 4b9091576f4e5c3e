use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use unitpath_backends::MemoryStore;
use unitpath_core::engine::{EngineConfig, LearningEngine};
use unitpath_core::parser::parse_catalog_str;
use unitpath_server::build_router;

const CATALOG: &str = r#"
[[tracks]]
subject_code = "math"
grade = 3
name = "Math 3"

[[tracks.units]]
id = "a"
name = "Counting"
[[tracks.units.exercises]]
id = "a1"
kind = "choice"
prompt = "1 + 0 = ?"
options = ["0", "1", "2"]
correct_answer = 1
[[tracks.units.exercises]]
id = "a2"
kind = "fill_blank"
prompt = "Two plus two is ___."
correct_answer = [["four", "4"]]

[[tracks.units]]
id = "b"
name = "Adding"
[[tracks.units.exercises]]
id = "b1"
kind = "choice"
prompt = "2 - 1 = ?"
options = ["0", "1", "2"]
correct_answer = 1

[[tracks.units]]
id = "c"
name = "Subtracting"
[[tracks.units.exercises]]
id = "c1"
kind = "choice"
prompt = "1 x 1 = ?"
options = ["0", "1", "2"]
correct_answer = 1

[[tracks]]
subject_code = "words"
grade = 3
name = "Words 3"

[[tracks.units]]
id = "w"
name = "Opposites"
[[tracks.units.exercises]]
id = "w1"
kind = "matching"
prompt = "Match each word to its opposite"
correct_answer = { "0" = 2, "1" = 0, "2" = 1 }
"#;

fn app() -> Router {
    let catalog = parse_catalog_str(CATALOG, Path::new("fixture.toml")).unwrap();
    let engine = LearningEngine::new(
        Arc::new(catalog),
        Arc::new(MemoryStore::new()),
        EngineConfig::default(),
    );
    build_router(Arc::new(engine))
}

async fn call(app: &Router, method: &str, uri: &str, session: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-student-id", "s1")
        .header("x-session-id", session);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_needs_no_identity() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["store"], "memory");
    assert_eq!(body["data"]["content"], "catalog");
}

#[tokio::test]
async fn retry_flow_over_http() {
    let app = app();
    let (status, first) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "a1",
            "unitId": "a",
            "answer": {"type": "choice", "selected": 0}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["isCorrect"], false);
    assert_eq!(first["data"]["durable"], false);
    assert_eq!(first["data"]["feedback"], "retry_prompt");

    let (_, second) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "a1",
            "unitId": "a",
            "answer": {"type": "choice", "selected": 1},
            "attempt": first["data"]["attempt"].clone()
        })),
    )
    .await;
    assert_eq!(second["data"]["isCorrect"], true);
    assert_eq!(second["data"]["durable"], true);
    assert_eq!(second["data"]["completedExercises"], 1);

    let (status, progress) = call(&app, "GET", "/api/units/a/progress", "sess-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["data"]["completedExercises"], 1);
    assert_eq!(progress["data"]["totalExercises"], 2);
}

#[tokio::test]
async fn fill_blank_and_skip() {
    let app = app();
    let (_, answer) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "a2",
            "unitId": "a",
            "answer": {"type": "fill_blank", "blanks": ["  FOUR "]}
        })),
    )
    .await;
    assert_eq!(answer["data"]["isCorrect"], true);

    let (_, skipped) = call(
        &app,
        "POST",
        "/api/answers/skip",
        "sess-1",
        Some(json!({"exerciseId": "a1", "unitId": "a"})),
    )
    .await;
    assert_eq!(skipped["data"]["isCorrect"], false);
    assert_eq!(skipped["data"]["incorrectCount"], 1);
}

#[tokio::test]
async fn unknown_unit_is_404_with_envelope() {
    let app = app();
    let (status, body) = call(&app, "GET", "/api/units/zzz/progress", "sess-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("zzz"));
}

#[tokio::test]
async fn business_failures_are_200() {
    let app = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/units/batch-unlock",
        "no-test",
        Some(json!({"unitIds": ["a"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("unlock rejected"));
}

#[tokio::test]
async fn malformed_body_is_a_failure_envelope() {
    let app = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({"exerciseId": "a1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn missing_student_header_is_a_failure_envelope() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/units/a/progress")
                .header("x-session-id", "sess-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("x-student-id"));
}

#[tokio::test]
async fn wrong_answer_shape_is_graded_incorrect() {
    let app = app();
    let (status, first) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "a1",
            "unitId": "a",
            "answer": {"type": "choice", "selected": "one"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["isCorrect"], false);
    assert_eq!(first["data"]["durable"], false);
    assert_eq!(first["data"]["feedback"], "retry_prompt");

    let (_, second) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "a1",
            "unitId": "a",
            "answer": {"type": "fill_blank", "blanks": ["1"]},
            "attempt": first["data"]["attempt"].clone()
        })),
    )
    .await;
    assert_eq!(second["data"]["isCorrect"], false);
    assert_eq!(second["data"]["durable"], true);
    assert_eq!(second["data"]["incorrectCount"], 1);
}

#[tokio::test]
async fn matching_answer_over_http() {
    let app = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/answers",
        "sess-1",
        Some(json!({
            "exerciseId": "w1",
            "unitId": "w",
            "answer": {"type": "matching", "pairs": {"0": 2, "1": 0, "2": 1}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["isCorrect"], true);
    assert_eq!(body["data"]["unitCompleted"], true);

    let (_, progress) = call(&app, "GET", "/api/units/w/progress", "sess-1", None).await;
    assert_eq!(progress["data"]["completedExercises"], 1);
    assert_eq!(progress["data"]["stars"], 3);
}

#[tokio::test]
async fn replayed_submission_is_recorded_once() {
    let app = app();
    let request = json!({
        "exerciseId": "a1",
        "unitId": "a",
        "answer": {"type": "choice", "selected": 1},
        "requestId": "7d0c6a8e-3a41-4b52-9a7e-0f3a2c1d5b6e"
    });
    let (_, first) = call(&app, "POST", "/api/answers", "sess-1", Some(request.clone())).await;
    let (_, again) = call(&app, "POST", "/api/answers", "sess-1", Some(request)).await;
    assert_eq!(first["data"]["recordId"], again["data"]["recordId"]);
    assert_eq!(again["data"]["totalAnswers"], 1);
    assert_eq!(again["data"]["pointsAwarded"], first["data"]["pointsAwarded"]);
}

#[tokio::test]
async fn placement_flow_over_http() {
    let app = app();
    let (_, started) = call(
        &app,
        "POST",
        "/api/placement",
        "placement-1",
        Some(json!({
            "subjectCode": "math",
            "grade": 3,
            "startUnitId": "a",
            "targetUnitId": "c"
        })),
    )
    .await;
    assert_eq!(started["success"], true);
    assert_eq!(started["data"]["planId"], "placement-1");
    assert_eq!(started["data"]["total"], 3);

    let mut current = started["data"]["current"].clone();
    let mut first = true;
    while !current.is_null() {
        let pick = if first { 1 } else { 0 };
        first = false;
        let (_, view) = call(
            &app,
            "POST",
            "/api/placement/placement-1/answers",
            "placement-1",
            Some(json!({
                "exerciseId": current["exerciseId"].clone(),
                "answer": {"type": "choice", "selected": pick}
            })),
        )
        .await;
        assert_eq!(view["success"], true);
        current = view["data"]["current"].clone();
    }

    let (_, finished) = call(
        &app,
        "POST",
        "/api/placement/placement-1/finish",
        "placement-1",
        None,
    )
    .await;
    assert_eq!(finished["data"]["passed"], true);
    assert_eq!(finished["data"]["unlocked"], json!(["a", "b"]));

    let (_, access) = call(&app, "GET", "/api/tracks/math/access?grade=3", "any", None).await;
    let open: Vec<bool> = access["data"]["units"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["accessible"].as_bool().unwrap())
        .collect();
    assert_eq!(open, [true, true, true]);
}
