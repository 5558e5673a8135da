use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use exam_backend::{
    config::Config,
    database::MemoryStore,
    models::question::Section,
    routes,
    utils::time::{from_rfc3339, FixedClock},
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, h, m, 0).unwrap()
}

#[derive(serde::Serialize)]
struct Claims {
    sub: String,
    exp: usize,
    role: Option<String>,
    email: Option<String>,
}

fn token_for(user: Uuid, role: &str) -> String {
    let exp = (Utc::now() + Duration::hours(1)).timestamp() as usize;
    let token = encode(
        &Header::default(),
        &Claims {
            sub: user.to_string(),
            exp,
            role: Some(role.into()),
            email: Some(format!("{}@example.com", role)),
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("sign token");
    format!("Bearer {}", token)
}

struct Harness {
    app: Router,
    clock: FixedClock,
    domain_id: Uuid,
    question_ids: Vec<Uuid>,
    admin: String,
    staff: String,
    student_id: Uuid,
    student: String,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let domain = store.seed_domain("Mathematics").expect("seed domain");
    let question_ids = vec![
        store
            .seed_question(domain.id, Section::A, "Limits")
            .expect("seed question")
            .id,
        store
            .seed_question(domain.id, Section::A, "Series")
            .expect("seed question")
            .id,
    ];
    store
        .seed_question(domain.id, Section::B, "Proofs")
        .expect("seed question");

    let clock = FixedClock::new(at(9, 0));
    let state = AppState::in_memory(Config::for_tests(SECRET), store, Arc::new(clock.clone()));
    let student_id = Uuid::new_v4();

    Harness {
        app: routes::router(state),
        clock,
        domain_id: domain.id,
        question_ids,
        admin: token_for(Uuid::new_v4(), "admin"),
        staff: token_for(Uuid::new_v4(), "staff"),
        student_id,
        student: token_for(student_id, "student"),
    }
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

fn timestamp(value: &JsonValue) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|s| from_rfc3339(s).ok())
        .expect("rfc3339 timestamp")
}

async fn create_midterm(h: &Harness) -> Uuid {
    let (status, body) = call(
        &h.app,
        "POST",
        "/tests",
        Some(&h.admin),
        Some(json!({
            "title": " Midterm ",
            "domains": [h.domain_id],
            "startDate": "2026-05-04T10:00:00Z",
            "endDate": "2026-05-04T12:00:00Z",
            "durationMinutes": 30
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["title"], "Midterm");
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["domains"][0]["name"], "Mathematics");
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn exam_lifecycle_end_to_end() {
    let h = harness();
    let test_id = create_midterm(&h).await;

    let (status, body) = call(
        &h.app,
        "POST",
        "/tests",
        Some(&h.admin),
        Some(json!({
            "title": "Midterm",
            "domains": [h.domain_id],
            "startDate": "2026-05-04T10:00:00Z",
            "endDate": "2026-05-04T12:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_title");

    // too early
    let start_body = json!({ "domainId": h.domain_id, "section": "A" });
    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/start", test_id),
        Some(&h.student),
        Some(start_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "test_not_active");

    h.clock.set(at(10, 5));
    let (status, board) = call(&h.app, "GET", "/tests/student", Some(&h.student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["active"].as_array().unwrap().len(), 1);

    let (status, started) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/start", test_id),
        Some(&h.student),
        Some(start_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(timestamp(&started["attempt"]["dueTime"]), at(10, 35));
    assert_eq!(started["attempt"]["status"], "in-progress");
    assert_eq!(started["questions"].as_array().unwrap().len(), 2);

    h.clock.set(at(10, 15));
    let (status, again) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/start", test_id),
        Some(&h.student),
        Some(start_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["attempt"]["startTime"], started["attempt"]["startTime"]);
    assert_eq!(again["attempt"]["dueTime"], started["attempt"]["dueTime"]);

    h.clock.set(at(10, 20));
    let answer_body = json!({
        "questionId": h.question_ids[0],
        "domainId": h.domain_id,
        "section": "A",
        "answerText": "the limit is 1",
        "testId": test_id
    });
    let (status, saved) = call(
        &h.app,
        "POST",
        "/answers/submit",
        Some(&h.student),
        Some(answer_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", saved);
    let answer_id = saved["answer"]["id"].as_str().unwrap().to_string();
    assert_eq!(timestamp(&saved["answer"]["examEndTime"]), at(10, 35));

    h.clock.set(at(10, 40));
    let (status, body) = call(
        &h.app,
        "POST",
        "/answers/submit",
        Some(&h.student),
        Some(answer_body),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["examExpired"], true);

    // dropping testId does not buy a fresh window for the same question
    let (status, body) = call(
        &h.app,
        "POST",
        "/answers/submit",
        Some(&h.student),
        Some(json!({
            "questionId": h.question_ids[0],
            "domainId": h.domain_id,
            "section": "A",
            "answerText": "late rewrite",
            "examStartTime": "2026-05-04T10:40:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["examExpired"], true);

    let (status, body) = call(
        &h.app,
        "POST",
        "/answers/submit",
        Some(&h.student),
        Some(json!({
            "questionId": h.question_ids[1],
            "domainId": h.domain_id,
            "section": "A",
            "answerText": "x",
            "testId": Uuid::new_v4(),
            "examStartTime": "2026-05-04T10:40:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, submitted) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/submit", test_id),
        Some(&h.student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["attempt"]["status"], "expired");

    h.clock.set(at(10, 45));
    let (_, resubmitted) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/submit", test_id),
        Some(&h.student),
        None,
    )
    .await;
    assert_eq!(resubmitted["attempt"]["endTime"], submitted["attempt"]["endTime"]);

    let (status, body) = call(
        &h.app,
        "POST",
        &format!("/tests/{}/start", test_id),
        Some(&h.student),
        Some(start_body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_completed");

    let (status, _) = call(
        &h.app,
        "POST",
        "/answers/marks/add",
        Some(&h.staff),
        Some(json!({ "answerId": answer_id, "mark": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(
        &h.app,
        "POST",
        "/answers/marks/add",
        Some(&h.staff),
        Some(json!({ "answerId": answer_id, "mark": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "mark_already_set");

    let (status, total) = call(
        &h.app,
        "POST",
        "/answers/calculate-total",
        Some(&h.staff),
        Some(json!({ "studentId": h.student_id, "domainId": h.domain_id, "testId": test_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(total["totalMarks"].as_f64(), Some(5.0));
    assert_eq!(total["persisted"], true);

    let (_, mine) = call(&h.app, "GET", "/tests/student/my-tests", Some(&h.student), None).await;
    assert_eq!(mine["completed"][0]["score"].as_f64(), Some(5.0));

    let (status, deleted) = call(
        &h.app,
        "DELETE",
        &format!("/tests/{}", test_id),
        Some(&h.admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["attemptsRemoved"], 1);
    assert_eq!(deleted["answersRemoved"], 1);

    let (status, body) = call(
        &h.app,
        "GET",
        &format!("/tests/{}", test_id),
        Some(&h.student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn practice_session_window_and_image_cleanup() {
    let h = harness();
    h.clock.set(at(9, 30));

    let (status, window) = call(
        &h.app,
        "POST",
        "/answers/start-exam",
        Some(&h.student),
        Some(json!({ "domainId": h.domain_id, "section": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(window["resumed"], false);
    assert_eq!(window["timeRemaining"], Duration::minutes(120).num_milliseconds());

    let url = "https://res.cloudinary.com/demo/image/upload/v1/exam-answers/graph.png";
    let (status, saved) = call(
        &h.app,
        "POST",
        "/answers/submit",
        Some(&h.student),
        Some(json!({
            "questionId": h.question_ids[1],
            "domainId": h.domain_id,
            "section": "A",
            "examStartTime": window["examStartTime"],
            "answerText": format!("see\n<img src=\"{}\">\n\n\nabove", url)
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", saved);
    let answer_id = saved["answer"]["id"].as_str().unwrap().to_string();

    h.clock.set(at(10, 0));
    let (_, status_body) = call(
        &h.app,
        "GET",
        &format!("/answers/exam-status/{}/a", h.domain_id),
        Some(&h.student),
        None,
    )
    .await;
    assert_eq!(status_body["hasStarted"], true);
    assert_eq!(status_body["hasExpired"], false);
    assert_eq!(status_body["timeRemaining"], Duration::minutes(90).num_milliseconds());

    let (status, resumed) = call(
        &h.app,
        "POST",
        "/answers/start-exam",
        Some(&h.student),
        Some(json!({ "domainId": h.domain_id, "section": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["resumed"], true);
    assert_eq!(resumed["examStartTime"], window["examStartTime"]);

    let (status, cleaned) = call(
        &h.app,
        "DELETE",
        &format!("/answers/{}/image", answer_id),
        Some(&h.staff),
        Some(json!({ "imageUrl": url })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleaned["answer"]["answerText"], "see\n\nabove");

    let (_, mine) = call(
        &h.app,
        "GET",
        &format!("/answers/my-answers/{}/A", h.domain_id),
        Some(&h.student),
        None,
    )
    .await;
    assert_eq!(mine["answers"].as_array().unwrap().len(), 1);

    let (status, _) = call(
        &h.app,
        "DELETE",
        &format!("/answers/{}", answer_id),
        Some(&h.staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, mine) = call(
        &h.app,
        "GET",
        &format!("/answers/my-answers/{}/A", h.domain_id),
        Some(&h.student),
        None,
    )
    .await;
    assert!(mine["answers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_edits_and_title_checks() {
    let h = harness();
    let test_id = create_midterm(&h).await;

    let (_, exists) = call(
        &h.app,
        "GET",
        "/tests/check-title/Midterm",
        Some(&h.admin),
        None,
    )
    .await;
    assert_eq!(exists["exists"], true);

    let (status, body) = call(
        &h.app,
        "PUT",
        &format!("/tests/{}", test_id),
        Some(&h.admin),
        Some(json!({ "endDate": "2026-05-04T09:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_window");

    let (status, body) = call(
        &h.app,
        "PUT",
        &format!("/tests/{}", test_id),
        Some(&h.admin),
        Some(json!({ "title": "Midterm (rescheduled)", "durationMinutes": 45 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Midterm (rescheduled)");
    assert_eq!(body["durationMinutes"], 45);

    let (status, list) = call(&h.app, "GET", "/tests", Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}
