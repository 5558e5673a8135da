use crate::{
    dto::test_dto::{
        CreateTestPayload, DeleteTestResponse, StartTestPayload, StartTestResponse,
        SubmitTestResponse, TitleCheckResponse, UpdateTestPayload,
    },
    error::Result,
    models::user::Identity,
    services::notification_service,
    utils::time::{remaining_millis, to_rfc3339},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let now = state.clock.now();
    let test = state.test_service.create_test(payload, now).await?;
    tracing::debug!(admin_id = %identity.user_id, test_id = %test.id, "create test handled");
    let view = state.test_service.describe(test, now).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[axum::debug_handler]
pub async fn list_tests(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let tests = state.test_service.list_tests().await?;
    Ok(Json(state.test_service.describe_all(tests, now).await?))
}

#[axum::debug_handler]
pub async fn check_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Result<impl IntoResponse> {
    let exists = state.test_service.title_exists(&title).await?;
    Ok(Json(TitleCheckResponse { exists }))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let test = state.test_service.get_test(id).await?;
    Ok(Json(state.test_service.describe(test, now).await?))
}

#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let now = state.clock.now();
    let test = state.test_service.update_test(id, payload, now).await?;
    Ok(Json(state.test_service.describe(test, now).await?))
}

#[axum::debug_handler]
pub async fn delete_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let summary = state.test_service.delete_test(id).await?;
    Ok(Json(DeleteTestResponse {
        message: "Test deleted successfully".to_string(),
        attempts_removed: summary.attempts_removed,
        answers_removed: summary.answers_removed,
    }))
}

#[axum::debug_handler]
pub async fn student_tests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let board = state
        .test_service
        .list_for_student(identity.user_id, now)
        .await?;
    Ok(Json(board))
}

#[axum::debug_handler]
pub async fn my_tests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    Ok(Json(state.test_service.my_tests(identity.user_id, now).await?))
}

#[axum::debug_handler]
pub async fn start_test(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<Uuid>,
    Json(payload): Json<StartTestPayload>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let started = state
        .attempt_service
        .start(identity.user_id, test_id, payload.domain_id, payload.section, now)
        .await?;

    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(StartTestResponse {
            remaining_ms: remaining_millis(started.attempt.due_time, now),
            resumed: !started.created,
            attempt: started.attempt,
            questions: started.questions,
        }),
    ))
}

#[axum::debug_handler]
pub async fn submit_test(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let submitted = state
        .attempt_service
        .submit(identity.user_id, test_id, now)
        .await?;

    if submitted.newly_closed {
        if let Some(email) = identity.email.clone() {
            let title = match state.test_service.get_test(test_id).await {
                Ok(test) => test.title,
                Err(_) => "your test".to_string(),
            };
            notification_service::dispatch(
                state.notifier.clone(),
                email,
                format!("Submission received: {}", title),
                format!(
                    "Your attempt at {} was recorded at {} with status {}.",
                    title,
                    to_rfc3339(now),
                    submitted.attempt.status.as_str()
                ),
            );
        }
    }

    let message = if submitted.newly_closed {
        "Test submitted"
    } else {
        "Test was already submitted"
    };
    Ok(Json(SubmitTestResponse {
        message: message.to_string(),
        attempt: submitted.attempt,
    }))
}
