use crate::{
    dto::answer_dto::{
        AddMarkPayload, AnswerResponse, CalculateTotalPayload, EditMarkPayload,
        ExamStatusResponse, ExamWindowResponse, RemoveImagePayload, StartExamPayload,
        SubmitAnswerPayload, TotalResponse,
    },
    error::Result,
    models::{question::Section, user::Identity},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[axum::debug_handler]
pub async fn start_exam(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<StartExamPayload>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let window = state
        .answer_service
        .start_exam(
            identity.user_id,
            payload.domain_id,
            payload.section,
            payload.test_id,
            now,
        )
        .await?;

    let message = if window.resumed {
        "Exam session already exists"
    } else {
        "Exam session started"
    };
    Ok(Json(ExamWindowResponse {
        message: message.to_string(),
        exam_start_time: window.start,
        exam_end_time: window.end,
        time_remaining: window.remaining_millis(now),
        resumed: window.resumed,
    }))
}

#[axum::debug_handler]
pub async fn exam_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((domain_id, section)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let section: Section = section.parse()?;
    let now = state.clock.now();
    let window = state
        .answer_service
        .exam_status(identity.user_id, domain_id, section)
        .await?;

    let body = match window {
        Some(window) => ExamStatusResponse {
            has_started: true,
            exam_start_time: Some(window.start),
            exam_end_time: Some(window.end),
            time_remaining: window.remaining_millis(now),
            has_expired: window.has_expired(now),
        },
        None => ExamStatusResponse {
            has_started: false,
            exam_start_time: None,
            exam_end_time: None,
            time_remaining: 0,
            has_expired: false,
        },
    };
    Ok(Json(body))
}

#[axum::debug_handler]
pub async fn my_answers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((domain_id, section)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let section: Section = section.parse()?;
    let answers = state
        .answer_service
        .my_answers(identity.user_id, domain_id, section)
        .await?;
    Ok(Json(json!({ "answers": answers })))
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SubmitAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let now = state.clock.now();
    let answer = state
        .answer_service
        .submit_answer(identity.user_id, payload, now)
        .await?;
    Ok(Json(AnswerResponse {
        message: "Answer saved successfully".to_string(),
        answer,
    }))
}

#[axum::debug_handler]
pub async fn add_mark(
    State(state): State<AppState>,
    Json(payload): Json<AddMarkPayload>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let answer = state
        .answer_service
        .add_mark(payload.answer_id, payload.mark, now)
        .await?;
    Ok(Json(AnswerResponse {
        message: "Mark saved successfully".to_string(),
        answer,
    }))
}

#[axum::debug_handler]
pub async fn edit_mark(
    State(state): State<AppState>,
    Path(answer_id): Path<Uuid>,
    Json(payload): Json<EditMarkPayload>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let answer = state
        .answer_service
        .edit_mark(answer_id, payload.mark, now)
        .await?;
    Ok(Json(AnswerResponse {
        message: "Mark updated successfully".to_string(),
        answer,
    }))
}

#[axum::debug_handler]
pub async fn calculate_total(
    State(state): State<AppState>,
    Json(payload): Json<CalculateTotalPayload>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let total = state
        .grading_service
        .compute_total(payload.student_id, payload.domain_id, payload.test_id, now)
        .await?;
    Ok(Json(TotalResponse {
        total_marks: total.total,
        answers_counted: total.answers_counted,
        persisted: total.persisted,
    }))
}

#[axum::debug_handler]
pub async fn remove_image(
    State(state): State<AppState>,
    Path(answer_id): Path<Uuid>,
    Json(payload): Json<RemoveImagePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let now = state.clock.now();
    let answer = state
        .answer_service
        .remove_image(answer_id, payload.image_url.trim(), now)
        .await?;
    Ok(Json(AnswerResponse {
        message: "Answer image deleted successfully".to_string(),
        answer,
    }))
}

#[axum::debug_handler]
pub async fn delete_answer(
    State(state): State<AppState>,
    Path(answer_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let answer = state.answer_service.delete_answer(answer_id).await?;
    Ok(Json(json!({
        "message": "Answer deleted successfully",
        "id": answer.id,
    })))
}
