use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::question::Section;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExamPayload {
    pub domain_id: Uuid,
    pub section: Section,
    pub test_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    pub question_id: Uuid,
    pub domain_id: Uuid,
    pub section: Section,
    #[serde(default)]
    pub answer_text: Option<String>,
    pub test_id: Option<Uuid>,
    /// Only consulted when no attempt governs the submission.
    pub exam_start_time: Option<DateTime<Utc>>,
    #[validate(url(message = "Image url must be a valid url"))]
    pub image_url: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub image_public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMarkPayload {
    pub answer_id: Uuid,
    pub mark: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct EditMarkPayload {
    pub mark: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateTotalPayload {
    pub student_id: Uuid,
    pub domain_id: Uuid,
    pub test_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveImagePayload {
    #[validate(length(min = 1, message = "Image url is required"))]
    pub image_url: String,
}

/// Exam window handed to the client; `remaining_ms` is computed against the request clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamWindowResponse {
    pub message: String,
    pub exam_start_time: DateTime<Utc>,
    pub exam_end_time: DateTime<Utc>,
    pub time_remaining: i64,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStatusResponse {
    pub has_started: bool,
    pub exam_start_time: Option<DateTime<Utc>>,
    pub exam_end_time: Option<DateTime<Utc>>,
    pub time_remaining: i64,
    pub has_expired: bool,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub message: String,
    pub answer: Answer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalResponse {
    pub total_marks: Decimal,
    pub answers_counted: usize,
    pub persisted: bool,
}
