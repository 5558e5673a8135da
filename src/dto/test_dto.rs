use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Domain, Question, Section};
use crate::models::test::{Test, TestStatus};
use crate::models::test_attempt::{AttemptStatus, TestAttempt};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestPayload {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: String,
    pub domains: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
    pub sections: Option<Vec<Section>>,
    #[serde(default)]
    pub eligible_students: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTestPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub title: Option<String>,
    pub domains: Option<Vec<Uuid>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
}

// Trims and turns blank strings into None
fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestPayload {
    pub domain_id: Uuid,
    pub section: Section,
}

/// A test as returned to clients: stored fields, derived status, resolved domains.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestView {
    #[serde(flatten)]
    pub test: Test,
    pub status: TestStatus,
    pub domains: Vec<Domain>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleCheckResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTestResponse {
    pub message: String,
    pub attempts_removed: u64,
    pub answers_removed: u64,
}

/// Student dashboard partition of the tests open to one student.
#[derive(Debug, Default, Serialize)]
pub struct StudentTestBoard {
    pub upcoming: Vec<TestView>,
    pub active: Vec<TestView>,
    pub completed: Vec<TestView>,
}

/// One attempt joined with its test, status read lazily.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub effective_status: AttemptStatus,
    pub remaining_ms: i64,
    pub test: Option<TestView>,
}

/// Attempts of one student grouped by what they can still do with them.
#[derive(Debug, Default, Serialize)]
pub struct MyTestsResponse {
    pub upcoming: Vec<AttemptSummary>,
    pub active: Vec<AttemptSummary>,
    pub completed: Vec<AttemptSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestResponse {
    pub attempt: TestAttempt,
    pub questions: Vec<Question>,
    pub remaining_ms: i64,
    pub resumed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub message: String,
    pub attempt: TestAttempt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_blank_title_is_absent() {
        let payload: UpdateTestPayload =
            serde_json::from_value(serde_json::json!({ "title": "   ", "durationMinutes": 45 })).unwrap();
        assert_eq!(payload.title, None);
        assert_eq!(payload.duration_minutes, Some(45));
    }

    #[test]
    fn create_payload_rejects_zero_duration() {
        let payload: CreateTestPayload = serde_json::from_value(serde_json::json!({
            "title": "Midterm",
            "domains": [Uuid::new_v4()],
            "startDate": "2026-05-04T10:00:00Z",
            "endDate": "2026-05-04T12:00:00Z",
            "durationMinutes": 0
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }
}
