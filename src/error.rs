use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A test titled '{0}' already exists")]
    DuplicateTitle(String),

    #[error("Unknown domain id(s): {0}")]
    InvalidDomainReference(String),

    #[error("Invalid test window: {0}")]
    InvalidWindow(String),

    #[error("Test is not active")]
    TestNotActive,

    #[error("Domain is not part of this test")]
    DomainNotInTest,

    #[error("Section is not offered by this test")]
    InvalidSection,

    #[error("You have already completed this test")]
    AlreadyCompleted,

    #[error("Test has not been started")]
    AttemptNotFound,

    #[error("Exam time has expired")]
    ExamExpired,

    #[error("Answer text is required")]
    EmptyAnswer,

    #[error("Mark already exists; use the edit endpoint to update it")]
    MarkAlreadySet,

    #[error("No mark found; use the add endpoint to create one")]
    NoMarkToEdit,

    #[error("Mark must be a non-negative number")]
    InvalidMark,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code placed in the `error` field of responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::DuplicateTitle(_) => "duplicate_title",
            Error::InvalidDomainReference(_) => "invalid_domain_reference",
            Error::InvalidWindow(_) => "invalid_window",
            Error::TestNotActive => "test_not_active",
            Error::DomainNotInTest => "domain_not_in_test",
            Error::InvalidSection => "invalid_section",
            Error::AlreadyCompleted => "already_completed",
            Error::AttemptNotFound => "attempt_not_found",
            Error::ExamExpired => "exam_expired",
            Error::EmptyAnswer => "empty_answer",
            Error::MarkAlreadySet => "mark_already_set",
            Error::NoMarkToEdit => "no_mark_to_edit",
            Error::InvalidMark => "invalid_mark",
            Error::Database(_) => "database_error",
            Error::Validation(_) => "validation_error",
            Error::Json(_) => "invalid_json",
            Error::Reqwest(_) => "upstream_error",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_)
            | Error::Validation(_)
            | Error::Json(_)
            | Error::InvalidDomainReference(_)
            | Error::InvalidWindow(_)
            | Error::TestNotActive
            | Error::DomainNotInTest
            | Error::InvalidSection
            | Error::EmptyAnswer
            | Error::InvalidMark => StatusCode::BAD_REQUEST,
            Error::DuplicateTitle(_)
            | Error::MarkAlreadySet
            | Error::NoMarkToEdit
            | Error::AlreadyCompleted => StatusCode::CONFLICT,
            Error::ExamExpired | Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) | Error::AttemptNotFound => StatusCode::NOT_FOUND,
            Error::Reqwest(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Database(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "database failure");
                "An unexpected error occurred".to_string()
            }
            Error::Internal(msg) | Error::Config(msg) => {
                tracing::error!(error = %msg, "internal failure");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({ "error": self.code(), "message": message });
        if matches!(self, Error::ExamExpired) {
            body["examExpired"] = json!(true);
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
