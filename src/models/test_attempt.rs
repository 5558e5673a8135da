use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::question::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Expired)
    }
}

impl FromStr for AttemptStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "in-progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "expired" => Ok(AttemptStatus::Expired),
            other => Err(crate::error::Error::Internal(format!(
                "Unknown attempt status '{}'",
                other
            ))),
        }
    }
}

/// One student's single graded pass at one test. The window is a snapshot taken at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub due_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub selected_domain: Uuid,
    pub selected_section: Section,
    pub score: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestAttempt {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now > self.due_time
    }

    /// Stored status with lazy expiry applied: an open attempt past its due time reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AttemptStatus {
        match self.status {
            AttemptStatus::Pending | AttemptStatus::InProgress if self.is_past_due(now) => {
                AttemptStatus::Expired
            }
            status => status,
        }
    }

    /// Status a submit at `now` settles on.
    pub fn closing_status(&self, now: DateTime<Utc>) -> AttemptStatus {
        if self.is_past_due(now) {
            AttemptStatus::Expired
        } else {
            AttemptStatus::Completed
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub due_time: DateTime<Utc>,
    pub selected_domain: Uuid,
    pub selected_section: Section,
}

/// Result of the keyed start upsert.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Created(TestAttempt),
    /// A row already existed for (student, test); returned untouched.
    Existing(TestAttempt),
}

impl StartOutcome {
    pub fn into_attempt(self) -> TestAttempt {
        match self {
            StartOutcome::Created(a) | StartOutcome::Existing(a) => a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn attempt(status: AttemptStatus) -> TestAttempt {
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 10, 5, 0).unwrap();
        TestAttempt {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            start_time: start,
            due_time: start + Duration::minutes(30),
            end_time: None,
            status,
            selected_domain: Uuid::new_v4(),
            selected_section: Section::A,
            score: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn open_attempt_reads_expired_after_due() {
        let a = attempt(AttemptStatus::InProgress);
        assert_eq!(a.effective_status(a.due_time), AttemptStatus::InProgress);
        assert_eq!(
            a.effective_status(a.due_time + Duration::seconds(1)),
            AttemptStatus::Expired
        );
    }

    #[test]
    fn terminal_status_is_not_rewritten() {
        let a = attempt(AttemptStatus::Completed);
        assert_eq!(
            a.effective_status(a.due_time + Duration::hours(3)),
            AttemptStatus::Completed
        );
    }

    #[test]
    fn in_progress_uses_kebab_case() {
        assert_eq!(
            "in-progress".parse::<AttemptStatus>().unwrap(),
            AttemptStatus::InProgress
        );
        assert_eq!(
            serde_json::to_value(AttemptStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
    }
}
