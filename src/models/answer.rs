use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::Section;

/// One row of the ledger. Unique per (student, question, domain, section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: Uuid,
    pub student_id: Uuid,
    pub domain_id: Uuid,
    pub question_id: Uuid,
    pub test_id: Option<Uuid>,
    pub section: Section,
    pub answer_text: String,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
    pub exam_start_time: DateTime<Utc>,
    pub exam_end_time: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub mark: Option<Decimal>,
    pub mark_submitted: bool,
    pub is_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content written by a student submission. Carries no mark.
#[derive(Debug, Clone)]
pub struct AnswerDraft {
    pub student_id: Uuid,
    pub domain_id: Uuid,
    pub question_id: Uuid,
    pub test_id: Option<Uuid>,
    pub section: Section,
    pub answer_text: String,
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
    pub exam_start_time: DateTime<Utc>,
    pub exam_end_time: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerFilter {
    pub student_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub section: Option<Section>,
    pub test_id: Option<Uuid>,
}

impl AnswerFilter {
    pub fn matches(&self, answer: &Answer) -> bool {
        self.student_id.map_or(true, |id| answer.student_id == id)
            && self.domain_id.map_or(true, |id| answer.domain_id == id)
            && self.section.map_or(true, |s| answer.section == s)
            && self.test_id.map_or(true, |id| answer.test_id == Some(id))
    }
}

/// Precondition of a conditional mark write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPrecondition {
    /// Only write when no mark is set yet.
    Unset,
    /// Only write when a mark is already set.
    Set,
}

impl MarkPrecondition {
    pub fn holds(&self, current: Option<Decimal>) -> bool {
        match self {
            MarkPrecondition::Unset => current.is_none(),
            MarkPrecondition::Set => current.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MarkOutcome {
    Applied(Answer),
    /// The precondition did not hold; the row is returned unchanged.
    Rejected(Answer),
    Missing,
}
