use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::ExamStore;
use crate::error::Result;
use crate::models::answer::{Answer, AnswerFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreTotal {
    pub total: Decimal,
    pub answers_counted: usize,
    /// Whether the total was written onto an attempt.
    pub persisted: bool,
}

/// Reduces marked answers into a total and records it on the attempt.
#[derive(Clone)]
pub struct GradingService {
    store: Arc<dyn ExamStore>,
}

impl GradingService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    pub async fn compute_total(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        test_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ScoreTotal> {
        let answers = self
            .store
            .list_answers(&AnswerFilter {
                student_id: Some(student_id),
                domain_id: Some(domain_id),
                section: None,
                test_id,
            })
            .await?;
        let total = sum_marks(&answers);

        let persisted = match test_id {
            Some(test_id) => {
                let updated = self
                    .store
                    .set_attempt_score(student_id, test_id, total, now)
                    .await?;
                if updated.is_none() {
                    tracing::debug!(%student_id, %test_id, "no attempt to record the score on");
                }
                updated.is_some()
            }
            None => false,
        };

        tracing::info!(%student_id, %domain_id, %total, persisted, "score computed");
        Ok(ScoreTotal {
            total,
            answers_counted: answers.len(),
            persisted,
        })
    }
}

/// Unmarked answers count as zero.
pub fn sum_marks(answers: &[Answer]) -> Decimal {
    answers
        .iter()
        .filter_map(|a| a.mark)
        .fold(Decimal::ZERO, |acc, mark| acc + mark)
}
