use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::ExamStore;
use crate::dto::answer_dto::SubmitAnswerPayload;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerDraft, AnswerFilter, MarkOutcome, MarkPrecondition};
use crate::models::question::Section;
use crate::models::test_attempt::AttemptStatus;
use crate::services::blob_service::{public_id_from_url, BlobStore};
use crate::utils::time::remaining_millis;

/// Answering window of one exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True when the window was recovered from an attempt or an earlier answer.
    pub resumed: bool,
}

impl ExamWindow {
    pub fn remaining_millis(&self, now: DateTime<Utc>) -> i64 {
        remaining_millis(self.end, now)
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}

/// Per-question submissions, staff marks and image cleanup.
#[derive(Clone)]
pub struct AnswerService {
    store: Arc<dyn ExamStore>,
    blob: Arc<dyn BlobStore>,
    window: Duration,
    blob_host: String,
}

impl AnswerService {
    pub fn new(
        store: Arc<dyn ExamStore>,
        blob: Arc<dyn BlobStore>,
        window: Duration,
        blob_host: String,
    ) -> Self {
        Self {
            store,
            blob,
            window,
            blob_host,
        }
    }

    /// Window a student should answer in, without persisting anything.
    pub async fn start_exam(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
        test_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ExamWindow> {
        if self.store.find_domain(domain_id).await?.is_none() {
            return Err(Error::NotFound("Domain not found".to_string()));
        }

        if let Some(test_id) = test_id {
            if let Some(attempt) = self.store.find_attempt(student_id, test_id).await? {
                if attempt.is_past_due(now) || attempt.status == AttemptStatus::Expired {
                    return Err(Error::ExamExpired);
                }
                if attempt.is_terminal() {
                    return Err(Error::AlreadyCompleted);
                }
                return Ok(ExamWindow {
                    start: attempt.start_time,
                    end: attempt.due_time,
                    resumed: true,
                });
            }
        }

        if let Some(window) = self.session_window(student_id, domain_id, section).await? {
            if window.has_expired(now) {
                return Err(Error::ExamExpired);
            }
            return Ok(window);
        }

        Ok(ExamWindow {
            start: now,
            end: now + self.window,
            resumed: false,
        })
    }

    /// Window of the running session, if the student already answered in it.
    pub async fn exam_status(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<ExamWindow>> {
        self.session_window(student_id, domain_id, section).await
    }

    pub async fn submit_answer(
        &self,
        student_id: Uuid,
        payload: SubmitAnswerPayload,
        now: DateTime<Utc>,
    ) -> Result<Answer> {
        if self.store.find_question(payload.question_id).await?.is_none() {
            return Err(Error::NotFound("Question not found".to_string()));
        }
        if self.store.find_domain(payload.domain_id).await?.is_none() {
            return Err(Error::NotFound("Domain not found".to_string()));
        }

        if let Some(test_id) = payload.test_id {
            if self.store.find_test(test_id).await?.is_none() {
                return Err(Error::NotFound("Test not found".to_string()));
            }
        }

        // A stored row keeps its window and its test; the payload can reopen neither.
        let existing = self
            .store
            .find_keyed_answer(
                student_id,
                payload.question_id,
                payload.domain_id,
                payload.section,
            )
            .await?;
        if existing.as_ref().map_or(false, |a| now > a.exam_end_time) {
            tracing::debug!(%student_id, question_id = %payload.question_id, "rewrite after window");
            return Err(Error::ExamExpired);
        }
        let test_id = payload
            .test_id
            .or_else(|| existing.as_ref().and_then(|a| a.test_id));

        let attempt = match test_id {
            Some(test_id) => self.store.find_attempt(student_id, test_id).await?,
            None => None,
        };
        let (start, end) = match &attempt {
            Some(attempt) => {
                if attempt.status == AttemptStatus::Completed {
                    return Err(Error::AlreadyCompleted);
                }
                (attempt.start_time, attempt.due_time)
            }
            None => match self
                .session_window(student_id, payload.domain_id, payload.section)
                .await?
            {
                Some(window) => (window.start, window.end),
                None => match payload.exam_start_time {
                    Some(start) => (start, start + self.window),
                    None => {
                        return Err(Error::BadRequest(
                            "examStartTime is required when the answer is not tied to a started test"
                                .to_string(),
                        ))
                    }
                },
            },
        };

        if now > end || attempt.as_ref().map_or(false, |a| a.status == AttemptStatus::Expired) {
            tracing::debug!(%student_id, question_id = %payload.question_id, "answer after window");
            return Err(Error::ExamExpired);
        }

        let text = payload.answer_text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(Error::EmptyAnswer);
        }

        let answer = self
            .store
            .upsert_answer(AnswerDraft {
                student_id,
                domain_id: payload.domain_id,
                question_id: payload.question_id,
                test_id,
                section: payload.section,
                answer_text: text.to_string(),
                image_url: payload.image_url,
                image_public_id: payload.image_public_id,
                exam_start_time: start,
                exam_end_time: end,
                submitted_at: now,
            })
            .await?;

        tracing::info!(
            %student_id,
            answer_id = %answer.id,
            question_id = %answer.question_id,
            "answer saved"
        );
        Ok(answer)
    }

    pub async fn add_mark(&self, answer_id: Uuid, mark: Decimal, now: DateTime<Utc>) -> Result<Answer> {
        check_mark(mark)?;
        match self
            .store
            .write_mark(answer_id, mark, MarkPrecondition::Unset, now)
            .await?
        {
            MarkOutcome::Applied(answer) => {
                tracing::info!(%answer_id, %mark, "mark added");
                Ok(answer)
            }
            MarkOutcome::Rejected(_) => Err(Error::MarkAlreadySet),
            MarkOutcome::Missing => Err(Error::NotFound("Answer not found".to_string())),
        }
    }

    pub async fn edit_mark(&self, answer_id: Uuid, mark: Decimal, now: DateTime<Utc>) -> Result<Answer> {
        check_mark(mark)?;
        match self
            .store
            .write_mark(answer_id, mark, MarkPrecondition::Set, now)
            .await?
        {
            MarkOutcome::Applied(answer) => {
                tracing::info!(%answer_id, %mark, "mark edited");
                Ok(answer)
            }
            MarkOutcome::Rejected(_) => Err(Error::NoMarkToEdit),
            MarkOutcome::Missing => Err(Error::NotFound("Answer not found".to_string())),
        }
    }

    /// Strips one embedded image from the answer text, then tries to destroy the hosted blob.
    pub async fn remove_image(
        &self,
        answer_id: Uuid,
        image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Answer> {
        let answer = self
            .store
            .find_answer(answer_id)
            .await?
            .ok_or_else(|| Error::NotFound("Answer not found".to_string()))?;

        let answer = match remove_image_reference(&answer.answer_text, image_url)? {
            Some(text) if text != answer.answer_text => self
                .store
                .replace_answer_text(answer_id, &text, now)
                .await?
                .ok_or_else(|| Error::NotFound("Answer not found".to_string()))?,
            _ => answer,
        };

        match public_id_from_url(image_url, &self.blob_host) {
            Some(public_id) => self.destroy_quietly(&public_id).await,
            None => tracing::debug!(%answer_id, "image is not hosted by the blob store; skipping destroy"),
        }
        Ok(answer)
    }

    pub async fn delete_answer(&self, answer_id: Uuid) -> Result<Answer> {
        let answer = self
            .store
            .delete_answer(answer_id)
            .await?
            .ok_or_else(|| Error::NotFound("Answer not found".to_string()))?;

        if let Some(public_id) = &answer.image_public_id {
            self.destroy_quietly(public_id).await;
        }
        tracing::info!(%answer_id, "answer deleted");
        Ok(answer)
    }

    /// Newest submission first.
    pub async fn my_answers(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Vec<Answer>> {
        self.store
            .list_answers(&AnswerFilter {
                student_id: Some(student_id),
                domain_id: Some(domain_id),
                section: Some(section),
                test_id: None,
            })
            .await
    }

    async fn session_window(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<ExamWindow>> {
        Ok(self
            .store
            .find_session_answer(student_id, domain_id, section)
            .await?
            .map(|answer| ExamWindow {
                start: answer.exam_start_time,
                end: answer.exam_end_time,
                resumed: true,
            }))
    }

    async fn destroy_quietly(&self, public_id: &str) {
        if let Err(e) = self.blob.destroy(public_id).await {
            tracing::warn!(error = ?e, public_id, "blob cleanup failed");
        }
    }
}

fn check_mark(mark: Decimal) -> Result<()> {
    if mark < Decimal::ZERO {
        return Err(Error::InvalidMark);
    }
    Ok(())
}

/// Removes the first `<img ... src="url" ...>` element and collapses the blank
/// lines it leaves behind. `None` when the url does not occur in the text.
pub fn remove_image_reference(text: &str, image_url: &str) -> Result<Option<String>> {
    if image_url.is_empty() || !text.contains(image_url) {
        return Ok(None);
    }
    let element = Regex::new(&format!(
        r#"<img[^>]*src="{}"[^>]*>"#,
        regex::escape(image_url)
    ))
    .map_err(|e| Error::Internal(format!("image pattern: {}", e)))?;
    let blank_lines = Regex::new(r"\n{3,}")
        .map_err(|e| Error::Internal(format!("blank line pattern: {}", e)))?;

    let stripped = element.replacen(text, 1, "");
    Ok(Some(blank_lines.replace_all(&stripped, "\n\n").into_owned()))
}
