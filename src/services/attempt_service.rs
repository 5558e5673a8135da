use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::ExamStore;
use crate::error::{Error, Result};
use crate::models::question::{Question, Section};
use crate::models::test::TestStatus;
use crate::models::test_attempt::{NewAttempt, StartOutcome, TestAttempt};

/// Attempt handed back by `start`, with the question set of the chosen domain and section.
#[derive(Debug)]
pub struct StartedAttempt {
    pub attempt: TestAttempt,
    pub questions: Vec<Question>,
    /// False when an attempt was already running and is returned as-is.
    pub created: bool,
}

#[derive(Debug)]
pub struct SubmittedAttempt {
    pub attempt: TestAttempt,
    /// True only for the submit that moved the attempt into a terminal status.
    pub newly_closed: bool,
}

/// Gates a student to one attempt per test and closes it on submit.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn ExamStore>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    pub async fn start(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        domain_id: Uuid,
        section: Section,
        now: DateTime<Utc>,
    ) -> Result<StartedAttempt> {
        let test = self
            .store
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;

        if test.status(now) != TestStatus::Active {
            return Err(Error::TestNotActive);
        }
        if !test.includes_domain(domain_id) {
            return Err(Error::DomainNotInTest);
        }
        if !test.offers_section(section) {
            return Err(Error::InvalidSection);
        }
        if let Some(existing) = self.store.find_attempt(student_id, test_id).await? {
            if existing.is_terminal() {
                return Err(Error::AlreadyCompleted);
            }
        }

        let outcome = self
            .store
            .start_attempt(
                NewAttempt {
                    student_id,
                    test_id,
                    start_time: now,
                    due_time: now + test.duration(),
                    selected_domain: domain_id,
                    selected_section: section,
                },
                now,
            )
            .await?;

        let (attempt, created) = match outcome {
            StartOutcome::Created(a) => (a, true),
            // a concurrent submit may have closed it between the check and the upsert
            StartOutcome::Existing(a) if a.is_terminal() => return Err(Error::AlreadyCompleted),
            StartOutcome::Existing(a) => (a, false),
        };

        let questions = self
            .store
            .list_questions(attempt.selected_domain, attempt.selected_section)
            .await?;

        if created {
            tracing::info!(
                %student_id,
                %test_id,
                due_time = %attempt.due_time,
                "attempt started"
            );
        } else {
            tracing::debug!(%student_id, %test_id, "attempt resumed");
        }

        Ok(StartedAttempt {
            attempt,
            questions,
            created,
        })
    }

    pub async fn submit(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubmittedAttempt> {
        let before = self
            .store
            .find_attempt(student_id, test_id)
            .await?
            .ok_or(Error::AttemptNotFound)?;

        let attempt = self
            .store
            .close_attempt(student_id, test_id, now)
            .await?
            .ok_or(Error::AttemptNotFound)?;

        let newly_closed = !before.is_terminal() && attempt.end_time == Some(now);
        if newly_closed {
            tracing::info!(
                %student_id,
                %test_id,
                status = attempt.status.as_str(),
                "attempt submitted"
            );
        }

        Ok(SubmittedAttempt {
            attempt,
            newly_closed,
        })
    }
}
