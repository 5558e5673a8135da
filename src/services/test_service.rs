use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{CascadeSummary, ExamStore};
use crate::dto::test_dto::{
    AttemptSummary, CreateTestPayload, MyTestsResponse, StudentTestBoard, TestView,
    UpdateTestPayload,
};
use crate::error::{Error, Result};
use crate::models::question::Section;
use crate::models::test::{NewTest, Test, TestPatch, TestStatus, DEFAULT_DURATION_MINUTES};
use crate::models::test_attempt::AttemptStatus;
use crate::utils::time::remaining_millis;

/// Owns test definitions: scheduling, editing, removal and the student-facing listings.
#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn ExamStore>,
}

impl TestService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    pub async fn create_test(&self, payload: CreateTestPayload, now: DateTime<Utc>) -> Result<Test> {
        let title = normalize_title(&payload.title)?;
        let domain_ids = dedup_ids(payload.domains);
        if domain_ids.is_empty() {
            return Err(Error::InvalidWindow(
                "A test needs at least one domain".to_string(),
            ));
        }
        check_window(payload.start_date, payload.end_date)?;
        let duration_minutes = payload.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        check_duration(duration_minutes)?;
        let sections = normalize_sections(payload.sections)?;

        if self.store.find_test_by_title(&title).await?.is_some() {
            return Err(Error::DuplicateTitle(title));
        }
        self.ensure_domains_resolve(&domain_ids).await?;

        let test = self
            .store
            .insert_test(
                NewTest {
                    title,
                    domain_ids,
                    start_date: payload.start_date,
                    end_date: payload.end_date,
                    duration_minutes,
                    sections,
                    eligible_students: dedup_ids(payload.eligible_students),
                },
                now,
            )
            .await?;

        tracing::info!(test_id = %test.id, title = %test.title, "test created");
        Ok(test)
    }

    pub async fn update_test(
        &self,
        id: Uuid,
        payload: UpdateTestPayload,
        now: DateTime<Utc>,
    ) -> Result<Test> {
        let current = self.get_test(id).await?;

        let patch = TestPatch {
            title: payload.title.as_deref().map(normalize_title).transpose()?,
            domain_ids: payload.domains.map(dedup_ids),
            start_date: payload.start_date,
            end_date: payload.end_date,
            duration_minutes: payload.duration_minutes,
        };
        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(title) = &patch.title {
            if let Some(other) = self.store.find_test_by_title(title).await? {
                if other.id != id {
                    return Err(Error::DuplicateTitle(title.clone()));
                }
            }
        }
        if let Some(domain_ids) = &patch.domain_ids {
            if domain_ids.is_empty() {
                return Err(Error::InvalidWindow(
                    "A test needs at least one domain".to_string(),
                ));
            }
            self.ensure_domains_resolve(domain_ids).await?;
        }
        if let Some(minutes) = patch.duration_minutes {
            check_duration(minutes)?;
        }

        let mut merged = current;
        patch.apply(&mut merged);
        check_window(merged.start_date, merged.end_date)?;

        let updated = self
            .store
            .update_test(id, &patch, now)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;

        tracing::info!(test_id = %id, "test updated");
        Ok(updated)
    }

    pub async fn delete_test(&self, id: Uuid) -> Result<CascadeSummary> {
        let summary = self
            .store
            .delete_test(id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;

        tracing::info!(
            test_id = %id,
            attempts_removed = summary.attempts_removed,
            answers_removed = summary.answers_removed,
            "test deleted"
        );
        Ok(summary)
    }

    pub async fn get_test(&self, id: Uuid) -> Result<Test> {
        self.store
            .find_test(id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }

    pub async fn list_tests(&self) -> Result<Vec<Test>> {
        self.store.list_tests().await
    }

    pub async fn title_exists(&self, title: &str) -> Result<bool> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }
        Ok(self.store.find_test_by_title(title).await?.is_some())
    }

    /// Test with its derived status and the domains that still resolve.
    pub async fn describe(&self, test: Test, now: DateTime<Utc>) -> Result<TestView> {
        let domains = self.store.find_domains(&test.domain_ids).await?;
        Ok(TestView {
            status: test.status(now),
            domains,
            test,
        })
    }

    pub async fn describe_all(&self, tests: Vec<Test>, now: DateTime<Utc>) -> Result<Vec<TestView>> {
        let mut views = Vec::with_capacity(tests.len());
        for test in tests {
            views.push(self.describe(test, now).await?);
        }
        Ok(views)
    }

    /// Tests visible to the student split into upcoming, active and completed.
    pub async fn list_for_student(
        &self,
        student_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StudentTestBoard> {
        let tests = self.store.list_tests_for_student(student_id).await?;
        let closed: HashSet<Uuid> = self
            .store
            .list_attempts_for_student(student_id)
            .await?
            .into_iter()
            .filter(|a| a.effective_status(now).is_terminal())
            .map(|a| a.test_id)
            .collect();

        let mut board = StudentTestBoard::default();
        for test in tests {
            let done = closed.contains(&test.id);
            let view = self.describe(test, now).await?;
            if done {
                board.completed.push(view);
            } else {
                match view.status {
                    TestStatus::Inactive => board.upcoming.push(view),
                    TestStatus::Active => board.active.push(view),
                    TestStatus::Finished => {}
                }
            }
        }
        Ok(board)
    }

    /// The student's own attempts joined with their tests.
    pub async fn my_tests(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<MyTestsResponse> {
        let attempts = self.store.list_attempts_for_student(student_id).await?;

        let mut response = MyTestsResponse::default();
        for attempt in attempts {
            let Some(test) = self.store.find_test(attempt.test_id).await? else {
                continue;
            };
            let test_status = test.status(now);
            let effective_status = attempt.effective_status(now);
            let summary = AttemptSummary {
                effective_status,
                remaining_ms: if effective_status.is_terminal() {
                    0
                } else {
                    remaining_millis(attempt.due_time, now)
                },
                test: Some(self.describe(test, now).await?),
                attempt,
            };

            if effective_status.is_terminal() || test_status == TestStatus::Finished {
                response.completed.push(summary);
            } else if effective_status == AttemptStatus::InProgress
                && test_status == TestStatus::Active
            {
                response.active.push(summary);
            } else if effective_status == AttemptStatus::Pending
                && test_status == TestStatus::Inactive
            {
                response.upcoming.push(summary);
            }
        }
        Ok(response)
    }

    async fn ensure_domains_resolve(&self, ids: &[Uuid]) -> Result<()> {
        let found: HashSet<Uuid> = self
            .store
            .find_domains(ids)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidDomainReference(missing.join(", ")))
        }
    }
}

fn normalize_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Error::BadRequest("Title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(Error::InvalidWindow(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

fn check_duration(minutes: i32) -> Result<()> {
    if minutes < 1 {
        return Err(Error::BadRequest(
            "Duration must be at least 1 minute".to_string(),
        ));
    }
    Ok(())
}

fn normalize_sections(sections: Option<Vec<Section>>) -> Result<Vec<Section>> {
    match sections {
        None => Ok(Section::ALL.to_vec()),
        Some(list) => {
            let mut out = Vec::with_capacity(Section::ALL.len());
            for section in list {
                if !out.contains(&section) {
                    out.push(section);
                }
            }
            if out.is_empty() {
                return Err(Error::BadRequest(
                    "At least one section is required".to_string(),
                ));
            }
            Ok(out)
        }
    }
}

// Keeps first-seen order
fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
