use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::database::store::{CascadeSummary, ExamStore};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerDraft, AnswerFilter, MarkOutcome, MarkPrecondition};
use crate::models::question::{Domain, Question, Section};
use crate::models::test::{NewTest, Test, TestPatch};
use crate::models::test_attempt::{AttemptStatus, NewAttempt, StartOutcome, TestAttempt};

#[derive(Default)]
struct Tables {
    domains: HashMap<Uuid, Domain>,
    questions: HashMap<Uuid, Question>,
    tests: HashMap<Uuid, Test>,
    attempts: HashMap<(Uuid, Uuid), TestAttempt>,
    answers: HashMap<Uuid, Answer>,
}

/// Single-process store. Each operation runs under one lock, which gives it the
/// same all-or-nothing behaviour as the conditional statements of `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    /// Directory entries are owned elsewhere; this seeds them for local runs and tests.
    pub fn seed_domain(&self, name: &str) -> Result<Domain> {
        let domain = Domain {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.tables()?.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    pub fn remove_domain(&self, id: Uuid) -> Result<()> {
        self.tables()?.domains.remove(&id);
        Ok(())
    }

    pub fn seed_question(&self, domain_id: Uuid, section: Section, title: &str) -> Result<Question> {
        let question = Question {
            id: Uuid::new_v4(),
            domain_id,
            section,
            title: title.to_string(),
            description: format!("{} (section {})", title, section),
        };
        self.tables()?.questions.insert(question.id, question.clone());
        Ok(question)
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn find_domain(&self, id: Uuid) -> Result<Option<Domain>> {
        Ok(self.tables()?.domains.get(&id).cloned())
    }

    async fn find_domains(&self, ids: &[Uuid]) -> Result<Vec<Domain>> {
        let tables = self.tables()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.domains.get(id).cloned())
            .collect())
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>> {
        Ok(self.tables()?.questions.get(&id).cloned())
    }

    async fn list_questions(&self, domain_id: Uuid, section: Section) -> Result<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .tables()?
            .questions
            .values()
            .filter(|q| q.domain_id == domain_id && q.section == section)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(questions)
    }

    async fn insert_test(&self, new: NewTest, now: DateTime<Utc>) -> Result<Test> {
        let mut tables = self.tables()?;
        if tables.tests.values().any(|t| t.title == new.title) {
            return Err(Error::DuplicateTitle(new.title));
        }
        let test = Test {
            id: Uuid::new_v4(),
            title: new.title,
            domain_ids: new.domain_ids,
            start_date: new.start_date,
            end_date: new.end_date,
            duration_minutes: new.duration_minutes,
            sections: new.sections,
            eligible_students: new.eligible_students,
            created_at: now,
            updated_at: now,
        };
        tables.tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<Test>> {
        Ok(self.tables()?.tests.get(&id).cloned())
    }

    async fn find_test_by_title(&self, title: &str) -> Result<Option<Test>> {
        Ok(self
            .tables()?
            .tests
            .values()
            .find(|t| t.title == title)
            .cloned())
    }

    async fn list_tests(&self) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self.tables()?.tests.values().cloned().collect();
        tests.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.title.cmp(&b.title)));
        Ok(tests)
    }

    async fn list_tests_for_student(&self, student_id: Uuid) -> Result<Vec<Test>> {
        Ok(self
            .list_tests()
            .await?
            .into_iter()
            .filter(|t| t.is_open_to(student_id))
            .collect())
    }

    async fn update_test(
        &self,
        id: Uuid,
        patch: &TestPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Test>> {
        let mut tables = self.tables()?;
        if let Some(title) = &patch.title {
            if tables.tests.values().any(|t| t.id != id && &t.title == title) {
                return Err(Error::DuplicateTitle(title.clone()));
            }
        }
        let Some(test) = tables.tests.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(test);
        test.updated_at = now;
        Ok(Some(test.clone()))
    }

    async fn delete_test(&self, id: Uuid) -> Result<Option<CascadeSummary>> {
        let mut tables = self.tables()?;
        if tables.tests.remove(&id).is_none() {
            return Ok(None);
        }
        let attempts_before = tables.attempts.len();
        tables.attempts.retain(|(_, test_id), _| *test_id != id);
        let answers_before = tables.answers.len();
        tables.answers.retain(|_, a| a.test_id != Some(id));
        Ok(Some(CascadeSummary {
            attempts_removed: (attempts_before - tables.attempts.len()) as u64,
            answers_removed: (answers_before - tables.answers.len()) as u64,
        }))
    }

    async fn start_attempt(&self, new: NewAttempt, now: DateTime<Utc>) -> Result<StartOutcome> {
        let mut tables = self.tables()?;
        let key = (new.student_id, new.test_id);
        if let Some(existing) = tables.attempts.get_mut(&key) {
            if existing.status != AttemptStatus::Pending {
                return Ok(StartOutcome::Existing(existing.clone()));
            }
            existing.start_time = new.start_time;
            existing.due_time = new.due_time;
            existing.status = AttemptStatus::InProgress;
            existing.selected_domain = new.selected_domain;
            existing.selected_section = new.selected_section;
            existing.updated_at = now;
            return Ok(StartOutcome::Created(existing.clone()));
        }
        let attempt = TestAttempt {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            test_id: new.test_id,
            start_time: new.start_time,
            due_time: new.due_time,
            end_time: None,
            status: AttemptStatus::InProgress,
            selected_domain: new.selected_domain,
            selected_section: new.selected_section,
            score: None,
            created_at: now,
            updated_at: now,
        };
        tables.attempts.insert(key, attempt.clone());
        Ok(StartOutcome::Created(attempt))
    }

    async fn find_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<TestAttempt>> {
        Ok(self.tables()?.attempts.get(&(student_id, test_id)).cloned())
    }

    async fn list_attempts_for_student(&self, student_id: Uuid) -> Result<Vec<TestAttempt>> {
        let mut attempts: Vec<TestAttempt> = self
            .tables()?
            .attempts
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(attempts)
    }

    async fn close_attempt(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let mut tables = self.tables()?;
        let Some(attempt) = tables.attempts.get_mut(&(student_id, test_id)) else {
            return Ok(None);
        };
        if !attempt.is_terminal() {
            attempt.status = attempt.closing_status(now);
            attempt.end_time = Some(now);
            attempt.updated_at = now;
        }
        Ok(Some(attempt.clone()))
    }

    async fn set_attempt_score(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        score: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let mut tables = self.tables()?;
        Ok(tables
            .attempts
            .get_mut(&(student_id, test_id))
            .map(|attempt| {
                attempt.score = Some(score);
                attempt.updated_at = now;
                attempt.clone()
            }))
    }

    async fn upsert_answer(&self, draft: AnswerDraft) -> Result<Answer> {
        let mut tables = self.tables()?;
        let existing = tables.answers.values_mut().find(|a| {
            a.student_id == draft.student_id
                && a.question_id == draft.question_id
                && a.domain_id == draft.domain_id
                && a.section == draft.section
        });
        if let Some(answer) = existing {
            if draft.test_id.is_some() {
                answer.test_id = draft.test_id;
            }
            answer.answer_text = draft.answer_text;
            if draft.image_url.is_some() {
                answer.image_url = draft.image_url;
            }
            if draft.image_public_id.is_some() {
                answer.image_public_id = draft.image_public_id;
            }
            answer.exam_start_time = draft.exam_start_time;
            answer.exam_end_time = draft.exam_end_time;
            answer.submitted_at = draft.submitted_at;
            answer.is_submitted = true;
            answer.updated_at = draft.submitted_at;
            return Ok(answer.clone());
        }
        let answer = Answer {
            id: Uuid::new_v4(),
            student_id: draft.student_id,
            domain_id: draft.domain_id,
            question_id: draft.question_id,
            test_id: draft.test_id,
            section: draft.section,
            answer_text: draft.answer_text,
            image_url: draft.image_url,
            image_public_id: draft.image_public_id,
            exam_start_time: draft.exam_start_time,
            exam_end_time: draft.exam_end_time,
            submitted_at: draft.submitted_at,
            mark: None,
            mark_submitted: false,
            is_submitted: true,
            created_at: draft.submitted_at,
            updated_at: draft.submitted_at,
        };
        tables.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        Ok(self.tables()?.answers.get(&id).cloned())
    }

    async fn find_keyed_answer(
        &self,
        student_id: Uuid,
        question_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>> {
        Ok(self
            .tables()?
            .answers
            .values()
            .find(|a| {
                a.student_id == student_id
                    && a.question_id == question_id
                    && a.domain_id == domain_id
                    && a.section == section
            })
            .cloned())
    }

    async fn find_session_answer(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>> {
        Ok(self
            .tables()?
            .answers
            .values()
            .filter(|a| a.student_id == student_id && a.domain_id == domain_id && a.section == section)
            .min_by_key(|a| a.created_at)
            .cloned())
    }

    async fn list_answers(&self, filter: &AnswerFilter) -> Result<Vec<Answer>> {
        let mut answers: Vec<Answer> = self
            .tables()?
            .answers
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        answers.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(answers)
    }

    async fn write_mark(
        &self,
        id: Uuid,
        mark: Decimal,
        precondition: MarkPrecondition,
        now: DateTime<Utc>,
    ) -> Result<MarkOutcome> {
        let mut tables = self.tables()?;
        let Some(answer) = tables.answers.get_mut(&id) else {
            return Ok(MarkOutcome::Missing);
        };
        if !precondition.holds(answer.mark) {
            return Ok(MarkOutcome::Rejected(answer.clone()));
        }
        answer.mark = Some(mark);
        answer.mark_submitted = true;
        answer.updated_at = now;
        Ok(MarkOutcome::Applied(answer.clone()))
    }

    async fn replace_answer_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Answer>> {
        let mut tables = self.tables()?;
        Ok(tables.answers.get_mut(&id).map(|answer| {
            answer.answer_text = text.to_string();
            answer.updated_at = now;
            answer.clone()
        }))
    }

    async fn delete_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        Ok(self.tables()?.answers.remove(&id))
    }
}
