use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, AnswerDraft, AnswerFilter, MarkOutcome, MarkPrecondition};
use crate::models::question::{Domain, Question, Section};
use crate::models::test::{NewTest, Test, TestPatch};
use crate::models::test_attempt::{NewAttempt, StartOutcome, TestAttempt};

/// Persistence contract of the exam core.
///
/// Every write that coordinates concurrent requests is a single conditional
/// operation on a natural key, so several service instances can share one store
/// without any in-process locking:
///
/// * `start_attempt` inserts on (student, test) or leaves an existing row alone,
/// * `close_attempt` only transitions rows that are not terminal yet,
/// * `upsert_answer` converges on (student, question, domain, section), never writes `mark`
///   and never clears an existing `test_id`,
/// * `write_mark` is a compare-and-set on the nullness of `mark`.
#[async_trait]
pub trait ExamStore: Send + Sync {
    // directories (read-only)
    async fn find_domain(&self, id: Uuid) -> Result<Option<Domain>>;
    /// Resolves the ids that exist; unknown ids are skipped.
    async fn find_domains(&self, ids: &[Uuid]) -> Result<Vec<Domain>>;
    async fn find_question(&self, id: Uuid) -> Result<Option<Question>>;
    async fn list_questions(&self, domain_id: Uuid, section: Section) -> Result<Vec<Question>>;

    // test catalog
    /// Fails with `DuplicateTitle` when the title is taken.
    async fn insert_test(&self, new: NewTest, now: DateTime<Utc>) -> Result<Test>;
    async fn find_test(&self, id: Uuid) -> Result<Option<Test>>;
    async fn find_test_by_title(&self, title: &str) -> Result<Option<Test>>;
    async fn list_tests(&self) -> Result<Vec<Test>>;
    /// Tests with an empty eligibility list or one containing `student_id`.
    async fn list_tests_for_student(&self, student_id: Uuid) -> Result<Vec<Test>>;
    async fn update_test(&self, id: Uuid, patch: &TestPatch, now: DateTime<Utc>)
        -> Result<Option<Test>>;
    /// Removes the test with its attempts and answers. `None` when the test did not exist.
    async fn delete_test(&self, id: Uuid) -> Result<Option<CascadeSummary>>;

    // attempts
    async fn start_attempt(&self, new: NewAttempt, now: DateTime<Utc>) -> Result<StartOutcome>;
    async fn find_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<TestAttempt>>;
    async fn list_attempts_for_student(&self, student_id: Uuid) -> Result<Vec<TestAttempt>>;
    /// Sets end time and the terminal status on an open attempt. A terminal row is
    /// returned unchanged; `None` when no row exists.
    async fn close_attempt(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>>;
    /// Writes the aggregate score onto an existing attempt only.
    async fn set_attempt_score(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        score: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>>;

    // answer ledger
    async fn upsert_answer(&self, draft: AnswerDraft) -> Result<Answer>;
    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>>;
    /// The live row for (student, question, domain, section), if any.
    async fn find_keyed_answer(
        &self,
        student_id: Uuid,
        question_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>>;
    /// Any answer of the student for (domain, section), used to recover a running window.
    async fn find_session_answer(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>>;
    async fn list_answers(&self, filter: &AnswerFilter) -> Result<Vec<Answer>>;
    async fn write_mark(
        &self,
        id: Uuid,
        mark: Decimal,
        precondition: MarkPrecondition,
        now: DateTime<Utc>,
    ) -> Result<MarkOutcome>;
    async fn replace_answer_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Answer>>;
    async fn delete_answer(&self, id: Uuid) -> Result<Option<Answer>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeSummary {
    pub attempts_removed: u64,
    pub answers_removed: u64,
}
