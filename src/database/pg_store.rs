use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::{CascadeSummary, ExamStore};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerDraft, AnswerFilter, MarkOutcome, MarkPrecondition};
use crate::models::question::{Domain, Question, Section};
use crate::models::test::{NewTest, Test, TestPatch};
use crate::models::test_attempt::{NewAttempt, StartOutcome, TestAttempt};

const TEST_COLUMNS: &str = "id, title, domain_ids, start_date, end_date, duration_minutes, \
     sections, eligible_students, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, student_id, test_id, start_time, due_time, end_time, status, \
     selected_domain, selected_section, score, created_at, updated_at";

const ANSWER_COLUMNS: &str = "id, student_id, domain_id, question_id, test_id, section, answer_text, \
     image_url, image_public_id, exam_start_time, exam_end_time, submitted_at, mark, \
     mark_submitted, is_submitted, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DomainRow {
    id: Uuid,
    name: String,
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    domain_id: Uuid,
    section: String,
    title: String,
    description: String,
}

#[derive(FromRow)]
struct TestRow {
    id: Uuid,
    title: String,
    domain_ids: Vec<Uuid>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    duration_minutes: i32,
    sections: Vec<String>,
    eligible_students: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    student_id: Uuid,
    test_id: Uuid,
    start_time: DateTime<Utc>,
    due_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    selected_domain: Uuid,
    selected_section: String,
    score: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AnswerRow {
    id: Uuid,
    student_id: Uuid,
    domain_id: Uuid,
    question_id: Uuid,
    test_id: Option<Uuid>,
    section: String,
    answer_text: String,
    image_url: Option<String>,
    image_public_id: Option<String>,
    exam_start_time: DateTime<Utc>,
    exam_end_time: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    mark: Option<Decimal>,
    mark_submitted: bool,
    is_submitted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DomainRow> for Domain {
    fn from(row: DomainRow) -> Self {
        Domain {
            id: row.id,
            name: row.name,
        }
    }
}

impl TryFrom<QuestionRow> for Question {
    type Error = Error;

    fn try_from(row: QuestionRow) -> Result<Self> {
        Ok(Question {
            id: row.id,
            domain_id: row.domain_id,
            section: row.section.parse()?,
            title: row.title,
            description: row.description,
        })
    }
}

impl TryFrom<TestRow> for Test {
    type Error = Error;

    fn try_from(row: TestRow) -> Result<Self> {
        let sections = row
            .sections
            .iter()
            .map(|s| s.parse::<Section>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Test {
            id: row.id,
            title: row.title,
            domain_ids: row.domain_ids,
            start_date: row.start_date,
            end_date: row.end_date,
            duration_minutes: row.duration_minutes,
            sections,
            eligible_students: row.eligible_students,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<AttemptRow> for TestAttempt {
    type Error = Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(TestAttempt {
            id: row.id,
            student_id: row.student_id,
            test_id: row.test_id,
            start_time: row.start_time,
            due_time: row.due_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            selected_domain: row.selected_domain,
            selected_section: row.selected_section.parse()?,
            score: row.score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<AnswerRow> for Answer {
    type Error = Error;

    fn try_from(row: AnswerRow) -> Result<Self> {
        Ok(Answer {
            id: row.id,
            student_id: row.student_id,
            domain_id: row.domain_id,
            question_id: row.question_id,
            test_id: row.test_id,
            section: row.section.parse()?,
            answer_text: row.answer_text,
            image_url: row.image_url,
            image_public_id: row.image_public_id,
            exam_start_time: row.exam_start_time,
            exam_end_time: row.exam_end_time,
            submitted_at: row.submitted_at,
            mark: row.mark,
            mark_submitted: row.mark_submitted,
            is_submitted: row.is_submitted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn section_strings(sections: &[Section]) -> Vec<String> {
    sections.iter().map(|s| s.as_str().to_string()).collect()
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl ExamStore for PgStore {
    async fn find_domain(&self, id: Uuid) -> Result<Option<Domain>> {
        let row = sqlx::query_as::<_, DomainRow>("SELECT id, name FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Domain::from))
    }

    async fn find_domains(&self, ids: &[Uuid]) -> Result<Vec<Domain>> {
        let rows = sqlx::query_as::<_, DomainRow>(
            "SELECT id, name FROM domains WHERE id = ANY($1) ORDER BY array_position($1, id)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Domain::from).collect())
    }

    async fn find_question(&self, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, domain_id, section, title, description FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Question::try_from).transpose()
    }

    async fn list_questions(&self, domain_id: Uuid, section: Section) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"SELECT id, domain_id, section, title, description FROM questions
               WHERE domain_id = $1 AND section = $2 AND is_active
               ORDER BY title"#,
        )
        .bind(domain_id)
        .bind(section.as_str())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn insert_test(&self, new: NewTest, now: DateTime<Utc>) -> Result<Test> {
        let sql = format!(
            r#"INSERT INTO tests (id, title, domain_ids, start_date, end_date, duration_minutes,
                                  sections, eligible_students, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
               RETURNING {}"#,
            TEST_COLUMNS
        );
        let result = sqlx::query_as::<_, TestRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.domain_ids)
            .bind(new.start_date)
            .bind(new.end_date)
            .bind(new.duration_minutes)
            .bind(section_strings(&new.sections))
            .bind(&new.eligible_students)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok(row) => Test::try_from(row),
            Err(e) if is_unique_violation(&e, "tests_title_key") => {
                Err(Error::DuplicateTitle(new.title))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<Test>> {
        let sql = format!("SELECT {} FROM tests WHERE id = $1", TEST_COLUMNS);
        let row = sqlx::query_as::<_, TestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Test::try_from).transpose()
    }

    async fn find_test_by_title(&self, title: &str) -> Result<Option<Test>> {
        let sql = format!("SELECT {} FROM tests WHERE title = $1", TEST_COLUMNS);
        let row = sqlx::query_as::<_, TestRow>(&sql)
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Test::try_from).transpose()
    }

    async fn list_tests(&self) -> Result<Vec<Test>> {
        let sql = format!("SELECT {} FROM tests ORDER BY start_date, title", TEST_COLUMNS);
        let rows = sqlx::query_as::<_, TestRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn list_tests_for_student(&self, student_id: Uuid) -> Result<Vec<Test>> {
        let sql = format!(
            r#"SELECT {} FROM tests
               WHERE cardinality(eligible_students) = 0 OR $1 = ANY(eligible_students)
               ORDER BY start_date, title"#,
            TEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, TestRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn update_test(
        &self,
        id: Uuid,
        patch: &TestPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Test>> {
        let sql = format!(
            r#"UPDATE tests SET
                   title = COALESCE($2, title),
                   domain_ids = COALESCE($3, domain_ids),
                   start_date = COALESCE($4, start_date),
                   end_date = COALESCE($5, end_date),
                   duration_minutes = COALESCE($6, duration_minutes),
                   updated_at = $7
               WHERE id = $1
               RETURNING {}"#,
            TEST_COLUMNS
        );
        let result = sqlx::query_as::<_, TestRow>(&sql)
            .bind(id)
            .bind(patch.title.as_deref())
            .bind(patch.domain_ids.as_ref())
            .bind(patch.start_date)
            .bind(patch.end_date)
            .bind(patch.duration_minutes)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        match result {
            Ok(row) => row.map(Test::try_from).transpose(),
            Err(e) if is_unique_violation(&e, "tests_title_key") => Err(Error::DuplicateTitle(
                patch.title.clone().unwrap_or_default(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_test(&self, id: Uuid) -> Result<Option<CascadeSummary>> {
        let mut tx = self.pool.begin().await?;

        let answers = sqlx::query("DELETE FROM answers WHERE test_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let attempts = sqlx::query("DELETE FROM test_attempts WHERE test_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let tests = sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if tests.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        Ok(Some(CascadeSummary {
            attempts_removed: attempts.rows_affected(),
            answers_removed: answers.rows_affected(),
        }))
    }

    async fn start_attempt(&self, new: NewAttempt, now: DateTime<Utc>) -> Result<StartOutcome> {
        // A pending row may be taken over; anything else is left exactly as it is.
        let sql = format!(
            r#"INSERT INTO test_attempts (id, student_id, test_id, start_time, due_time, status,
                                          selected_domain, selected_section, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 'in-progress', $6, $7, $8, $8)
               ON CONFLICT (student_id, test_id) DO UPDATE SET
                   start_time = EXCLUDED.start_time,
                   due_time = EXCLUDED.due_time,
                   status = 'in-progress',
                   selected_domain = EXCLUDED.selected_domain,
                   selected_section = EXCLUDED.selected_section,
                   updated_at = EXCLUDED.updated_at
               WHERE test_attempts.status = 'pending'
               RETURNING {}"#,
            ATTEMPT_COLUMNS
        );
        let written = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.student_id)
            .bind(new.test_id)
            .bind(new.start_time)
            .bind(new.due_time)
            .bind(new.selected_domain)
            .bind(new.selected_section.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = written {
            return Ok(StartOutcome::Created(TestAttempt::try_from(row)?));
        }
        match self.find_attempt(new.student_id, new.test_id).await? {
            Some(existing) => Ok(StartOutcome::Existing(existing)),
            None => Err(Error::NotFound("Test not found".to_string())),
        }
    }

    async fn find_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<TestAttempt>> {
        let sql = format!(
            "SELECT {} FROM test_attempts WHERE student_id = $1 AND test_id = $2",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(student_id)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TestAttempt::try_from).transpose()
    }

    async fn list_attempts_for_student(&self, student_id: Uuid) -> Result<Vec<TestAttempt>> {
        let sql = format!(
            "SELECT {} FROM test_attempts WHERE student_id = $1 ORDER BY start_time DESC",
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn close_attempt(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let sql = format!(
            r#"UPDATE test_attempts SET
                   end_time = $3,
                   status = CASE WHEN $3 > due_time THEN 'expired' ELSE 'completed' END,
                   updated_at = $3
               WHERE student_id = $1 AND test_id = $2 AND status IN ('pending', 'in-progress')
               RETURNING {}"#,
            ATTEMPT_COLUMNS
        );
        let closed = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(student_id)
            .bind(test_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        match closed {
            Some(row) => Ok(Some(TestAttempt::try_from(row)?)),
            None => self.find_attempt(student_id, test_id).await,
        }
    }

    async fn set_attempt_score(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        score: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let sql = format!(
            r#"UPDATE test_attempts SET score = $3, updated_at = $4
               WHERE student_id = $1 AND test_id = $2
               RETURNING {}"#,
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(student_id)
            .bind(test_id)
            .bind(score)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TestAttempt::try_from).transpose()
    }

    async fn upsert_answer(&self, draft: AnswerDraft) -> Result<Answer> {
        // The conflict update never touches `mark` or `mark_submitted`.
        let sql = format!(
            r#"INSERT INTO answers (id, student_id, domain_id, question_id, test_id, section,
                                    answer_text, image_url, image_public_id, exam_start_time,
                                    exam_end_time, submitted_at, is_submitted, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE, $12, $12)
               ON CONFLICT (student_id, question_id, domain_id, section) DO UPDATE SET
                   test_id = COALESCE(EXCLUDED.test_id, answers.test_id),
                   answer_text = EXCLUDED.answer_text,
                   image_url = COALESCE(EXCLUDED.image_url, answers.image_url),
                   image_public_id = COALESCE(EXCLUDED.image_public_id, answers.image_public_id),
                   exam_start_time = EXCLUDED.exam_start_time,
                   exam_end_time = EXCLUDED.exam_end_time,
                   submitted_at = EXCLUDED.submitted_at,
                   is_submitted = TRUE,
                   updated_at = EXCLUDED.updated_at
               RETURNING {}"#,
            ANSWER_COLUMNS
        );
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(draft.student_id)
            .bind(draft.domain_id)
            .bind(draft.question_id)
            .bind(draft.test_id)
            .bind(draft.section.as_str())
            .bind(&draft.answer_text)
            .bind(draft.image_url.as_deref())
            .bind(draft.image_public_id.as_deref())
            .bind(draft.exam_start_time)
            .bind(draft.exam_end_time)
            .bind(draft.submitted_at)
            .fetch_one(&self.pool)
            .await?;
        Answer::try_from(row)
    }

    async fn find_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        let sql = format!("SELECT {} FROM answers WHERE id = $1", ANSWER_COLUMNS);
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Answer::try_from).transpose()
    }

    async fn find_keyed_answer(
        &self,
        student_id: Uuid,
        question_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>> {
        let sql = format!(
            r#"SELECT {} FROM answers
               WHERE student_id = $1 AND question_id = $2 AND domain_id = $3 AND section = $4"#,
            ANSWER_COLUMNS
        );
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(student_id)
            .bind(question_id)
            .bind(domain_id)
            .bind(section.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Answer::try_from).transpose()
    }

    async fn find_session_answer(
        &self,
        student_id: Uuid,
        domain_id: Uuid,
        section: Section,
    ) -> Result<Option<Answer>> {
        let sql = format!(
            r#"SELECT {} FROM answers
               WHERE student_id = $1 AND domain_id = $2 AND section = $3
               ORDER BY created_at ASC
               LIMIT 1"#,
            ANSWER_COLUMNS
        );
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(student_id)
            .bind(domain_id)
            .bind(section.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Answer::try_from).transpose()
    }

    async fn list_answers(&self, filter: &AnswerFilter) -> Result<Vec<Answer>> {
        let sql = format!(
            r#"SELECT {} FROM answers
               WHERE ($1::uuid IS NULL OR student_id = $1)
                 AND ($2::uuid IS NULL OR domain_id = $2)
                 AND ($3::text IS NULL OR section = $3)
                 AND ($4::uuid IS NULL OR test_id = $4)
               ORDER BY submitted_at DESC"#,
            ANSWER_COLUMNS
        );
        let rows = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(filter.student_id)
            .bind(filter.domain_id)
            .bind(filter.section.map(|s| s.as_str()))
            .bind(filter.test_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn write_mark(
        &self,
        id: Uuid,
        mark: Decimal,
        precondition: MarkPrecondition,
        now: DateTime<Utc>,
    ) -> Result<MarkOutcome> {
        let guard = match precondition {
            MarkPrecondition::Unset => "mark IS NULL",
            MarkPrecondition::Set => "mark IS NOT NULL",
        };
        let sql = format!(
            r#"UPDATE answers SET mark = $2, mark_submitted = TRUE, updated_at = $3
               WHERE id = $1 AND {}
               RETURNING {}"#,
            guard, ANSWER_COLUMNS
        );
        let written = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(id)
            .bind(mark)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = written {
            return Ok(MarkOutcome::Applied(Answer::try_from(row)?));
        }
        Ok(match self.find_answer(id).await? {
            Some(current) => MarkOutcome::Rejected(current),
            None => MarkOutcome::Missing,
        })
    }

    async fn replace_answer_text(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Answer>> {
        let sql = format!(
            "UPDATE answers SET answer_text = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            ANSWER_COLUMNS
        );
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(id)
            .bind(text)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Answer::try_from).transpose()
    }

    async fn delete_answer(&self, id: Uuid) -> Result<Option<Answer>> {
        let sql = format!("DELETE FROM answers WHERE id = $1 RETURNING {}", ANSWER_COLUMNS);
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Answer::try_from).transpose()
    }
}
