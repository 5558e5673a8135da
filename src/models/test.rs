use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::Section;

pub const DEFAULT_DURATION_MINUTES: i32 = 60;

/// Temporal status of a test. Never stored; derived from the window on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Inactive,
    Active,
    Finished,
}

impl TestStatus {
    /// `now < start` is inactive, `now > end` is finished, both bounds are inclusive for active.
    pub fn at(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < start {
            TestStatus::Inactive
        } else if now > end {
            TestStatus::Finished
        } else {
            TestStatus::Active
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: Uuid,
    pub title: String,
    pub domain_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub sections: Vec<Section>,
    pub eligible_students: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Test {
    pub fn status(&self, now: DateTime<Utc>) -> TestStatus {
        TestStatus::at(self.start_date, self.end_date, now)
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn includes_domain(&self, domain_id: Uuid) -> bool {
        self.domain_ids.contains(&domain_id)
    }

    pub fn offers_section(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }

    /// An empty eligibility list opens the test to every student.
    pub fn is_open_to(&self, student_id: Uuid) -> bool {
        self.eligible_students.is_empty() || self.eligible_students.contains(&student_id)
    }
}

/// Validated input for inserting a test.
#[derive(Debug, Clone)]
pub struct NewTest {
    pub title: String,
    pub domain_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub sections: Vec<Section>,
    pub eligible_students: Vec<Uuid>,
}

/// Partial update of the administrator-mutable fields.
#[derive(Debug, Clone, Default)]
pub struct TestPatch {
    pub title: Option<String>,
    pub domain_ids: Option<Vec<Uuid>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

impl TestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.domain_ids.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.duration_minutes.is_none()
    }

    pub fn apply(&self, test: &mut Test) {
        if let Some(title) = &self.title {
            test.title = title.clone();
        }
        if let Some(domain_ids) = &self.domain_ids {
            test.domain_ids = domain_ids.clone();
        }
        if let Some(start) = self.start_date {
            test.start_date = start;
        }
        if let Some(end) = self.end_date {
            test.end_date = end;
        }
        if let Some(minutes) = self.duration_minutes {
            test.duration_minutes = minutes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, 0).unwrap()
    }

    #[test]
    fn status_boundaries() {
        let (start, end) = (at(10, 0), at(12, 0));
        assert_eq!(TestStatus::at(start, end, at(9, 59)), TestStatus::Inactive);
        assert_eq!(TestStatus::at(start, end, start), TestStatus::Active);
        assert_eq!(TestStatus::at(start, end, end), TestStatus::Active);
        assert_eq!(TestStatus::at(start, end, end + Duration::seconds(1)), TestStatus::Finished);
    }

    #[test]
    fn status_is_monotonic_over_time() {
        let (start, end) = (at(10, 0), at(12, 0));
        let mut previous = TestStatus::Inactive;
        let mut now = at(8, 0);
        while now < at(14, 0) {
            let current = TestStatus::at(start, end, now);
            assert!(current >= previous, "{:?} regressed to {:?}", previous, current);
            previous = current;
            now += Duration::minutes(7);
        }
        assert_eq!(previous, TestStatus::Finished);
    }

    #[test]
    fn empty_eligibility_is_open() {
        let student = Uuid::new_v4();
        let mut test = Test {
            id: Uuid::new_v4(),
            title: "Midterm".into(),
            domain_ids: vec![Uuid::new_v4()],
            start_date: at(10, 0),
            end_date: at(12, 0),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            sections: Section::ALL.to_vec(),
            eligible_students: vec![],
            created_at: at(9, 0),
            updated_at: at(9, 0),
        };
        assert!(test.is_open_to(student));
        test.eligible_students = vec![Uuid::new_v4()];
        assert!(!test.is_open_to(student));
        test.eligible_students.push(student);
        assert!(test.is_open_to(student));
    }
}
