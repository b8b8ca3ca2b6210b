use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

/// Display name used when a record points at a student we don't have.
pub const UNKNOWN_STUDENT: &str = "Unknown";

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

macro_rules! text_status {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = RecordError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(RecordError::UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_status!(SessionStatus, "session", {
    Completed => "completed",
    Scheduled => "scheduled",
    Cancelled => "cancelled",
    NoShow => "no-show",
});

text_status!(StudentStatus, "student", {
    Active => "active",
    Paused => "paused",
    Graduated => "graduated",
    Dropped => "dropped",
});

text_status!(GoalStatus, "goal", {
    Active => "active",
    Achieved => "achieved",
    Abandoned => "abandoned",
});

impl SessionStatus {
    /// Cancelled and no-show sessions both count as lost.
    pub fn is_missed(self) -> bool {
        matches!(self, SessionStatus::Cancelled | SessionStatus::NoShow)
    }
}

impl StudentStatus {
    /// Active and paused flip between each other; everything else reactivates.
    pub fn toggled(self) -> StudentStatus {
        match self {
            StudentStatus::Active => StudentStatus::Paused,
            _ => StudentStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub name: String,
    pub grade: String,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: String,
    pub status: StudentStatus,
    pub started_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub duration_minutes: i32,
    pub amount: f64,
    pub status: SessionStatus,
    pub engagement_score: i32,
    pub comprehension_score: i32,
    pub topics_covered: String,
    pub homework_assigned: String,
    pub notes: String,
}

impl Session {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(RecordError::InvalidAmount(self.amount));
        }
        if self.duration_minutes < 0 {
            return Err(RecordError::InvalidDuration(self.duration_minutes));
        }
        check_score("engagement_score", self.engagement_score)?;
        check_score("comprehension_score", self.comprehension_score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub skill_name: String,
    pub score: i32,
    pub assessed_at: NaiveDate,
    pub notes: String,
}

impl Assessment {
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.skill_name.trim().is_empty() {
            return Err(RecordError::EmptyField("skill_name"));
        }
        check_score("score", self.score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub title: String,
    pub description: String,
    pub target_date: Option<NaiveDate>,
    pub status: GoalStatus,
}

impl Goal {
    /// A target date is treated as its first instant, so a goal due today is already overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == GoalStatus::Active && self.target_date.is_some_and(|date| date <= today)
    }
}

fn check_score(field: &'static str, value: i32) -> Result<(), RecordError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(RecordError::ScoreOutOfRange { field, value })
    }
}

/// Everything loaded from the store for one tutor at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub sessions: Vec<Session>,
    pub assessments: Vec<Assessment>,
    pub goals: Vec<Goal>,
}

impl Snapshot {
    /// Narrows sessions, assessments and goals to one student.
    pub fn scoped(&self, student_id: Uuid) -> Snapshot {
        Snapshot {
            students: self.students.clone(),
            subjects: self.subjects.clone(),
            sessions: self
                .sessions
                .iter()
                .filter(|s| s.student_id == student_id)
                .cloned()
                .collect(),
            assessments: self
                .assessments
                .iter()
                .filter(|a| a.student_id == student_id)
                .cloned()
                .collect(),
            goals: self
                .goals
                .iter()
                .filter(|g| g.student_id == student_id)
                .cloned()
                .collect(),
        }
    }

    pub fn names(&self) -> StudentNames {
        StudentNames::from_students(&self.students)
    }

    pub fn subject_name(&self, id: Option<Uuid>) -> Option<&str> {
        let id = id?;
        self.subjects
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.assessments.is_empty()
    }
}

/// id → display name lookup.
#[derive(Debug, Clone, Default)]
pub struct StudentNames(HashMap<Uuid, String>);

impl StudentNames {
    pub fn from_students(students: &[Student]) -> Self {
        Self(
            students
                .iter()
                .map(|s| (s.id, s.name.clone()))
                .collect(),
        )
    }

    pub fn get(&self, id: Uuid) -> &str {
        self.0.get(&id).map(String::as_str).unwrap_or(UNKNOWN_STUDENT)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    pub fn student(name: &str, status: StudentStatus) -> Student {
        Student {
            id: Uuid::new_v4(),
            tutor_id: Uuid::nil(),
            name: name.to_string(),
            grade: "9".to_string(),
            parent_name: String::new(),
            parent_email: String::new(),
            parent_phone: String::new(),
            status,
            started_at: date("2024-01-01"),
        }
    }

    pub fn session(student_id: Uuid, on: &str, status: SessionStatus) -> Session {
        Session {
            id: Uuid::new_v4(),
            tutor_id: Uuid::nil(),
            student_id,
            subject_id: None,
            scheduled_date: date(on),
            duration_minutes: 60,
            amount: 50.0,
            status,
            engagement_score: 7,
            comprehension_score: 7,
            topics_covered: String::new(),
            homework_assigned: String::new(),
            notes: String::new(),
        }
    }

    pub fn scored(mut session: Session, engagement: i32, comprehension: i32) -> Session {
        session.engagement_score = engagement;
        session.comprehension_score = comprehension;
        session
    }

    pub fn assessment(student_id: Uuid, skill: &str, score: i32, on: &str) -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            tutor_id: Uuid::nil(),
            student_id,
            subject_id: None,
            skill_name: skill.to_string(),
            score,
            assessed_at: date(on),
            notes: String::new(),
        }
    }

    pub fn goal(student_id: Uuid, status: GoalStatus, target: Option<&str>) -> Goal {
        Goal {
            id: Uuid::new_v4(),
            tutor_id: Uuid::nil(),
            student_id,
            title: "Master quadratics".to_string(),
            description: String::new(),
            target_date: target.map(date),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn statuses_parse_from_store_text() {
        assert_eq!("no-show".parse::<SessionStatus>(), Ok(SessionStatus::NoShow));
        assert_eq!("graduated".parse::<StudentStatus>(), Ok(StudentStatus::Graduated));
        assert_eq!(GoalStatus::Achieved.to_string(), "achieved");
        assert!(matches!(
            "finished".parse::<GoalStatus>(),
            Err(RecordError::UnknownStatus { kind: "goal", .. })
        ));
    }

    #[test]
    fn missed_sessions_cover_cancelled_and_no_show() {
        assert!(SessionStatus::Cancelled.is_missed());
        assert!(SessionStatus::NoShow.is_missed());
        assert!(!SessionStatus::Completed.is_missed());
        assert!(!SessionStatus::Scheduled.is_missed());
    }

    #[test]
    fn toggling_student_status() {
        assert_eq!(StudentStatus::Active.toggled(), StudentStatus::Paused);
        assert_eq!(StudentStatus::Paused.toggled(), StudentStatus::Active);
        assert_eq!(StudentStatus::Dropped.toggled(), StudentStatus::Active);
    }

    #[test]
    fn session_validation_rejects_bad_numbers() {
        let id = Uuid::new_v4();
        let mut s = session(id, "2024-01-01", SessionStatus::Completed);
        assert!(s.validate().is_ok());

        s.amount = f64::NAN;
        assert!(matches!(s.validate(), Err(RecordError::InvalidAmount(_))));

        s.amount = 10.0;
        s.duration_minutes = -5;
        assert_eq!(s.validate(), Err(RecordError::InvalidDuration(-5)));

        s.duration_minutes = 30;
        s.comprehension_score = 11;
        assert_eq!(
            s.validate(),
            Err(RecordError::ScoreOutOfRange {
                field: "comprehension_score",
                value: 11
            })
        );
    }

    #[test]
    fn assessment_needs_a_skill_name() {
        let mut a = assessment(Uuid::new_v4(), "  ", 5, "2024-01-01");
        assert_eq!(a.validate(), Err(RecordError::EmptyField("skill_name")));
        a.skill_name = "Algebra".to_string();
        a.score = 0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn overdue_covers_active_goals_due_today_or_earlier() {
        let today = date("2024-06-01");
        let id = Uuid::new_v4();
        assert!(goal(id, GoalStatus::Active, Some("2024-05-31")).is_overdue(today));
        assert!(goal(id, GoalStatus::Active, Some("2024-06-01")).is_overdue(today));
        assert!(!goal(id, GoalStatus::Active, Some("2024-06-02")).is_overdue(today));
        assert!(!goal(id, GoalStatus::Achieved, Some("2020-01-01")).is_overdue(today));
        assert!(!goal(id, GoalStatus::Active, None).is_overdue(today));
    }

    #[test]
    fn scoped_snapshot_keeps_lookup_tables() {
        let alice = student("Alice", StudentStatus::Active);
        let bob = student("Bob", StudentStatus::Active);
        let snapshot = Snapshot {
            sessions: vec![
                session(alice.id, "2024-01-01", SessionStatus::Completed),
                session(bob.id, "2024-01-02", SessionStatus::Completed),
            ],
            goals: vec![goal(bob.id, GoalStatus::Active, None)],
            students: vec![alice.clone(), bob],
            ..Snapshot::default()
        };

        let scoped = snapshot.scoped(alice.id);
        assert_eq!(scoped.students.len(), 2);
        assert_eq!(scoped.sessions.len(), 1);
        assert!(scoped.goals.is_empty());
    }

    #[test]
    fn missing_students_resolve_to_unknown() {
        let alice = student("Alice", StudentStatus::Active);
        let names = StudentNames::from_students(std::slice::from_ref(&alice));
        assert_eq!(names.get(alice.id), "Alice");
        assert_eq!(names.get(Uuid::new_v4()), UNKNOWN_STUDENT);
    }
}
