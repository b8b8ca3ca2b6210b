use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RecordError;
use crate::models::{
    Assessment, Goal, GoalStatus, Session, SessionStatus, Snapshot, Student, StudentStatus,
    Subject,
};

/// Tables a record can be deleted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Collection {
    Students,
    Subjects,
    Sessions,
    Assessments,
    Goals,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Students => "tutorpulse.students",
            Collection::Subjects => "tutorpulse.subjects",
            Collection::Sessions => "tutorpulse.sessions",
            Collection::Assessments => "tutorpulse.assessments",
            Collection::Goals => "tutorpulse.goals",
        }
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const STUDENTS_SQL: &str = "SELECT id, tutor_id, name, grade, parent_name, parent_email, \
     parent_phone, status, started_at \
     FROM tutorpulse.students WHERE tutor_id = $1 ORDER BY name";

const SUBJECTS_SQL: &str = "SELECT id, tutor_id, name, category \
     FROM tutorpulse.subjects WHERE tutor_id = $1 ORDER BY name";

const SESSIONS_SQL: &str = "SELECT id, tutor_id, student_id, subject_id, scheduled_date, \
     duration_minutes, amount, status, engagement_score, comprehension_score, \
     topics_covered, homework_assigned, notes \
     FROM tutorpulse.sessions WHERE tutor_id = $1 ORDER BY scheduled_date DESC";

const ASSESSMENTS_SQL: &str = "SELECT id, tutor_id, student_id, subject_id, skill_name, score, \
     assessed_at, notes \
     FROM tutorpulse.assessments WHERE tutor_id = $1 ORDER BY assessed_at DESC";

const GOALS_SQL: &str = "SELECT id, tutor_id, student_id, title, description, target_date, status \
     FROM tutorpulse.goals WHERE tutor_id = $1 ORDER BY created_at DESC";

/// Loads every collection for a tutor, querying them concurrently.
pub async fn fetch_snapshot(pool: &PgPool, tutor_id: Uuid) -> anyhow::Result<Snapshot> {
    let (students, subjects, sessions, assessments, goals) = tokio::try_join!(
        sqlx::query(STUDENTS_SQL).bind(tutor_id).fetch_all(pool),
        sqlx::query(SUBJECTS_SQL).bind(tutor_id).fetch_all(pool),
        sqlx::query(SESSIONS_SQL).bind(tutor_id).fetch_all(pool),
        sqlx::query(ASSESSMENTS_SQL).bind(tutor_id).fetch_all(pool),
        sqlx::query(GOALS_SQL).bind(tutor_id).fetch_all(pool),
    )
    .context("failed to load tutor snapshot")?;

    let snapshot = Snapshot {
        students: collect_valid("student", &students, student_from_row)?,
        subjects: collect_valid("subject", &subjects, subject_from_row)?,
        sessions: collect_valid("session", &sessions, session_from_row)?,
        assessments: collect_valid("assessment", &assessments, assessment_from_row)?,
        goals: collect_valid("goal", &goals, goal_from_row)?,
    };

    debug!(
        students = snapshot.students.len(),
        sessions = snapshot.sessions.len(),
        assessments = snapshot.assessments.len(),
        goals = snapshot.goals.len(),
        "snapshot loaded"
    );

    Ok(snapshot)
}

/// Rows that fail record validation are dropped; decode failures abort the load.
fn collect_valid<T>(
    kind: &'static str,
    rows: &[PgRow],
    map: fn(&PgRow) -> anyhow::Result<T>,
) -> anyhow::Result<Vec<T>> {
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        match map(row) {
            Ok(record) => records.push(record),
            Err(err) => match err.downcast_ref::<RecordError>() {
                Some(problem) => warn!(kind, %problem, "skipping invalid row"),
                None => return Err(err.context(format!("failed to decode {kind} row"))),
            },
        }
    }

    Ok(records)
}

fn student_from_row(row: &PgRow) -> anyhow::Result<Student> {
    let status: String = row.try_get("status")?;
    Ok(Student {
        id: row.try_get("id")?,
        tutor_id: row.try_get("tutor_id")?,
        name: row.try_get("name")?,
        grade: row.try_get("grade")?,
        parent_name: row.try_get("parent_name")?,
        parent_email: row.try_get("parent_email")?,
        parent_phone: row.try_get("parent_phone")?,
        status: status.parse()?,
        started_at: row.try_get("started_at")?,
    })
}

fn subject_from_row(row: &PgRow) -> anyhow::Result<Subject> {
    Ok(Subject {
        id: row.try_get("id")?,
        tutor_id: row.try_get("tutor_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
    })
}

fn session_from_row(row: &PgRow) -> anyhow::Result<Session> {
    let status: String = row.try_get("status")?;
    let session = Session {
        id: row.try_get("id")?,
        tutor_id: row.try_get("tutor_id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        scheduled_date: row.try_get("scheduled_date")?,
        duration_minutes: row.try_get("duration_minutes")?,
        amount: row.try_get("amount")?,
        status: status.parse()?,
        engagement_score: row.try_get("engagement_score")?,
        comprehension_score: row.try_get("comprehension_score")?,
        topics_covered: row.try_get("topics_covered")?,
        homework_assigned: row.try_get("homework_assigned")?,
        notes: row.try_get("notes")?,
    };
    session.validate()?;
    Ok(session)
}

fn assessment_from_row(row: &PgRow) -> anyhow::Result<Assessment> {
    let assessment = Assessment {
        id: row.try_get("id")?,
        tutor_id: row.try_get("tutor_id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        skill_name: row.try_get("skill_name")?,
        score: row.try_get("score")?,
        assessed_at: row.try_get("assessed_at")?,
        notes: row.try_get("notes")?,
    };
    assessment.validate()?;
    Ok(assessment)
}

fn goal_from_row(row: &PgRow) -> anyhow::Result<Goal> {
    let status: String = row.try_get("status")?;
    Ok(Goal {
        id: row.try_get("id")?,
        tutor_id: row.try_get("tutor_id")?,
        student_id: row.try_get("student_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        target_date: row.try_get("target_date")?,
        status: status.parse()?,
    })
}

pub async fn insert_student(pool: &PgPool, student: &Student) -> anyhow::Result<()> {
    if student.name.trim().is_empty() {
        return Err(RecordError::EmptyField("name").into());
    }

    sqlx::query(
        r#"
        INSERT INTO tutorpulse.students
        (id, tutor_id, name, grade, parent_name, parent_email, parent_phone, status, started_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(student.id)
    .bind(student.tutor_id)
    .bind(&student.name)
    .bind(&student.grade)
    .bind(&student.parent_name)
    .bind(&student.parent_email)
    .bind(&student.parent_phone)
    .bind(student.status.as_str())
    .bind(student.started_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert student {}", student.name))?;

    info!(student_id = %student.id, "student added");
    Ok(())
}

pub async fn insert_subject(pool: &PgPool, subject: &Subject) -> anyhow::Result<()> {
    if subject.name.trim().is_empty() {
        return Err(RecordError::EmptyField("name").into());
    }

    sqlx::query(
        r#"
        INSERT INTO tutorpulse.subjects (id, tutor_id, name, category)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(subject.id)
    .bind(subject.tutor_id)
    .bind(&subject.name)
    .bind(&subject.category)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert subject {}", subject.name))?;

    info!(subject_id = %subject.id, "subject added");
    Ok(())
}

/// Flips a student between active and paused, returning the new status.
pub async fn toggle_student_status(
    pool: &PgPool,
    tutor_id: Uuid,
    student_id: Uuid,
) -> anyhow::Result<StudentStatus> {
    let current: String = sqlx::query(
        "SELECT status FROM tutorpulse.students WHERE id = $1 AND tutor_id = $2",
    )
    .bind(student_id)
    .bind(tutor_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("student {student_id} not found"))?
    .try_get("status")?;

    let next = current.parse::<StudentStatus>()?.toggled();

    sqlx::query("UPDATE tutorpulse.students SET status = $1 WHERE id = $2 AND tutor_id = $3")
        .bind(next.as_str())
        .bind(student_id)
        .bind(tutor_id)
        .execute(pool)
        .await?;

    info!(%student_id, status = %next, "student status changed");
    Ok(next)
}

pub async fn insert_session(pool: &PgPool, session: &Session) -> anyhow::Result<()> {
    insert_session_keyed(pool, session, None).await.map(|_| ())
}

async fn insert_session_keyed(
    pool: &PgPool,
    session: &Session,
    source_key: Option<&str>,
) -> anyhow::Result<bool> {
    session.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO tutorpulse.sessions
        (id, tutor_id, student_id, subject_id, scheduled_date, duration_minutes, amount,
         status, engagement_score, comprehension_score, topics_covered, homework_assigned,
         notes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(session.id)
    .bind(session.tutor_id)
    .bind(session.student_id)
    .bind(session.subject_id)
    .bind(session.scheduled_date)
    .bind(session.duration_minutes)
    .bind(session.amount)
    .bind(session.status.as_str())
    .bind(session.engagement_score)
    .bind(session.comprehension_score)
    .bind(&session.topics_covered)
    .bind(&session.homework_assigned)
    .bind(&session.notes)
    .bind(source_key)
    .execute(pool)
    .await
    .context("failed to insert session")?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_assessment(pool: &PgPool, assessment: &Assessment) -> anyhow::Result<()> {
    assessment.validate()?;

    sqlx::query(
        r#"
        INSERT INTO tutorpulse.assessments
        (id, tutor_id, student_id, subject_id, skill_name, score, assessed_at, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(assessment.id)
    .bind(assessment.tutor_id)
    .bind(assessment.student_id)
    .bind(assessment.subject_id)
    .bind(assessment.skill_name.trim())
    .bind(assessment.score)
    .bind(assessment.assessed_at)
    .bind(&assessment.notes)
    .execute(pool)
    .await
    .context("failed to insert assessment")?;

    info!(assessment_id = %assessment.id, skill = %assessment.skill_name, "assessment added");
    Ok(())
}

pub async fn insert_goal(pool: &PgPool, goal: &Goal) -> anyhow::Result<()> {
    if goal.title.trim().is_empty() {
        return Err(RecordError::EmptyField("title").into());
    }

    sqlx::query(
        r#"
        INSERT INTO tutorpulse.goals
        (id, tutor_id, student_id, title, description, target_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(goal.id)
    .bind(goal.tutor_id)
    .bind(goal.student_id)
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(goal.target_date)
    .bind(goal.status.as_str())
    .execute(pool)
    .await
    .context("failed to insert goal")?;

    info!(goal_id = %goal.id, "goal added");
    Ok(())
}

pub async fn update_goal_status(
    pool: &PgPool,
    tutor_id: Uuid,
    goal_id: Uuid,
    status: GoalStatus,
) -> anyhow::Result<()> {
    let result =
        sqlx::query("UPDATE tutorpulse.goals SET status = $1 WHERE id = $2 AND tutor_id = $3")
            .bind(status.as_str())
            .bind(goal_id)
            .bind(tutor_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("goal {goal_id} not found");
    }

    info!(%goal_id, %status, "goal status changed");
    Ok(())
}

pub async fn delete_record(
    pool: &PgPool,
    tutor_id: Uuid,
    collection: Collection,
    id: Uuid,
) -> anyhow::Result<bool> {
    let query = format!(
        "DELETE FROM {} WHERE id = $1 AND tutor_id = $2",
        collection.table()
    );
    let result = sqlx::query(&query)
        .bind(id)
        .bind(tutor_id)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(?collection, %id, "record deleted");
    }
    Ok(deleted)
}

/// Reuses the oldest student with this name, or creates one. Names are not unique.
async fn find_or_create_student(pool: &PgPool, tutor_id: Uuid, name: &str) -> anyhow::Result<Uuid> {
    if name.is_empty() {
        return Err(RecordError::EmptyField("student").into());
    }

    let existing = sqlx::query(
        r#"
        SELECT id FROM tutorpulse.students
        WHERE tutor_id = $1 AND name = $2
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(tutor_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = existing {
        return Ok(row.try_get("id")?);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO tutorpulse.students (id, tutor_id, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(tutor_id)
        .bind(name)
        .execute(pool)
        .await
        .with_context(|| format!("failed to create student {name}"))?;
    debug!(%id, name, "student created");
    Ok(id)
}

pub async fn seed(pool: &PgPool, tutor_id: Uuid) -> anyhow::Result<()> {
    let students = [
        ("Avery Lee", "10"),
        ("Jules Moreno", "8"),
        ("Kiara Patel", "11"),
    ];

    let mut ids = Vec::with_capacity(students.len());
    for (name, grade) in students {
        let id = find_or_create_student(pool, tutor_id, name).await?;
        sqlx::query("UPDATE tutorpulse.students SET grade = $1 WHERE id = $2")
            .bind(grade)
            .bind(id)
            .execute(pool)
            .await?;
        ids.push(id);
    }

    let sessions = [
        ("seed-001", 0, "2026-01-05", 60, 70.0, SessionStatus::Completed, 8, 7),
        ("seed-002", 0, "2026-01-12", 60, 70.0, SessionStatus::Completed, 9, 8),
        ("seed-003", 0, "2026-01-19", 90, 105.0, SessionStatus::Completed, 8, 9),
        ("seed-004", 1, "2026-01-06", 60, 60.0, SessionStatus::Completed, 4, 3),
        ("seed-005", 1, "2026-01-13", 60, 60.0, SessionStatus::Cancelled, 5, 5),
        ("seed-006", 1, "2026-01-20", 60, 60.0, SessionStatus::Completed, 3, 4),
        ("seed-007", 1, "2026-01-27", 60, 60.0, SessionStatus::NoShow, 5, 5),
        ("seed-008", 1, "2026-02-03", 60, 60.0, SessionStatus::Completed, 3, 3),
        ("seed-009", 2, "2026-01-08", 45, 50.0, SessionStatus::Completed, 7, 4),
        ("seed-010", 2, "2026-02-05", 45, 50.0, SessionStatus::Scheduled, 5, 5),
    ];

    let mut inserted = 0usize;
    for (key, student, date, minutes, amount, status, engagement, comprehension) in sessions {
        let session = Session {
            id: Uuid::new_v4(),
            tutor_id,
            student_id: ids[student],
            subject_id: None,
            scheduled_date: parse_date(date)?,
            duration_minutes: minutes,
            amount,
            status,
            engagement_score: engagement,
            comprehension_score: comprehension,
            topics_covered: String::new(),
            homework_assigned: String::new(),
            notes: String::new(),
        };
        if insert_session_keyed(pool, &session, Some(key)).await? {
            inserted += 1;
        }
    }

    let already_seeded: i64 =
        sqlx::query("SELECT COUNT(*) AS n FROM tutorpulse.assessments WHERE tutor_id = $1")
            .bind(tutor_id)
            .fetch_one(pool)
            .await?
            .try_get("n")?;

    if already_seeded == 0 {
        let assessments = [
            (0, "Quadratics", 5, "2026-01-05"),
            (0, "Quadratics", 8, "2026-01-19"),
            (1, "Essay Structure", 6, "2026-01-06"),
            (1, "Essay Structure", 4, "2026-02-03"),
            (2, "Verb Conjugation", 3, "2026-01-08"),
        ];
        for (student, skill, score, date) in assessments {
            insert_assessment(
                pool,
                &Assessment {
                    id: Uuid::new_v4(),
                    tutor_id,
                    student_id: ids[student],
                    subject_id: None,
                    skill_name: skill.to_string(),
                    score,
                    assessed_at: parse_date(date)?,
                    notes: String::new(),
                },
            )
            .await?;
        }

        insert_goal(
            pool,
            &Goal {
                id: Uuid::new_v4(),
                tutor_id,
                student_id: ids[0],
                title: "Master quadratic equations".to_string(),
                description: "Solve any quadratic without notes".to_string(),
                target_date: Some(parse_date("2026-03-01")?),
                status: GoalStatus::Active,
            },
        )
        .await?;
    }

    info!(inserted, "seed sessions written");
    Ok(())
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("invalid date {value}"))
}

/// Imports sessions from a CSV export, creating students by name as needed.
pub async fn import_sessions_csv(
    pool: &PgPool,
    tutor_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student: String,
        scheduled_date: NaiveDate,
        duration_minutes: i32,
        amount: f64,
        status: String,
        engagement_score: i32,
        comprehension_score: i32,
        #[serde(default)]
        topics_covered: String,
        #[serde(default)]
        homework_assigned: String,
        #[serde(default)]
        notes: String,
        #[serde(default)]
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row on line {line}"))?;
        let status: SessionStatus = row
            .status
            .parse()
            .with_context(|| format!("line {line}"))?;

        let session = Session {
            id: Uuid::new_v4(),
            tutor_id,
            student_id: Uuid::nil(),
            subject_id: None,
            scheduled_date: row.scheduled_date,
            duration_minutes: row.duration_minutes,
            amount: row.amount,
            status,
            engagement_score: row.engagement_score,
            comprehension_score: row.comprehension_score,
            topics_covered: row.topics_covered,
            homework_assigned: row.homework_assigned,
            notes: row.notes,
        };
        session.validate().with_context(|| format!("line {line}"))?;

        let student_id = find_or_create_student(pool, tutor_id, row.student.trim()).await?;
        let session = Session {
            student_id,
            ..session
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_session_keyed(pool, &session, Some(&source_key)).await? {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "sessions imported");
    Ok(inserted)
}
