use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod goals;
mod metrics;
mod models;
mod report;
mod risk;
mod trends;

use models::{Assessment, Goal, GoalStatus, Session, SessionStatus, Student, StudentStatus, Subject};

#[derive(Parser)]
#[command(name = "tutorpulse")]
#[command(about = "Tutoring progress analytics for TutorPulse", long_about = None)]
struct Cli {
    /// Tutor whose records are read and written
    #[arg(long, env = "TUTOR_ID", global = true)]
    tutor: Option<Uuid>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import sessions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add a student
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        grade: String,
        #[arg(long, default_value = "")]
        parent_name: String,
        #[arg(long, default_value = "")]
        parent_email: String,
        #[arg(long, default_value = "")]
        parent_phone: String,
    },
    /// Add a subject
    AddSubject {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// Switch a student between active and paused
    ToggleStudent {
        #[arg(long)]
        id: Uuid,
    },
    /// Log a tutoring session
    LogSession {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        subject: Option<Uuid>,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 60)]
        duration: i32,
        #[arg(long, default_value_t = 0.0)]
        amount: f64,
        #[arg(long, default_value = "completed")]
        status: SessionStatus,
        #[arg(long, default_value_t = 5)]
        engagement: i32,
        #[arg(long, default_value_t = 5)]
        comprehension: i32,
        #[arg(long, default_value = "")]
        topics: String,
        #[arg(long, default_value = "")]
        homework: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Record a skill assessment
    AddAssessment {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        subject: Option<Uuid>,
        #[arg(long)]
        skill: String,
        #[arg(long)]
        score: i32,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Set a goal for a student
    AddGoal {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },
    /// Mark a goal achieved, abandoned or active again
    SetGoalStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: GoalStatus,
    },
    /// Delete a record by id
    Delete {
        #[arg(value_enum)]
        collection: db::Collection,
        id: Uuid,
    },
    /// Revenue, hours and cancellation figures
    Metrics {
        #[arg(long)]
        student: Option<Uuid>,
    },
    /// List logged sessions, newest first
    Sessions {
        #[arg(long)]
        student: Option<Uuid>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Skill trajectories per student
    Skills {
        #[arg(long)]
        student: Option<Uuid>,
    },
    /// Goal progress and deadlines
    Goals {
        #[arg(long)]
        student: Option<Uuid>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Retention risk across active students
    Risk {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Generate a full analytics report
    Report {
        #[arg(long)]
        student: Option<Uuid>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

fn require_tutor(tutor: Option<Uuid>) -> anyhow::Result<Uuid> {
    let tutor_id = tutor.context("a tutor id is required (pass --tutor or set TUTOR_ID)")?;
    debug!(%tutor_id, "tutor scope");
    Ok(tutor_id)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let tutor = cli.tutor;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let tutor_id = require_tutor(tutor)?;
            db::seed(&pool, tutor_id).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let tutor_id = require_tutor(tutor)?;
            let inserted = db::import_sessions_csv(&pool, tutor_id, &csv).await?;
            println!("Inserted {inserted} sessions from {}.", csv.display());
        }
        Commands::AddStudent {
            name,
            grade,
            parent_name,
            parent_email,
            parent_phone,
        } => {
            let tutor_id = require_tutor(tutor)?;
            let student = Student {
                id: Uuid::new_v4(),
                tutor_id,
                name,
                grade,
                parent_name,
                parent_email,
                parent_phone,
                status: StudentStatus::Active,
                started_at: today(),
            };
            db::insert_student(&pool, &student).await?;
            println!("Added {} ({}).", student.name, student.id);
        }
        Commands::AddSubject { name, category } => {
            let tutor_id = require_tutor(tutor)?;
            let subject = Subject {
                id: Uuid::new_v4(),
                tutor_id,
                name,
                category,
            };
            db::insert_subject(&pool, &subject).await?;
            println!("Added subject {} ({}).", subject.name, subject.id);
        }
        Commands::ToggleStudent { id } => {
            let tutor_id = require_tutor(tutor)?;
            let status = db::toggle_student_status(&pool, tutor_id, id).await?;
            println!("Student {id} is now {status}.");
        }
        Commands::LogSession {
            student,
            subject,
            date,
            duration,
            amount,
            status,
            engagement,
            comprehension,
            topics,
            homework,
            notes,
        } => {
            let tutor_id = require_tutor(tutor)?;
            let session = Session {
                id: Uuid::new_v4(),
                tutor_id,
                student_id: student,
                subject_id: subject,
                scheduled_date: date.unwrap_or_else(today),
                duration_minutes: duration,
                amount,
                status,
                engagement_score: engagement,
                comprehension_score: comprehension,
                topics_covered: topics,
                homework_assigned: homework,
                notes,
            };
            db::insert_session(&pool, &session).await?;
            println!(
                "Logged {} session on {} ({}).",
                session.status,
                session.scheduled_date,
                risk::SessionFeel::of(&session).label()
            );
        }
        Commands::AddAssessment {
            student,
            subject,
            skill,
            score,
            date,
            notes,
        } => {
            let tutor_id = require_tutor(tutor)?;
            let assessment = Assessment {
                id: Uuid::new_v4(),
                tutor_id,
                student_id: student,
                subject_id: subject,
                skill_name: skill,
                score,
                assessed_at: date.unwrap_or_else(today),
                notes,
            };
            db::insert_assessment(&pool, &assessment).await?;
            println!(
                "Recorded {} at {}/10.",
                assessment.skill_name.trim(),
                assessment.score
            );
        }
        Commands::AddGoal {
            student,
            title,
            description,
            target_date,
        } => {
            let tutor_id = require_tutor(tutor)?;
            let goal = Goal {
                id: Uuid::new_v4(),
                tutor_id,
                student_id: student,
                title,
                description,
                target_date,
                status: GoalStatus::Active,
            };
            db::insert_goal(&pool, &goal).await?;
            println!("Goal set: {} ({}).", goal.title, goal.id);
        }
        Commands::SetGoalStatus { id, status } => {
            let tutor_id = require_tutor(tutor)?;
            db::update_goal_status(&pool, tutor_id, id, status).await?;
            println!("Goal {id} marked {status}.");
        }
        Commands::Delete { collection, id } => {
            let tutor_id = require_tutor(tutor)?;
            if db::delete_record(&pool, tutor_id, collection, id).await? {
                println!("Deleted {id}.");
            } else {
                println!("Nothing to delete for {id}.");
            }
        }
        Commands::Metrics { student } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = load_scoped(&pool, tutor_id, student).await?;
            print_metrics(&snapshot);
        }
        Commands::Sessions { student, limit } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = load_scoped(&pool, tutor_id, student).await?;
            print_sessions(&snapshot, limit);
        }
        Commands::Skills { student } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = load_scoped(&pool, tutor_id, student).await?;
            print_skills(&snapshot);
        }
        Commands::Goals { student, as_of } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = load_scoped(&pool, tutor_id, student).await?;
            print_goals(&snapshot, as_of.unwrap_or_else(today));
        }
        Commands::Risk { as_of } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = db::fetch_snapshot(&pool, tutor_id).await?;
            print_risks(&snapshot, as_of.unwrap_or_else(today));
        }
        Commands::Report {
            student,
            format,
            out,
            as_of,
        } => {
            let tutor_id = require_tutor(tutor)?;
            let snapshot = db::fetch_snapshot(&pool, tutor_id).await?;
            let report =
                report::AnalyticsReport::build(&snapshot, student, as_of.unwrap_or_else(today));
            let rendered = match format {
                ReportFormat::Markdown => report::render_markdown(&report),
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn load_scoped(
    pool: &sqlx::PgPool,
    tutor_id: Uuid,
    student: Option<Uuid>,
) -> anyhow::Result<models::Snapshot> {
    let snapshot = db::fetch_snapshot(pool, tutor_id).await?;
    Ok(match student {
        Some(id) => snapshot.scoped(id),
        None => snapshot,
    })
}

fn print_metrics(snapshot: &models::Snapshot) {
    if snapshot.sessions.is_empty() {
        println!("No sessions logged yet.");
        return;
    }

    let m = metrics::compute_metrics(&snapshot.sessions);
    println!("Total revenue:     ${:.0}", m.total_revenue);
    println!("Total hours:       {:.1}", m.total_hours);
    println!("Effective $/hr:    ${:.0}", m.effective_hourly_rate);
    println!("Cancellation rate: {:.0}%", m.cancellation_rate);
    println!("Revenue lost:      ${:.0}", m.lost_revenue);

    let rows = metrics::revenue_by_student(&snapshot.sessions, &snapshot.names());
    if !rows.is_empty() {
        println!();
        println!("Revenue by student:");
        for row in rows {
            println!(
                "- {}: ${:.0} across {} sessions",
                row.student_name, row.revenue, row.session_count
            );
        }
    }
}

fn print_sessions(snapshot: &models::Snapshot, limit: usize) {
    if snapshot.sessions.is_empty() {
        println!("No sessions logged yet.");
        return;
    }

    let names = snapshot.names();
    for session in snapshot.sessions.iter().take(limit) {
        let subject = snapshot
            .subject_name(session.subject_id)
            .map(|name| format!(" [{name}]"))
            .unwrap_or_default();
        println!(
            "- {} {}{} {} {}min ${:.0} ({})",
            session.scheduled_date,
            names.get(session.student_id),
            subject,
            session.status,
            session.duration_minutes,
            session.amount,
            risk::SessionFeel::of(session).label()
        );
    }
}

fn print_skills(snapshot: &models::Snapshot) {
    let trajectories = trends::skill_trajectories(&snapshot.assessments, &snapshot.names());
    if trajectories.is_empty() {
        println!("No skill assessments yet.");
        return;
    }

    for student in trajectories {
        println!("{}", student.student_name);
        for series in &student.skills {
            let history = series
                .points
                .iter()
                .map(|p| p.score.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let (latest, band) = series
                .latest()
                .map(|p| (p.score, trends::ScoreBand::of(p.score).label()))
                .unwrap_or((0, "none"));
            println!(
                "  {} {} {}/10 ({}) history: {}",
                series.skill, series.trend, latest, band, history
            );
        }
    }
}

fn print_goals(snapshot: &models::Snapshot, today: NaiveDate) {
    if snapshot.goals.is_empty() {
        println!("No goals set yet.");
        return;
    }

    let summary = goals::summarize_goals(&snapshot.goals, today);
    println!(
        "{} active, {} achieved, {} abandoned ({:.0}% achievement, {} overdue)",
        summary.active, summary.achieved, summary.abandoned, summary.achievement_rate, summary.overdue
    );

    let names = snapshot.names();
    for goal in snapshot.goals.iter().filter(|g| g.status == GoalStatus::Active) {
        let urgency = goals::GoalUrgency::of(goal, today)
            .map(|u| format!(" [{}]", u.label()))
            .unwrap_or_default();
        println!("- {} ({}){}", goal.title, names.get(goal.student_id), urgency);
    }
}

fn print_risks(snapshot: &models::Snapshot, today: NaiveDate) {
    let risks = risk::retention_risks(snapshot, today);
    if risks.is_empty() {
        println!("No active students.");
        return;
    }

    for entry in risks {
        println!("{}: {} risk", entry.student_name, entry.tier);
        for reason in &entry.reasons {
            println!("  - {reason}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutor_is_required_outside_init_db() {
        let err = require_tutor(None).unwrap_err();
        assert!(err.to_string().contains("TUTOR_ID"));

        let id = Uuid::new_v4();
        assert_eq!(require_tutor(Some(id)).unwrap(), id);
    }

    #[test]
    fn init_db_parses_without_a_tutor() {
        let cli = Cli::try_parse_from(["tutorpulse", "init-db"]).unwrap();
        assert!(matches!(cli.command, Commands::InitDb));

        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["tutorpulse", "seed", "--tutor", id.as_str()]).unwrap();
        assert!(matches!(cli.command, Commands::Seed));
        assert_eq!(cli.tutor.map(|t| t.to_string()), Some(id));
    }
}
