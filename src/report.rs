use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::goals::{self, GoalSummary};
use crate::metrics::{self, SessionMetrics, StudentRevenue};
use crate::models::Snapshot;
use crate::risk::{self, MatrixPoint, RetentionRisk};
use crate::trends::{self, SkillImprovement, StudentSkills, TOP_IMPROVEMENTS};

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub scope: Option<String>,
    pub generated_on: NaiveDate,
    pub has_activity: bool,
    pub metrics: SessionMetrics,
    pub revenue_by_student: Vec<StudentRevenue>,
    pub engagement_matrix: Vec<MatrixPoint>,
    pub skill_trajectories: Vec<StudentSkills>,
    pub top_improvements: Vec<SkillImprovement>,
    pub goals: GoalSummary,
    pub retention_risks: Vec<RetentionRisk>,
}

impl AnalyticsReport {
    /// With a student selected, the cohort-wide matrix and retention sections stay empty.
    pub fn build(snapshot: &Snapshot, student: Option<Uuid>, today: NaiveDate) -> AnalyticsReport {
        let names = snapshot.names();
        let scoped;
        let view = match student {
            Some(id) => {
                scoped = snapshot.scoped(id);
                &scoped
            }
            None => snapshot,
        };

        let mut top_improvements = trends::skill_improvements(&view.assessments, &names);
        top_improvements.truncate(TOP_IMPROVEMENTS);

        let (engagement_matrix, retention_risks) = if student.is_none() {
            (
                risk::engagement_matrix(&view.sessions, &names),
                risk::retention_risks(view, today),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        AnalyticsReport {
            scope: student.map(|id| names.get(id).to_string()),
            generated_on: today,
            has_activity: !snapshot.is_empty(),
            metrics: metrics::compute_metrics(&view.sessions),
            revenue_by_student: metrics::revenue_by_student(&view.sessions, &names),
            engagement_matrix,
            skill_trajectories: trends::skill_trajectories(&view.assessments, &names),
            top_improvements,
            goals: goals::summarize_goals(&view.goals, today),
            retention_risks,
        }
    }
}

pub fn render_markdown(report: &AnalyticsReport) -> String {
    let mut output = String::new();
    let scope_label = report.scope.as_deref().unwrap_or("all students");

    let _ = writeln!(output, "# TutorPulse Analytics Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label, report.generated_on
    );

    if !report.has_activity {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Log sessions and add skill assessments to see analytics."
        );
        return output;
    }

    let m = &report.metrics;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue & Retention");
    let _ = writeln!(output, "- Total revenue: ${:.0}", m.total_revenue);
    let _ = writeln!(output, "- Total hours: {:.1}", m.total_hours);
    let _ = writeln!(output, "- Effective rate: ${:.0}/hr", m.effective_hourly_rate);
    let _ = writeln!(
        output,
        "- Cancellation rate: {:.0}%{}",
        m.cancellation_rate,
        if m.has_high_cancellation() { " (high)" } else { "" }
    );
    let _ = writeln!(output, "- Revenue lost: ${:.0}", m.lost_revenue);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue by Student");
    if report.revenue_by_student.is_empty() {
        let _ = writeln!(output, "No completed sessions logged yet.");
    } else {
        for row in &report.revenue_by_student {
            let _ = writeln!(
                output,
                "- {}: ${:.0} across {} sessions ({:.1}h)",
                row.student_name, row.revenue, row.session_count, row.hours
            );
        }
    }

    if report.scope.is_none() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Engagement × Comprehension");
        if report.engagement_matrix.is_empty() {
            let _ = writeln!(output, "No completed sessions logged yet.");
        } else {
            for point in &report.engagement_matrix {
                let _ = writeln!(
                    output,
                    "- {}: {} (engagement {:.1}, comprehension {:.1}, {} sessions)",
                    point.student_name,
                    point.quadrant,
                    point.avg_engagement,
                    point.avg_comprehension,
                    point.session_count
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Biggest Skill Improvements");
    if report.top_improvements.is_empty() {
        let _ = writeln!(output, "Not enough repeat assessments yet.");
    } else {
        for item in &report.top_improvements {
            let _ = writeln!(
                output,
                "- {:+} {} / {} ({} → {})",
                item.change, item.student_name, item.skill, item.start, item.end
            );
        }
    }

    let g = &report.goals;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Goal Achievement");
    let _ = writeln!(
        output,
        "- {} goals, {:.0}% achieved, {} in progress, {} overdue",
        g.total, g.achievement_rate, g.active, g.overdue
    );

    if report.scope.is_none() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Retention Risk");
        if report.retention_risks.is_empty() {
            let _ = writeln!(output, "No active students.");
        } else {
            for risk in &report.retention_risks {
                let _ = writeln!(output, "- {}: {} risk", risk.student_name, risk.tier);
                for reason in &risk.reasons {
                    let _ = writeln!(output, "  - {}", reason);
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use crate::models::{GoalStatus, SessionStatus, StudentStatus};

    fn sample() -> (Snapshot, Uuid) {
        let alice = student("Alice", StudentStatus::Active);
        let bob = student("Bob", StudentStatus::Active);
        let alice_id = alice.id;
        let mut paid = session(alice.id, "2024-05-28", SessionStatus::Completed);
        paid.amount = 100.0;
        let snapshot = Snapshot {
            sessions: vec![
                paid,
                session(alice.id, "2024-05-29", SessionStatus::Cancelled),
                session(bob.id, "2024-05-30", SessionStatus::Scheduled),
            ],
            assessments: vec![
                assessment(alice.id, "Algebra", 4, "2024-01-01"),
                assessment(alice.id, "Algebra", 7, "2024-03-01"),
            ],
            goals: vec![goal(bob.id, GoalStatus::Active, Some("2020-01-01"))],
            students: vec![alice, bob],
            ..Snapshot::default()
        };
        (snapshot, alice_id)
    }

    #[test]
    fn full_report_covers_every_section() {
        let (snapshot, _) = sample();
        let report = AnalyticsReport::build(&snapshot, None, date("2024-06-01"));

        assert_eq!(report.metrics.total_revenue, 100.0);
        assert_eq!(report.top_improvements[0].change, 3);
        assert_eq!(report.goals.overdue, 1);
        assert_eq!(report.retention_risks.len(), 2);
        assert_eq!(report.retention_risks[0].student_name, "Bob");
        assert_eq!(report.engagement_matrix.len(), 1);

        let markdown = render_markdown(&report);
        assert!(markdown.contains("Generated for all students on 2024-06-01"));
        assert!(markdown.contains("- Cancellation rate: 33% (high)"));
        assert!(markdown.contains("- +3 Alice / Algebra (4 → 7)"));
        assert!(markdown.contains("- Bob: Medium risk"));
        assert!(markdown.contains("  - No completed sessions"));
    }

    #[test]
    fn scoped_report_skips_cohort_sections() {
        let (snapshot, alice) = sample();
        let report = AnalyticsReport::build(&snapshot, Some(alice), date("2024-06-01"));

        assert_eq!(report.scope.as_deref(), Some("Alice"));
        assert_eq!(report.metrics.session_count, 2);
        assert_eq!(report.goals.total, 0);
        assert!(report.engagement_matrix.is_empty());
        assert!(report.retention_risks.is_empty());

        let markdown = render_markdown(&report);
        assert!(!markdown.contains("## Retention Risk"));
        assert!(!markdown.contains("## Engagement"));
    }

    #[test]
    fn empty_snapshot_renders_placeholder() {
        let report = AnalyticsReport::build(&Snapshot::default(), None, date("2024-06-01"));
        let markdown = render_markdown(&report);
        assert!(markdown.contains("Log sessions and add skill assessments to see analytics."));
        assert!(!markdown.contains("## Revenue"));
    }

    #[test]
    fn report_serializes_to_json() {
        let (snapshot, _) = sample();
        let report = AnalyticsReport::build(&snapshot, None, date("2024-06-01"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metrics"]["total_revenue"], 100.0);
        assert_eq!(json["retention_risks"][0]["reasons"][0]["kind"], "no_completed_sessions");
        assert_eq!(json["skill_trajectories"][0]["skills"][0]["trend"], "Up");
    }
}
