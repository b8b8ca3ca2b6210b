use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Session, Snapshot, StudentNames, StudentStatus};

/// Midpoint of the 1-10 scale used to split the engagement/comprehension matrix.
pub const QUADRANT_MIDPOINT: f64 = 5.5;
/// Per-session labels on the session log use a stricter cut.
pub const SESSION_FEEL_MIDPOINT: i32 = 6;

pub const STALE_AFTER_DAYS: i64 = 21;
pub const MIN_SESSIONS_FOR_CANCELLATION: usize = 3;
pub const CANCELLATION_THRESHOLD: f64 = 0.3;
pub const RECENT_WINDOW: usize = 3;
pub const LOW_SCORE_THRESHOLD: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quadrant {
    Thriving,
    TryingHard,
    NeedsChallenge,
    AtRisk,
}

impl Quadrant {
    pub fn classify(engagement: f64, comprehension: f64) -> Quadrant {
        let engaged = engagement >= QUADRANT_MIDPOINT;
        let understands = comprehension >= QUADRANT_MIDPOINT;
        match (engaged, understands) {
            (true, true) => Quadrant::Thriving,
            (true, false) => Quadrant::TryingHard,
            (false, true) => Quadrant::NeedsChallenge,
            (false, false) => Quadrant::AtRisk,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::Thriving => "Thriving",
            Quadrant::TryingHard => "Trying Hard",
            Quadrant::NeedsChallenge => "Needs Challenge",
            Quadrant::AtRisk => "At Risk",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a single session felt, from its own two scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionFeel {
    Thriving,
    TryingHard,
    BoredOrEasy,
    Struggling,
}

impl SessionFeel {
    pub fn classify(engagement: i32, comprehension: i32) -> SessionFeel {
        match (
            engagement >= SESSION_FEEL_MIDPOINT,
            comprehension >= SESSION_FEEL_MIDPOINT,
        ) {
            (true, true) => SessionFeel::Thriving,
            (true, false) => SessionFeel::TryingHard,
            (false, true) => SessionFeel::BoredOrEasy,
            (false, false) => SessionFeel::Struggling,
        }
    }

    pub fn of(session: &Session) -> SessionFeel {
        SessionFeel::classify(session.engagement_score, session.comprehension_score)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionFeel::Thriving => "Thriving",
            SessionFeel::TryingHard => "Trying Hard",
            SessionFeel::BoredOrEasy => "Bored/Easy",
            SessionFeel::Struggling => "Struggling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixPoint {
    pub student_id: Uuid,
    pub student_name: String,
    pub avg_engagement: f64,
    pub avg_comprehension: f64,
    pub session_count: usize,
    pub quadrant: Quadrant,
}

/// Average engagement and comprehension per student over completed sessions.
pub fn engagement_matrix(sessions: &[Session], names: &StudentNames) -> Vec<MatrixPoint> {
    let mut sums: HashMap<Uuid, (i64, i64, usize)> = HashMap::new();

    for session in sessions.iter().filter(|s| s.is_completed()) {
        let entry = sums.entry(session.student_id).or_insert((0, 0, 0));
        entry.0 += session.engagement_score as i64;
        entry.1 += session.comprehension_score as i64;
        entry.2 += 1;
    }

    let mut points: Vec<MatrixPoint> = sums
        .into_iter()
        .map(|(student_id, (engagement, comprehension, count))| {
            let avg_engagement = engagement as f64 / count as f64;
            let avg_comprehension = comprehension as f64 / count as f64;
            MatrixPoint {
                student_id,
                student_name: names.get(student_id).to_string(),
                avg_engagement,
                avg_comprehension,
                session_count: count,
                quadrant: Quadrant::classify(avg_engagement, avg_comprehension),
            }
        })
        .collect();

    points.sort_by(|a, b| a.student_name.cmp(&b.student_name));
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_reason_count(count: usize) -> RiskTier {
        match count {
            0 => RiskTier::Low,
            1 | 2 => RiskTier::Medium,
            _ => RiskTier::High,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskReason {
    Stale { days: i64 },
    NoCompletedSessions,
    HighCancellation { rate: f64 },
    LowEngagement { average: f64 },
    LowComprehension { average: f64 },
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskReason::Stale { days } => write!(f, "No session in {days} days"),
            RiskReason::NoCompletedSessions => f.write_str("No completed sessions"),
            RiskReason::HighCancellation { rate } => {
                write!(f, "{:.0}% cancellation rate", (rate * 100.0).round())
            }
            RiskReason::LowEngagement { average } => {
                write!(f, "Low recent engagement ({average:.1}/10)")
            }
            RiskReason::LowComprehension { average } => {
                write!(f, "Low recent comprehension ({average:.1}/10)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionRisk {
    pub student_id: Uuid,
    pub student_name: String,
    pub tier: RiskTier,
    pub reasons: Vec<RiskReason>,
}

/// Flags every active student against the retention rules, most flags first.
pub fn retention_risks(snapshot: &Snapshot, today: NaiveDate) -> Vec<RetentionRisk> {
    let mut risks: Vec<RetentionRisk> = snapshot
        .students
        .iter()
        .filter(|s| s.status == StudentStatus::Active)
        .map(|student| {
            let history: Vec<&Session> = snapshot
                .sessions
                .iter()
                .filter(|s| s.student_id == student.id)
                .collect();
            let reasons = retention_reasons(&history, today);
            RetentionRisk {
                student_id: student.id,
                student_name: student.name.clone(),
                tier: RiskTier::from_reason_count(reasons.len()),
                reasons,
            }
        })
        .collect();

    risks.sort_by(|a, b| b.reasons.len().cmp(&a.reasons.len()));
    risks
}

pub fn retention_reasons(history: &[&Session], today: NaiveDate) -> Vec<RiskReason> {
    let mut reasons = Vec::new();

    let mut completed: Vec<&Session> = history.iter().copied().filter(|s| s.is_completed()).collect();
    completed.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date));
    let missed = history.iter().filter(|s| s.status.is_missed()).count();

    match completed.first() {
        Some(last) => {
            // The day of the session counts, so yesterday reads as two days ago.
            let days = (today - last.scheduled_date).num_days() + 1;
            if days > STALE_AFTER_DAYS {
                reasons.push(RiskReason::Stale { days });
            }
        }
        None => reasons.push(RiskReason::NoCompletedSessions),
    }

    if history.len() >= MIN_SESSIONS_FOR_CANCELLATION {
        let rate = missed as f64 / history.len() as f64;
        if rate > CANCELLATION_THRESHOLD {
            reasons.push(RiskReason::HighCancellation { rate });
        }
    }

    if completed.len() >= RECENT_WINDOW {
        let recent = &completed[..RECENT_WINDOW];
        let engagement = average(recent.iter().map(|s| s.engagement_score));
        if engagement < LOW_SCORE_THRESHOLD {
            reasons.push(RiskReason::LowEngagement { average: engagement });
        }
        let comprehension = average(recent.iter().map(|s| s.comprehension_score));
        if comprehension < LOW_SCORE_THRESHOLD {
            reasons.push(RiskReason::LowComprehension {
                average: comprehension,
            });
        }
    }

    reasons
}

fn average(values: impl Iterator<Item = i32>) -> f64 {
    let (sum, count) = values.fold((0i64, 0usize), |(sum, count), v| (sum + v as i64, count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use crate::models::{SessionStatus, Student};

    fn snapshot_for(students: Vec<Student>, sessions: Vec<Session>) -> Snapshot {
        Snapshot {
            students,
            sessions,
            ..Snapshot::default()
        }
    }

    #[test]
    fn quadrant_boundaries_sit_at_five_and_a_half() {
        assert_eq!(Quadrant::classify(5.5, 5.5), Quadrant::Thriving);
        assert_eq!(Quadrant::classify(5.5, 5.49), Quadrant::TryingHard);
        assert_eq!(Quadrant::classify(5.49, 5.5), Quadrant::NeedsChallenge);
        assert_eq!(Quadrant::classify(5.49, 5.49), Quadrant::AtRisk);
    }

    #[test]
    fn quadrant_covers_the_whole_score_grid() {
        for e in 1..=10 {
            for c in 1..=10 {
                let expected = match (e >= 6, c >= 6) {
                    (true, true) => Quadrant::Thriving,
                    (true, false) => Quadrant::TryingHard,
                    (false, true) => Quadrant::NeedsChallenge,
                    (false, false) => Quadrant::AtRisk,
                };
                assert_eq!(Quadrant::classify(e as f64, c as f64), expected);
            }
        }
    }

    #[test]
    fn session_feel_uses_six() {
        assert_eq!(SessionFeel::classify(6, 6), SessionFeel::Thriving);
        assert_eq!(SessionFeel::classify(6, 5), SessionFeel::TryingHard);
        assert_eq!(SessionFeel::classify(5, 9), SessionFeel::BoredOrEasy);
        assert_eq!(SessionFeel::classify(2, 2).label(), "Struggling");
    }

    #[test]
    fn matrix_averages_completed_sessions_only() {
        let alice = student("Alice", StudentStatus::Active);
        let names = StudentNames::from_students(std::slice::from_ref(&alice));
        let sessions = vec![
            scored(session(alice.id, "2024-01-01", SessionStatus::Completed), 8, 4),
            scored(session(alice.id, "2024-01-08", SessionStatus::Completed), 6, 2),
            scored(session(alice.id, "2024-01-15", SessionStatus::Cancelled), 1, 1),
        ];

        let points = engagement_matrix(&sessions, &names);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].avg_engagement, 7.0);
        assert_eq!(points[0].avg_comprehension, 3.0);
        assert_eq!(points[0].session_count, 2);
        assert_eq!(points[0].quadrant, Quadrant::TryingHard);
    }

    #[test]
    fn tier_follows_reason_count() {
        assert_eq!(RiskTier::from_reason_count(0), RiskTier::Low);
        assert_eq!(RiskTier::from_reason_count(1), RiskTier::Medium);
        assert_eq!(RiskTier::from_reason_count(2), RiskTier::Medium);
        assert_eq!(RiskTier::from_reason_count(3), RiskTier::High);
        assert_eq!(RiskTier::from_reason_count(4), RiskTier::High);
    }

    #[test]
    fn student_without_completed_sessions_is_flagged() {
        let dana = student("Dana", StudentStatus::Active);
        let snapshot = snapshot_for(vec![dana], vec![]);

        let risks = retention_risks(&snapshot, date("2024-06-01"));
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].reasons, vec![RiskReason::NoCompletedSessions]);
        assert!(risks[0].tier >= RiskTier::Medium);
    }

    #[test]
    fn inactive_students_are_skipped() {
        let paused = student("Pat", StudentStatus::Paused);
        let snapshot = snapshot_for(vec![paused], vec![]);
        assert!(retention_risks(&snapshot, date("2024-06-01")).is_empty());
    }

    #[test]
    fn stale_after_twenty_one_days() {
        let id = Uuid::new_v4();
        let sessions = [
            session(id, "2024-05-01", SessionStatus::Completed),
            session(id, "2024-05-10", SessionStatus::Completed),
        ];
        let history: Vec<&Session> = sessions.iter().collect();

        assert!(retention_reasons(&history, date("2024-05-30")).is_empty());
        assert_eq!(
            retention_reasons(&history, date("2024-05-31")),
            vec![RiskReason::Stale { days: 22 }]
        );
        assert_eq!(
            retention_reasons(&history, date("2024-05-31"))[0].to_string(),
            "No session in 22 days"
        );
    }

    #[test]
    fn cancellation_needs_three_sessions() {
        let id = Uuid::new_v4();
        let two = [
            session(id, "2024-05-30", SessionStatus::Completed),
            session(id, "2024-05-31", SessionStatus::NoShow),
        ];
        let history: Vec<&Session> = two.iter().collect();
        assert!(retention_reasons(&history, date("2024-06-01")).is_empty());

        let three = [
            session(id, "2024-05-29", SessionStatus::Completed),
            session(id, "2024-05-30", SessionStatus::Completed),
            session(id, "2024-05-31", SessionStatus::Cancelled),
        ];
        let history: Vec<&Session> = three.iter().collect();
        let reasons = retention_reasons(&history, date("2024-06-01"));
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].to_string(), "33% cancellation rate");
    }

    #[test]
    fn low_recent_scores_use_last_three_completed() {
        let id = Uuid::new_v4();
        let sessions = [
            scored(session(id, "2024-05-01", SessionStatus::Completed), 10, 10),
            scored(session(id, "2024-05-20", SessionStatus::Completed), 3, 5),
            scored(session(id, "2024-05-22", SessionStatus::Completed), 4, 3),
            scored(session(id, "2024-05-25", SessionStatus::Completed), 2, 3),
        ];
        let history: Vec<&Session> = sessions.iter().collect();

        let reasons = retention_reasons(&history, date("2024-06-01"));
        assert_eq!(
            reasons,
            vec![
                RiskReason::LowEngagement { average: 3.0 },
                RiskReason::LowComprehension {
                    average: 11.0 / 3.0
                },
            ]
        );
        assert_eq!(reasons[0].to_string(), "Low recent engagement (3.0/10)");
        assert_eq!(reasons[1].to_string(), "Low recent comprehension (3.7/10)");
    }

    #[test]
    fn riskiest_students_sort_first() {
        let calm = student("Calm", StudentStatus::Active);
        let shaky = student("Shaky", StudentStatus::Active);
        let mut sessions = Vec::new();
        sessions.push(session(calm.id, "2024-05-30", SessionStatus::Completed));
        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            sessions.push(scored(session(shaky.id, day, SessionStatus::Completed), 2, 2));
        }
        sessions.push(session(shaky.id, "2024-03-04", SessionStatus::Cancelled));
        sessions.push(session(shaky.id, "2024-03-05", SessionStatus::Cancelled));

        let snapshot = snapshot_for(vec![calm, shaky], sessions);
        let risks = retention_risks(&snapshot, date("2024-06-01"));

        assert_eq!(risks[0].student_name, "Shaky");
        assert_eq!(risks[0].reasons.len(), 4);
        assert_eq!(risks[0].tier, RiskTier::High);
        assert_eq!(risks[1].student_name, "Calm");
        assert_eq!(risks[1].tier, RiskTier::Low);
    }
}
