use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Goal, GoalStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoalSummary {
    pub total: usize,
    pub active: usize,
    pub achieved: usize,
    pub abandoned: usize,
    pub overdue: usize,
    pub achievement_rate: f64,
}

pub fn summarize_goals(goals: &[Goal], today: NaiveDate) -> GoalSummary {
    let count = |status: GoalStatus| goals.iter().filter(|g| g.status == status).count();
    let achieved = count(GoalStatus::Achieved);

    GoalSummary {
        total: goals.len(),
        active: count(GoalStatus::Active),
        achieved,
        abandoned: count(GoalStatus::Abandoned),
        overdue: goals.iter().filter(|g| g.is_overdue(today)).count(),
        achievement_rate: if goals.is_empty() {
            0.0
        } else {
            achieved as f64 / goals.len() as f64 * 100.0
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum GoalUrgency {
    Overdue(i64),
    DueSoon(i64),
    Upcoming(i64),
    OnTrack(i64),
}

impl GoalUrgency {
    /// Only active goals with a target date have an urgency.
    pub fn of(goal: &Goal, today: NaiveDate) -> Option<GoalUrgency> {
        if goal.status != GoalStatus::Active {
            return None;
        }
        let days = (goal.target_date? - today).num_days();
        Some(match days {
            d if d < 0 => GoalUrgency::Overdue(-d),
            d if d <= 7 => GoalUrgency::DueSoon(d),
            d if d <= 30 => GoalUrgency::Upcoming(d),
            d => GoalUrgency::OnTrack(d),
        })
    }

    pub fn label(self) -> String {
        match self {
            GoalUrgency::Overdue(days) => format!("{days}d overdue"),
            GoalUrgency::DueSoon(days) | GoalUrgency::Upcoming(days) | GoalUrgency::OnTrack(days) => {
                format!("{days}d left")
            }
        }
    }
}
