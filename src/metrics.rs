use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Session, StudentNames};

/// Cancellation rates above this percentage are called out in reports.
pub const HIGH_CANCELLATION_RATE: f64 = 15.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub session_count: usize,
    pub completed_count: usize,
    pub cancelled_count: usize,
    pub total_revenue: f64,
    pub total_hours: f64,
    pub effective_hourly_rate: f64,
    pub cancellation_rate: f64,
    pub lost_revenue: f64,
}

impl SessionMetrics {
    pub fn has_high_cancellation(&self) -> bool {
        self.cancellation_rate > HIGH_CANCELLATION_RATE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRevenue {
    pub student_id: Uuid,
    pub student_name: String,
    pub revenue: f64,
    pub session_count: usize,
    pub hours: f64,
}

pub fn compute_metrics(sessions: &[Session]) -> SessionMetrics {
    let mut completed_count = 0usize;
    let mut cancelled_count = 0usize;
    let mut total_revenue = 0.0;
    let mut total_minutes = 0.0;

    for session in sessions {
        if session.is_completed() {
            completed_count += 1;
            total_revenue += session.amount;
            total_minutes += session.duration_minutes as f64;
        } else if session.status.is_missed() {
            cancelled_count += 1;
        }
    }

    let total_hours = total_minutes / 60.0;
    let effective_hourly_rate = if total_hours > 0.0 {
        total_revenue / total_hours
    } else {
        0.0
    };
    let cancellation_rate = if sessions.is_empty() {
        0.0
    } else {
        cancelled_count as f64 / sessions.len() as f64 * 100.0
    };
    let average_revenue = if completed_count > 0 {
        total_revenue / completed_count as f64
    } else {
        0.0
    };

    SessionMetrics {
        session_count: sessions.len(),
        completed_count,
        cancelled_count,
        total_revenue,
        total_hours,
        effective_hourly_rate,
        cancellation_rate,
        lost_revenue: cancelled_count as f64 * average_revenue,
    }
}

/// Completed-session revenue per student, largest earner first.
pub fn revenue_by_student(sessions: &[Session], names: &StudentNames) -> Vec<StudentRevenue> {
    let mut totals: HashMap<Uuid, StudentRevenue> = HashMap::new();

    for session in sessions.iter().filter(|s| s.is_completed()) {
        let entry = totals
            .entry(session.student_id)
            .or_insert_with(|| StudentRevenue {
                student_id: session.student_id,
                student_name: names.get(session.student_id).to_string(),
                revenue: 0.0,
                session_count: 0,
                hours: 0.0,
            });

        entry.revenue += session.amount;
        entry.session_count += 1;
        entry.hours += session.duration_minutes as f64 / 60.0;
    }

    let mut values: Vec<StudentRevenue> = totals.into_values().collect();
    values.sort_by(|a, b| {
        b.revenue
            .partial_cmp(&a.revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    values
}
