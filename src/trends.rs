use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Assessment, StudentNames};

/// How many improvements the report surfaces.
pub const TOP_IMPROVEMENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Up,
    Down,
    Flat,
    Insufficient,
}

impl Trend {
    /// Compares the last two points of a chronologically sorted series.
    pub fn of(series: &[ScorePoint]) -> Trend {
        match series {
            [.., previous, last] => match last.score.cmp(&previous.score) {
                std::cmp::Ordering::Greater => Trend::Up,
                std::cmp::Ordering::Less => Trend::Down,
                std::cmp::Ordering::Equal => Trend::Flat,
            },
            _ => Trend::Insufficient,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Flat => "→",
            Trend::Insufficient => "—",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
    Poor,
}

impl ScoreBand {
    pub fn of(score: i32) -> ScoreBand {
        match score {
            s if s >= 8 => ScoreBand::Strong,
            s if s >= 6 => ScoreBand::Fair,
            s if s >= 4 => ScoreBand::Weak,
            _ => ScoreBand::Poor,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Strong => "strong",
            ScoreBand::Fair => "fair",
            ScoreBand::Weak => "weak",
            ScoreBand::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScorePoint {
    pub score: i32,
    pub assessed_at: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillSeries {
    pub skill: String,
    pub points: Vec<ScorePoint>,
    pub trend: Trend,
}

impl SkillSeries {
    pub fn latest(&self) -> Option<&ScorePoint> {
        self.points.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSkills {
    pub student_id: Uuid,
    pub student_name: String,
    pub skills: Vec<SkillSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillImprovement {
    pub student_id: Uuid,
    pub student_name: String,
    pub skill: String,
    pub start: i32,
    pub end: i32,
    pub change: i32,
}

type Grouped<'a> = BTreeMap<Uuid, BTreeMap<&'a str, Vec<ScorePoint>>>;

fn group_series(assessments: &[Assessment]) -> Grouped<'_> {
    let mut grouped: Grouped<'_> = BTreeMap::new();

    for assessment in assessments {
        grouped
            .entry(assessment.student_id)
            .or_default()
            .entry(assessment.skill_name.as_str())
            .or_default()
            .push(ScorePoint {
                score: assessment.score,
                assessed_at: assessment.assessed_at,
            });
    }

    for skills in grouped.values_mut() {
        for points in skills.values_mut() {
            points.sort_by(|a, b| a.assessed_at.cmp(&b.assessed_at));
        }
    }

    grouped
}

/// Per-student, per-skill score history in chronological order.
pub fn skill_trajectories(assessments: &[Assessment], names: &StudentNames) -> Vec<StudentSkills> {
    let mut students: Vec<StudentSkills> = group_series(assessments)
        .into_iter()
        .map(|(student_id, skills)| StudentSkills {
            student_id,
            student_name: names.get(student_id).to_string(),
            skills: skills
                .into_iter()
                .map(|(skill, points)| SkillSeries {
                    skill: skill.to_string(),
                    trend: Trend::of(&points),
                    points,
                })
                .collect(),
        })
        .collect();

    students.sort_by(|a, b| a.student_name.cmp(&b.student_name));
    students
}

/// First-to-last change for every series with two or more scores, biggest gain first.
pub fn skill_improvements(assessments: &[Assessment], names: &StudentNames) -> Vec<SkillImprovement> {
    let mut improvements = Vec::new();

    for (student_id, skills) in group_series(assessments) {
        for (skill, points) in skills {
            if let [first, .., last] = points.as_slice() {
                improvements.push(SkillImprovement {
                    student_id,
                    student_name: names.get(student_id).to_string(),
                    skill: skill.to_string(),
                    start: first.score,
                    end: last.score,
                    change: last.score - first.score,
                });
            }
        }
    }

    improvements.sort_by(|a, b| b.change.cmp(&a.change));
    improvements
}
