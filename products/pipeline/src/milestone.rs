//! Ordered gating steps inside a single transaction.
//!
//! Stored order is the expected execution order, but completion is not gated
//! on it: any open milestone may be completed at any time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// A milestone due within this many days (inclusive) counts as due soon.
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub name: String,
    pub description: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, rename = "completedDate", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneStatus {
    Completed,
    Overdue,
    DueSoon,
    OnTrack,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MilestoneProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

impl Milestone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            due_date,
            completed: false,
            completed_at: None,
            assigned_to: None,
        }
    }

    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    pub fn status(&self, today: NaiveDate) -> MilestoneStatus {
        status(self, today)
    }
}

pub fn progress(milestones: &[Milestone]) -> MilestoneProgress {
    let total = milestones.len();
    let completed = milestones.iter().filter(|m| m.completed).count();
    let percent = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u8
    };
    MilestoneProgress {
        completed,
        total,
        percent,
    }
}

pub fn next_pending(milestones: &[Milestone]) -> Option<&Milestone> {
    milestones.iter().find(|m| !m.completed)
}

pub fn status(milestone: &Milestone, today: NaiveDate) -> MilestoneStatus {
    if milestone.completed {
        return MilestoneStatus::Completed;
    }
    let days_left = (milestone.due_date - today).num_days();
    if days_left < 0 {
        MilestoneStatus::Overdue
    } else if days_left <= DUE_SOON_DAYS {
        MilestoneStatus::DueSoon
    } else {
        MilestoneStatus::OnTrack
    }
}

/// Status of every milestone, in stored order.
pub fn statuses(milestones: &[Milestone], today: NaiveDate) -> Vec<(String, MilestoneStatus)> {
    milestones
        .iter()
        .map(|m| (m.id.clone(), status(m, today)))
        .collect()
}

/// Marks `milestone_id` complete as of `now`. Completing an already completed
/// milestone keeps the original completion date.
pub fn complete(
    milestones: &[Milestone],
    milestone_id: &str,
    now: DateTime<Utc>,
) -> PipelineResult<Vec<Milestone>> {
    update_one(milestones, milestone_id, |milestone| {
        if !milestone.completed {
            milestone.completed = true;
            milestone.completed_at = Some(now);
        }
    })
}

pub fn reopen(milestones: &[Milestone], milestone_id: &str) -> PipelineResult<Vec<Milestone>> {
    update_one(milestones, milestone_id, |milestone| {
        milestone.completed = false;
        milestone.completed_at = None;
    })
}

fn update_one<F>(milestones: &[Milestone], milestone_id: &str, apply: F) -> PipelineResult<Vec<Milestone>>
where
    F: FnOnce(&mut Milestone),
{
    let index = milestones
        .iter()
        .position(|m| m.id == milestone_id)
        .ok_or_else(|| PipelineError::MilestoneNotFound(milestone_id.to_string()))?;
    let mut next = milestones.to_vec();
    apply(&mut next[index]);
    Ok(next)
}
