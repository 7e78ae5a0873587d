//! The transaction aggregate: one deal with its stage, milestones and
//! commission.
//!
//! Fields are private so that the derived values (`probability`,
//! `commission.amount_cents`, `closed_at`, the stage history) can only change
//! through the operations below. Every operation borrows `self` and hands back
//! a new value; the original is never touched.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::commission::{self, Commission, CommissionStatus};
use crate::error::{PipelineError, PipelineResult, TransitionError, ValidationError};
use crate::milestone::{self, Milestone, MilestoneProgress, MilestoneStatus};
use crate::stage::Stage;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Sale,
    Purchase,
    Lease,
    Rental,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Sale => "Sale",
            TransactionType::Purchase => "Purchase",
            TransactionType::Lease => "Lease",
            TransactionType::Rental => "Rental",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            TransactionType::Sale,
            TransactionType::Purchase,
            TransactionType::Lease,
            TransactionType::Rental,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| ValidationError::UnknownTransactionType(value.to_string()))
    }
}

/// One entry of the append-only stage log. `from` is `None` for the stage a
/// transaction was created in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChange {
    #[serde(default)]
    pub from: Option<Stage>,
    pub to: Stage,
    pub changed_at: DateTime<Utc>,
}

/// Raw, JSON-shaped transaction as exchanged with the persistence layer.
/// Derived fields are optional on the way in and always recomputed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub title: String,
    pub amount_cents: i64,
    pub stage: String,
    #[serde(default)]
    pub probability: Option<i64>,
    #[serde(default)]
    pub probability_overridden: bool,
    pub expected_close_date: NaiveDate,
    pub transaction_type: String,
    pub commission: CommissionRecord,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, rename = "closedDate", skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_history: Vec<StageChange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRecord {
    pub rate: Decimal,
    #[serde(default)]
    pub amount_cents: Option<i64>,
}

/// Input for opening a new deal. The milestone template is chosen by the
/// caller; the engine takes it as given.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub title: String,
    pub amount_cents: i64,
    pub stage: Stage,
    pub expected_close_date: NaiveDate,
    pub transaction_type: TransactionType,
    pub commission_rate: Decimal,
    pub milestones: Vec<Milestone>,
    pub assigned_user_id: Option<String>,
    pub assigned_user_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "TransactionRecord", try_from = "TransactionRecord")]
pub struct Transaction {
    id: String,
    title: String,
    amount_cents: i64,
    stage: Stage,
    probability: u8,
    probability_overridden: bool,
    expected_close_date: NaiveDate,
    transaction_type: TransactionType,
    commission: Commission,
    milestones: Vec<Milestone>,
    assigned_user_id: Option<String>,
    assigned_user_name: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    stage_history: Vec<StageChange>,
}

impl Transaction {
    pub fn create(draft: NewTransaction, now: DateTime<Utc>) -> PipelineResult<Self> {
        validate_title(&draft.title)?;
        validate_milestones(&draft.milestones)?;
        let commission = Commission::new(draft.amount_cents, draft.commission_rate)?;
        let stage = draft.stage;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            amount_cents: draft.amount_cents,
            stage,
            probability: stage.default_probability(),
            probability_overridden: false,
            expected_close_date: draft.expected_close_date,
            transaction_type: draft.transaction_type,
            commission,
            milestones: draft.milestones,
            assigned_user_id: draft.assigned_user_id,
            assigned_user_name: draft.assigned_user_name,
            created_at: now,
            modified_at: now,
            closed_at: stage.is_terminal().then_some(now),
            stage_history: vec![StageChange {
                from: None,
                to: stage,
                changed_at: now,
            }],
        })
    }

    pub fn from_record(record: TransactionRecord) -> PipelineResult<Self> {
        let stage: Stage = record.stage.parse()?;
        let transaction_type: TransactionType = record.transaction_type.parse()?;
        validate_title(&record.title)?;
        validate_milestones(&record.milestones)?;
        validate_timestamps(&record, stage)?;
        let commission = Commission::new(record.amount_cents, record.commission.rate)?;

        let default = stage.default_probability();
        let (probability, probability_overridden) = match record.probability {
            None => (default, false),
            Some(value) => {
                let value = validate_probability(value)?;
                (value, record.probability_overridden || value != default)
            }
        };

        Ok(Self {
            id: record.id,
            title: record.title,
            amount_cents: record.amount_cents,
            stage,
            probability,
            probability_overridden,
            expected_close_date: record.expected_close_date,
            transaction_type,
            commission,
            milestones: record.milestones,
            assigned_user_id: record.assigned_user_id,
            assigned_user_name: record.assigned_user_name,
            created_at: record.created_at,
            modified_at: record.modified_at,
            closed_at: record.closed_at,
            stage_history: record.stage_history,
        })
    }

    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            amount_cents: self.amount_cents,
            stage: self.stage.label().to_string(),
            probability: Some(i64::from(self.probability)),
            probability_overridden: self.probability_overridden,
            expected_close_date: self.expected_close_date,
            transaction_type: self.transaction_type.as_str().to_string(),
            commission: CommissionRecord {
                rate: self.commission.rate,
                amount_cents: Some(self.commission.amount_cents),
            },
            milestones: self.milestones.clone(),
            assigned_user_id: self.assigned_user_id.clone(),
            assigned_user_name: self.assigned_user_name.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
            closed_at: self.closed_at,
            stage_history: self.stage_history.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn amount_cents(&self) -> i64 {
        self.amount_cents
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn probability_overridden(&self) -> bool {
        self.probability_overridden
    }

    pub fn expected_close_date(&self) -> NaiveDate {
        self.expected_close_date
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn commission(&self) -> Commission {
        self.commission
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn assigned_user_id(&self) -> Option<&str> {
        self.assigned_user_id.as_deref()
    }

    pub fn assigned_user_name(&self) -> Option<&str> {
        self.assigned_user_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// When the deal entered Closed Won or Closed Lost.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn stage_history(&self) -> &[StageChange] {
        &self.stage_history
    }

    pub fn is_active(&self) -> bool {
        self.stage.is_active()
    }

    pub fn is_closed(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_won(&self) -> bool {
        self.stage.is_won()
    }

    /// Open deal whose expected close date has already passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.expected_close_date < today
    }

    /// Negative once the expected close date is behind `today`.
    pub fn days_until_close(&self, today: NaiveDate) -> i64 {
        (self.expected_close_date - today).num_days()
    }

    pub fn commission_status(&self) -> CommissionStatus {
        commission::status(self)
    }

    /// Probability-weighted amount, truncated to whole cents.
    pub fn expected_value_cents(&self) -> i64 {
        let weighted = i128::from(self.amount_cents) * i128::from(self.probability) / 100;
        i64::try_from(weighted).unwrap_or(i64::MAX)
    }

    pub fn milestone_progress(&self) -> MilestoneProgress {
        milestone::progress(&self.milestones)
    }

    pub fn next_milestone(&self) -> Option<&Milestone> {
        milestone::next_pending(&self.milestones)
    }

    pub fn milestone_statuses(&self, today: NaiveDate) -> Vec<(String, MilestoneStatus)> {
        milestone::statuses(&self.milestones, today)
    }

    /// Moves the deal to `target`, resetting probability to the stage default
    /// and clearing any override. Closed deals accept no transitions.
    pub fn transition(&self, target: Stage, now: DateTime<Utc>) -> PipelineResult<Self> {
        self.stage.check_transition(target)?;
        let mut next = self.clone();
        if target != self.stage {
            next.stage_history.push(StageChange {
                from: Some(self.stage),
                to: target,
                changed_at: now,
            });
            debug!(transaction_id = %self.id, from = %self.stage, to = %target, "stage changed");
        }
        next.stage = target;
        next.probability = target.default_probability();
        next.probability_overridden = false;
        if target.is_terminal() {
            next.closed_at = Some(now);
        }
        next.modified_at = now;
        Ok(next)
    }

    /// Transition from a free-text stage picker.
    pub fn transition_named(&self, target: &str, now: DateTime<Utc>) -> PipelineResult<Self> {
        let target: Stage = target
            .parse()
            .map_err(|_| TransitionError::UnknownStage(target.to_string()))?;
        self.transition(target, now)
    }

    /// One step along the forward path. Never reaches Closed Lost.
    pub fn advance(&self, now: DateTime<Utc>) -> PipelineResult<Self> {
        let target = self
            .stage
            .next_forward()
            .ok_or(TransitionError::NoForwardStage(self.stage))?;
        self.transition(target, now)
    }

    pub fn complete_milestone(&self, milestone_id: &str, now: DateTime<Utc>) -> PipelineResult<Self> {
        let milestones = milestone::complete(&self.milestones, milestone_id, now)?;
        if milestones == self.milestones {
            return Ok(self.clone());
        }
        debug!(transaction_id = %self.id, milestone_id, "milestone completed");
        Ok(self.with_milestones(milestones, now))
    }

    pub fn reopen_milestone(&self, milestone_id: &str, now: DateTime<Utc>) -> PipelineResult<Self> {
        let milestones = milestone::reopen(&self.milestones, milestone_id)?;
        if milestones == self.milestones {
            return Ok(self.clone());
        }
        Ok(self.with_milestones(milestones, now))
    }

    pub fn update_amount(&self, amount_cents: i64, now: DateTime<Utc>) -> PipelineResult<Self> {
        let commission = Commission::new(amount_cents, self.commission.rate)?;
        let mut next = self.clone();
        next.amount_cents = amount_cents;
        next.commission = commission;
        next.modified_at = now;
        Ok(next)
    }

    pub fn update_commission_rate(&self, rate: Decimal, now: DateTime<Utc>) -> PipelineResult<Self> {
        let commission = Commission::new(self.amount_cents, rate)?;
        let mut next = self.clone();
        next.commission = commission;
        next.modified_at = now;
        Ok(next)
    }

    /// Pins probability to a user-chosen value until the next transition.
    pub fn override_probability(&self, probability: i64, now: DateTime<Utc>) -> PipelineResult<Self> {
        let probability = validate_probability(probability)?;
        let mut next = self.clone();
        next.probability = probability;
        next.probability_overridden = true;
        next.modified_at = now;
        Ok(next)
    }

    pub fn reassign(
        &self,
        user_id: Option<String>,
        user_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        next.assigned_user_id = user_id;
        next.assigned_user_name = user_name;
        next.modified_at = now;
        next
    }

    fn with_milestones(&self, milestones: Vec<Milestone>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.milestones = milestones;
        next.modified_at = now;
        next
    }
}

impl From<Transaction> for TransactionRecord {
    fn from(value: Transaction) -> Self {
        value.to_record()
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = PipelineError;

    fn try_from(value: TransactionRecord) -> Result<Self, Self::Error> {
        Transaction::from_record(value)
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "title" });
    }
    Ok(())
}

/// `modifiedAt` and `closedDate` never precede `createdAt`, and only a closed
/// stage carries a `closedDate`.
fn validate_timestamps(record: &TransactionRecord, stage: Stage) -> Result<(), ValidationError> {
    if record.modified_at < record.created_at {
        return Err(ValidationError::BeforeCreated { field: "modifiedAt" });
    }
    if let Some(closed_at) = record.closed_at {
        if stage.is_active() {
            return Err(ValidationError::ClosedWhileActive(stage));
        }
        if closed_at < record.created_at {
            return Err(ValidationError::BeforeCreated { field: "closedDate" });
        }
    }
    Ok(())
}

fn validate_probability(value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(ValidationError::ProbabilityOutOfRange(value))
}

fn validate_milestones(milestones: &[Milestone]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for m in milestones {
        if m.id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "milestone.id" });
        }
        if m.name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "milestone.name" });
        }
        if m.description.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "milestone.description",
            });
        }
        if m.completed != m.completed_at.is_some() {
            return Err(ValidationError::CompletionMismatch(m.id.clone()));
        }
        if !seen.insert(m.id.as_str()) {
            return Err(ValidationError::DuplicateMilestone(m.id.clone()));
        }
    }
    Ok(())
}
