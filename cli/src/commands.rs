use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use platform_api::{ApiError, ApiResult};
use platform_db::{MemoryStore, TransactionStore, update_with};
use products_pipeline::{
    Milestone, MilestoneProgress, MilestoneStatus, PipelineError, PipelineSummary, Transaction,
    TransactionRecord, analytics,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

/// A JSON file of transaction records loaded into a store. Keeps the file's
/// record order so rewrites produce minimal diffs.
pub struct Workspace {
    path: PathBuf,
    order: Vec<String>,
    store: MemoryStore,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneReport {
    pub transaction_id: String,
    pub progress: MilestoneProgress,
    pub next: Option<Milestone>,
    pub days_until_close: i64,
    pub overdue: bool,
    pub milestones: Vec<MilestoneLine>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneLine {
    pub id: String,
    pub name: String,
    pub due_date: NaiveDate,
    pub status: MilestoneStatus,
}

/// One write against a single transaction.
#[derive(Clone, Debug)]
pub enum Mutation {
    Transition(String),
    Advance,
    Complete(String),
    Reopen(String),
    Commission {
        amount_cents: Option<i64>,
        rate: Option<Decimal>,
    },
}

impl Mutation {
    fn apply(&self, tx: &Transaction, now: DateTime<Utc>) -> Result<Transaction, PipelineError> {
        match self {
            Mutation::Transition(stage) => tx.transition_named(stage, now),
            Mutation::Advance => tx.advance(now),
            Mutation::Complete(milestone) => tx.complete_milestone(milestone, now),
            Mutation::Reopen(milestone) => tx.reopen_milestone(milestone, now),
            Mutation::Commission { amount_cents, rate } => {
                let mut next = tx.clone();
                if let Some(amount) = amount_cents {
                    next = next.update_amount(*amount, now)?;
                }
                if let Some(rate) = rate {
                    next = next.update_commission_rate(*rate, now)?;
                }
                Ok(next)
            }
        }
    }
}

impl Workspace {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let records: Vec<TransactionRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of transactions", path.display()))?;

        let mut order = Vec::with_capacity(records.len());
        let mut transactions = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            let tx = Transaction::from_record(record).map_err(|err| {
                ApiError::InvalidInput(format!("transaction {id}: {err}"))
            })?;
            order.push(id);
            transactions.push(tx);
        }
        let store = MemoryStore::from_transactions(transactions).map_err(ApiError::from)?;
        info!(path = %path.display(), count = order.len(), "transactions loaded");
        Ok(Self { path, order, store })
    }

    pub fn transactions(&self) -> ApiResult<Vec<Transaction>> {
        let mut out = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let tx = self
                .store
                .get(id)?
                .ok_or_else(|| ApiError::NotFound(format!("transaction {id}")))?;
            out.push(tx);
        }
        Ok(out)
    }

    pub fn get(&self, id: &str) -> ApiResult<Transaction> {
        self.store
            .get(id)?
            .ok_or_else(|| ApiError::NotFound(format!("transaction {id}")))
    }

    #[instrument(name = "cli.report", skip_all)]
    pub fn report(&self, today: NaiveDate) -> ApiResult<PipelineSummary> {
        let transactions = self.transactions()?;
        Ok(analytics::summarize(&transactions, today))
    }

    #[instrument(name = "cli.milestones", skip(self))]
    pub fn milestones(&self, id: &str, today: NaiveDate) -> ApiResult<MilestoneReport> {
        let tx = self.get(id)?;
        let milestones = tx
            .milestones()
            .iter()
            .map(|m| MilestoneLine {
                id: m.id.clone(),
                name: m.name.clone(),
                due_date: m.due_date,
                status: m.status(today),
            })
            .collect();
        Ok(MilestoneReport {
            transaction_id: tx.id().to_string(),
            progress: tx.milestone_progress(),
            next: tx.next_milestone().cloned(),
            days_until_close: tx.days_until_close(today),
            overdue: tx.is_overdue(today),
            milestones,
        })
    }

    #[instrument(name = "cli.mutate", skip(self, now))]
    pub fn mutate(&self, id: &str, mutation: &Mutation, now: DateTime<Utc>) -> ApiResult<Transaction> {
        let updated = update_with(&self.store, id, |tx| mutation.apply(tx, now))?;
        info!(
            transaction_id = %updated.id(),
            stage = %updated.stage(),
            probability = updated.probability(),
            "transaction updated"
        );
        Ok(updated)
    }

    /// Rewrites the backing file with the current store contents.
    pub fn save(&self) -> Result<()> {
        let records: Vec<TransactionRecord> = self
            .transactions()?
            .iter()
            .map(Transaction::to_record)
            .collect();
        let body = serde_json::to_string_pretty(&records)?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!(path = %self.path.display(), "transactions saved");
        Ok(())
    }
}

pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io::Write;

    fn fixture() -> tempfile::NamedTempFile {
        let records = json!([
            {
                "id": "tx-100",
                "title": "14 Elm Street",
                "amountCents": 45_000_000,
                "stage": "Negotiation",
                "expectedCloseDate": "2025-04-30",
                "transactionType": "Sale",
                "commission": { "rate": 3.0 },
                "milestones": [
                    { "id": "inspection", "name": "Inspection", "description": "Home inspection", "dueDate": "2025-04-02" },
                    { "id": "appraisal", "name": "Appraisal", "description": "Lender appraisal", "dueDate": "2025-04-20" }
                ],
                "createdAt": "2025-01-05T09:00:00Z",
                "modifiedAt": "2025-03-01T09:00:00Z"
            },
            {
                "id": "tx-200",
                "title": "Unit 5B",
                "amountCents": 180_000,
                "stage": "Closed Won",
                "expectedCloseDate": "2025-02-01",
                "transactionType": "Rental",
                "commission": { "rate": 8.0 },
                "createdAt": "2025-01-01T00:00:00Z",
                "modifiedAt": "2025-01-21T00:00:00Z",
                "closedDate": "2025-01-21T00:00:00Z"
            }
        ]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{records}").unwrap();
        file
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    #[test]
    fn report_rolls_up_file() {
        let file = fixture();
        let ws = Workspace::open(file.path()).unwrap();
        let summary = ws.report(today()).unwrap();
        assert_eq!(summary.total_volume_cents, 45_000_000);
        assert_eq!(summary.closed_won_volume_cents, 180_000);
        assert_eq!(summary.commission_earned_cents, 14_400);
        assert_eq!(summary.commission_pending_cents, 1_350_000);
        assert_eq!(summary.average_close_days, Some(20.0));
    }

    #[test]
    fn milestone_report_classifies() {
        let file = fixture();
        let ws = Workspace::open(file.path()).unwrap();
        let report = ws.milestones("tx-100", today()).unwrap();
        assert_eq!(report.next.as_ref().map(|m| m.id.as_str()), Some("inspection"));
        assert_eq!(report.milestones[0].status, MilestoneStatus::DueSoon);
        assert_eq!(report.milestones[1].status, MilestoneStatus::OnTrack);
        assert_eq!(report.days_until_close, 29);
    }

    #[test]
    fn mutations_go_through_store_and_save() {
        let file = fixture();
        let ws = Workspace::open(file.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 15, 0, 0).unwrap();

        let won = ws.mutate("tx-100", &Mutation::Advance, now).unwrap();
        assert_eq!(won.probability(), 100);
        ws.save().unwrap();

        let reopened = Workspace::open(file.path()).unwrap();
        let tx = reopened.get("tx-100").unwrap();
        assert!(tx.is_won());
        assert_eq!(tx.closed_at(), Some(now));
        assert_eq!(reopened.transactions().unwrap()[0].id(), "tx-100");
    }

    #[test]
    fn closed_deal_rejects_transition() {
        let file = fixture();
        let ws = Workspace::open(file.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 15, 0, 0).unwrap();
        let err = ws
            .mutate("tx-200", &Mutation::Transition("Proposal".into()), now)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        let err = ws
            .mutate(
                "tx-100",
                &Mutation::Commission {
                    amount_cents: None,
                    rate: Some(Decimal::NEGATIVE_ONE),
                },
                now,
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn invalid_record_names_transaction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let bad = json!([{
            "id": "tx-9",
            "title": "Bad",
            "amountCents": -10,
            "stage": "Proposal",
            "expectedCloseDate": "2025-04-30",
            "transactionType": "Sale",
            "commission": { "rate": 3.0 },
            "createdAt": "2025-01-05T09:00:00Z",
            "modifiedAt": "2025-03-01T09:00:00Z"
        }]);
        write!(file, "{bad}").unwrap();
        let err = Workspace::open(file.path()).err().unwrap();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.code(), "INVALID_INPUT");
        assert!(api.to_string().contains("tx-9"));
    }
}
