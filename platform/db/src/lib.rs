//! Storage seam for transaction aggregates.
//!
//! The engine never knows which version is stored; this crate does. Every
//! write is a compare-and-swap on `modified_at`, so two writers that read the
//! same snapshot cannot both land.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use products_pipeline::{PipelineError, Transaction};
use thiserror::Error;
use tracing::{debug, info_span, warn};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("transaction {0} already exists")]
    AlreadyExists(String),
    #[error("transaction {id} was modified at {actual}, expected {expected}")]
    ConcurrentModification {
        id: String,
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

pub trait TransactionStore: Send + Sync {
    fn get(&self, id: &str) -> DbResult<Option<Transaction>>;

    /// All stored transactions, ordered by id.
    fn list(&self) -> DbResult<Vec<Transaction>>;

    fn insert(&self, transaction: Transaction) -> DbResult<()>;

    /// Replaces the stored aggregate only if it still carries
    /// `expected_modified_at`.
    fn compare_and_swap(
        &self,
        expected_modified_at: DateTime<Utc>,
        next: Transaction,
    ) -> DbResult<Transaction>;
}

/// Read, apply one engine operation, write back. Stale writes surface as
/// [`DbError::ConcurrentModification`]; retrying is up to the caller.
pub fn update_with<S, F>(store: &S, id: &str, apply: F) -> DbResult<Transaction>
where
    S: TransactionStore + ?Sized,
    F: FnOnce(&Transaction) -> Result<Transaction, PipelineError>,
{
    let span = info_span!("store.update", transaction_id = %id);
    let _guard = span.enter();
    let current = store
        .get(id)?
        .ok_or_else(|| DbError::NotFound(id.to_string()))?;
    let next = apply(&current)?;
    store.compare_and_swap(current.modified_at(), next)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, Transaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(transactions: impl IntoIterator<Item = Transaction>) -> DbResult<Self> {
        let store = Self::new();
        for tx in transactions {
            store.insert(tx)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> DbResult<usize> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned)?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl TransactionStore for MemoryStore {
    fn get(&self, id: &str) -> DbResult<Option<Transaction>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned)?;
        Ok(rows.get(id).cloned())
    }

    fn list(&self) -> DbResult<Vec<Transaction>> {
        let rows = self.rows.read().map_err(|_| DbError::Poisoned)?;
        let mut all: Vec<Transaction> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(all)
    }

    fn insert(&self, transaction: Transaction) -> DbResult<()> {
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned)?;
        if rows.contains_key(transaction.id()) {
            return Err(DbError::AlreadyExists(transaction.id().to_string()));
        }
        debug!(transaction_id = %transaction.id(), "transaction inserted");
        rows.insert(transaction.id().to_string(), transaction);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        expected_modified_at: DateTime<Utc>,
        next: Transaction,
    ) -> DbResult<Transaction> {
        let mut rows = self.rows.write().map_err(|_| DbError::Poisoned)?;
        let stored = rows
            .get(next.id())
            .ok_or_else(|| DbError::NotFound(next.id().to_string()))?;
        if stored.modified_at() != expected_modified_at {
            warn!(
                transaction_id = %next.id(),
                expected = %expected_modified_at,
                actual = %stored.modified_at(),
                "rejected stale write"
            );
            return Err(DbError::ConcurrentModification {
                id: next.id().to_string(),
                expected: expected_modified_at,
                actual: stored.modified_at(),
            });
        }
        rows.insert(next.id().to_string(), next.clone());
        Ok(next)
    }
}
