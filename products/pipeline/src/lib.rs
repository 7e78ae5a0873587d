//! Transaction pipeline engine for real-estate deals.
//!
//! Everything in here is synchronous and side-effect free: callers hand in
//! `now`/`today`, every mutation returns a fresh [`Transaction`], and the
//! analytics in [`analytics`] are plain folds over a slice.

pub mod analytics;
pub mod commission;
pub mod error;
pub mod milestone;
pub mod stage;
pub mod transaction;

pub use analytics::{ForecastPoint, PipelineSummary, StageTotals, VelocityStats};
pub use commission::{Commission, CommissionStatus};
pub use error::{
    CommissionError, ErrorKind, PipelineError, PipelineResult, TransitionError, ValidationError,
};
pub use milestone::{Milestone, MilestoneProgress, MilestoneStatus};
pub use stage::Stage;
pub use transaction::{
    CommissionRecord, NewTransaction, StageChange, Transaction, TransactionRecord,
    TransactionType,
};
