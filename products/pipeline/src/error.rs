use rust_decimal::Decimal;
use thiserror::Error;

use crate::stage::Stage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Every failure the engine can report. Nothing is clamped or defaulted on
/// the caller's behalf; bad input always comes back as one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid commission input: {0}")]
    Commission(#[from] CommissionError),
    #[error("invalid stage transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("milestone {0} not found")]
    MilestoneNotFound(String),
}

/// Coarse taxonomy callers switch on when choosing what to tell the user.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) | PipelineError::Commission(_) => ErrorKind::Validation,
            PipelineError::MilestoneNotFound(_) => ErrorKind::NotFound,
            PipelineError::InvalidTransition(_) => ErrorKind::InvalidTransition,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("unknown transaction type `{0}`")]
    UnknownTransactionType(String),
    #[error("probability {0} outside 0..=100")]
    ProbabilityOutOfRange(i64),
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("duplicate milestone id `{0}`")]
    DuplicateMilestone(String),
    #[error("milestone `{0}` completion flag and completion date disagree")]
    CompletionMismatch(String),
    #[error("{field} is earlier than createdAt")]
    BeforeCreated { field: &'static str },
    #[error("closedDate is set but stage {0} is still open")]
    ClosedWhileActive(Stage),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommissionError {
    #[error("amount {0} is negative")]
    NegativeAmount(i64),
    #[error("amount {0} exceeds the supported maximum")]
    AmountTooLarge(i64),
    #[error("rate {0} outside 0..=100")]
    RateOutOfRange(Decimal),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransitionError {
    #[error("transaction is already {from} and cannot move to {to}")]
    FromTerminal { from: Stage, to: Stage },
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("no stage follows {0}")]
    NoForwardStage(Stage),
}
