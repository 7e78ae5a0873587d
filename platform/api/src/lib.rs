use std::sync::Arc;

use platform_db::DbError;
use products_pipeline::{ErrorKind, PipelineError};
use serde::Serialize;
use thiserror::Error;

/// Shared result type for UI/API callers of the pipeline.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("bad request: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }

    pub fn body(&self) -> ApiErrorBody {
        ApiErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// JSON error payload written by the CLI. Internal details never reach
/// `message`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        let message = value.to_string();
        match value.kind() {
            ErrorKind::Validation => ApiError::InvalidInput(message),
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::InvalidTransition => ApiError::InvalidTransition(message),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Pipeline(err) => err.into(),
            DbError::NotFound(id) => ApiError::NotFound(format!("transaction {id}")),
            err @ DbError::ConcurrentModification { .. } => ApiError::Conflict(err.to_string()),
            err @ DbError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            err @ DbError::Poisoned => {
                tracing::error!(error = %err, "store unavailable");
                ApiError::internal(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use products_pipeline::{CommissionError, Stage, TransitionError};

    #[test]
    fn internal_errors_are_masked() {
        let err = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(
            err.body(),
            ApiErrorBody {
                code: "INTERNAL",
                message: "internal server error".into(),
            }
        );
    }

    #[test]
    fn closed_deal_maps_to_invalid_transition() {
        let err: ApiError = PipelineError::from(TransitionError::FromTerminal {
            from: Stage::ClosedWon,
            to: Stage::Proposal,
        })
        .into();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(
            err.body().message,
            "invalid stage transition: transaction is already Closed Won and cannot move to Proposal"
        );
    }

    #[test]
    fn bad_amount_is_invalid_input() {
        let err: ApiError = PipelineError::from(CommissionError::NegativeAmount(-40)).into();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(
            serde_json::to_value(err.body()).unwrap(),
            serde_json::json!({
                "code": "INVALID_INPUT",
                "message": "bad request: invalid commission input: amount -40 is negative"
            })
        );
    }

    #[test]
    fn store_errors_map_to_codes() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let stale: ApiError = DbError::ConcurrentModification {
            id: "tx-1".into(),
            expected: at,
            actual: at,
        }
        .into();
        assert_eq!(stale.code(), "CONFLICT");

        let missing: ApiError = DbError::NotFound("tx-9".into()).into();
        assert_eq!(
            missing.body(),
            ApiErrorBody {
                code: "NOT_FOUND",
                message: "not found: transaction tx-9".into(),
            }
        );

        let milestone: ApiError =
            DbError::Pipeline(PipelineError::MilestoneNotFound("appraisal".into())).into();
        assert_eq!(milestone.code(), "NOT_FOUND");

        let poisoned: ApiError = DbError::Poisoned.into();
        assert_eq!(poisoned.code(), "INTERNAL");
    }
}
