//! Agent commission derived from deal amount and rate.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::CommissionError;
use crate::stage::Stage;
use crate::transaction::Transaction;

/// Largest deal amount the engine accepts: ten trillion dollars in cents.
/// Rollups over many deals of this size still fit in `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    /// Percentage in `0..=100`, kept in decimal so ties round exactly.
    pub rate: Decimal,
    pub amount_cents: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Earned,
    Pending,
}

impl Commission {
    pub fn new(deal_amount_cents: i64, rate: Decimal) -> Result<Self, CommissionError> {
        Ok(Self {
            rate,
            amount_cents: compute(deal_amount_cents, rate)?,
        })
    }
}

/// `round(amount * rate / 100)` in cents, half away from zero.
pub fn compute(amount_cents: i64, rate: Decimal) -> Result<i64, CommissionError> {
    validate_amount(amount_cents)?;
    validate_rate(rate)?;
    Decimal::from(amount_cents)
        .checked_mul(rate)
        .and_then(|due| due.checked_div(Decimal::ONE_HUNDRED))
        .map(|due| due.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|due| due.to_i64())
        .ok_or(CommissionError::AmountTooLarge(amount_cents))
}

pub fn validate_amount(amount_cents: i64) -> Result<(), CommissionError> {
    if amount_cents < 0 {
        return Err(CommissionError::NegativeAmount(amount_cents));
    }
    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(CommissionError::AmountTooLarge(amount_cents));
    }
    Ok(())
}

pub fn validate_rate(rate: Decimal) -> Result<(), CommissionError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(CommissionError::RateOutOfRange(rate));
    }
    Ok(())
}

/// Only a won deal has earned its commission. Closed Lost stays pending; the
/// write-off is a reporting concern.
pub fn status(transaction: &Transaction) -> CommissionStatus {
    status_for_stage(transaction.stage())
}

pub fn status_for_stage(stage: Stage) -> CommissionStatus {
    if stage.is_won() {
        CommissionStatus::Earned
    } else {
        CommissionStatus::Pending
    }
}
