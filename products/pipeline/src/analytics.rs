//! Read-only rollups over a caller-supplied set of transactions.
//!
//! Nothing here filters by owner or date; callers pass in the subset they
//! want reported on. Cent totals saturate at `i64::MAX` instead of wrapping.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::commission::CommissionStatus;
use crate::stage::Stage;
use crate::transaction::Transaction;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTotals {
    pub stage: Stage,
    pub probability: u8,
    pub count: usize,
    pub amount_cents: i64,
    pub expected_cents: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityStats {
    pub deals_won: usize,
    pub avg_days_to_win: f64,
    pub p50_days_to_win: f64,
    pub p90_days_to_win: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    /// `YYYY-MM` of the expected close date.
    pub period: String,
    pub amount_cents: i64,
    pub expected_cents: i64,
    pub deals: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub today: NaiveDate,
    pub total_count: usize,
    pub active_count: usize,
    pub total_volume_cents: i64,
    pub weighted_volume_cents: i64,
    pub closed_won_volume_cents: i64,
    pub count_by_stage: BTreeMap<Stage, usize>,
    pub conversion_rate: f64,
    pub average_close_days: Option<f64>,
    pub commission_earned_cents: i64,
    pub commission_pending_cents: i64,
    pub stage_totals: Vec<StageTotals>,
    pub velocity: VelocityStats,
    pub forecast: Vec<ForecastPoint>,
    pub overdue: Vec<String>,
}

/// Sum of amounts still in the pipeline (non-terminal stages).
pub fn total_volume(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.is_active())
        .map(Transaction::amount_cents)
        .fold(0, i64::saturating_add)
}

pub fn closed_won_volume(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.is_won())
        .map(Transaction::amount_cents)
        .fold(0, i64::saturating_add)
}

/// Probability-weighted value of the active pipeline.
pub fn weighted_volume(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.is_active())
        .map(Transaction::expected_value_cents)
        .fold(0, i64::saturating_add)
}

/// Every stage is present, zero counts included.
pub fn count_by_stage(transactions: &[Transaction]) -> BTreeMap<Stage, usize> {
    let mut counts: BTreeMap<Stage, usize> = Stage::ALL.iter().map(|s| (*s, 0)).collect();
    for tx in transactions {
        *counts.entry(tx.stage()).or_default() += 1;
    }
    counts
}

/// Share of all transactions that closed won, as a percentage.
pub fn conversion_rate(transactions: &[Transaction]) -> f64 {
    if transactions.is_empty() {
        return 0.0;
    }
    let won = transactions.iter().filter(|tx| tx.is_won()).count();
    won as f64 / transactions.len() as f64 * 100.0
}

/// Mean days from creation to close over won deals with a close timestamp.
/// `None` when there is nothing to average.
pub fn average_close_time(transactions: &[Transaction]) -> Option<f64> {
    let durations = days_to_win(transactions);
    if durations.is_empty() {
        return None;
    }
    Some(durations.iter().sum::<f64>() / durations.len() as f64)
}

pub fn commission_earned(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.commission_status() == CommissionStatus::Earned)
        .map(|tx| tx.commission().amount_cents)
        .fold(0, i64::saturating_add)
}

pub fn commission_pending(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.commission_status() == CommissionStatus::Pending && tx.is_active())
        .map(|tx| tx.commission().amount_cents)
        .fold(0, i64::saturating_add)
}

pub fn stage_totals(transactions: &[Transaction]) -> Vec<StageTotals> {
    Stage::ALL
        .iter()
        .map(|stage| {
            let in_stage = transactions.iter().filter(|tx| tx.stage() == *stage);
            let mut totals = StageTotals {
                stage: *stage,
                probability: stage.default_probability(),
                count: 0,
                amount_cents: 0,
                expected_cents: 0,
            };
            for tx in in_stage {
                totals.count += 1;
                totals.amount_cents = totals.amount_cents.saturating_add(tx.amount_cents());
                totals.expected_cents = totals.expected_cents.saturating_add(tx.expected_value_cents());
            }
            totals
        })
        .collect()
}

pub fn velocity(transactions: &[Transaction]) -> VelocityStats {
    let mut durations = days_to_win(transactions);
    if durations.is_empty() {
        return VelocityStats::default();
    }
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let avg = durations.iter().sum::<f64>() / durations.len() as f64;
    VelocityStats {
        deals_won: durations.len(),
        avg_days_to_win: avg,
        p50_days_to_win: percentile(&durations, 0.5),
        p90_days_to_win: percentile(&durations, 0.9),
    }
}

/// Active deals bucketed by the month they are expected to close, covering
/// every month between the earliest and latest expected close.
pub fn forecast(transactions: &[Transaction]) -> Vec<ForecastPoint> {
    let mut buckets: BTreeMap<(i32, u32), ForecastPoint> = BTreeMap::new();
    for tx in transactions.iter().filter(|tx| tx.is_active()) {
        let date = tx.expected_close_date();
        let key = (date.year(), date.month());
        let point = buckets.entry(key).or_insert_with(|| empty_point(key));
        point.amount_cents = point.amount_cents.saturating_add(tx.amount_cents());
        point.expected_cents = point.expected_cents.saturating_add(tx.expected_value_cents());
        point.deals += 1;
    }

    let (Some(first), Some(last)) = (
        buckets.keys().next().copied(),
        buckets.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut points = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        points.push(buckets.remove(&cursor).unwrap_or_else(|| empty_point(cursor)));
        cursor = next_month(cursor);
    }
    points
}

/// Ids of open transactions past their expected close date.
pub fn overdue(transactions: &[Transaction], today: NaiveDate) -> Vec<String> {
    transactions
        .iter()
        .filter(|tx| tx.is_overdue(today))
        .map(|tx| tx.id().to_string())
        .collect()
}

pub fn summarize(transactions: &[Transaction], today: NaiveDate) -> PipelineSummary {
    PipelineSummary {
        today,
        total_count: transactions.len(),
        active_count: transactions.iter().filter(|tx| tx.is_active()).count(),
        total_volume_cents: total_volume(transactions),
        weighted_volume_cents: weighted_volume(transactions),
        closed_won_volume_cents: closed_won_volume(transactions),
        count_by_stage: count_by_stage(transactions),
        conversion_rate: conversion_rate(transactions),
        average_close_days: average_close_time(transactions),
        commission_earned_cents: commission_earned(transactions),
        commission_pending_cents: commission_pending(transactions),
        stage_totals: stage_totals(transactions),
        velocity: velocity(transactions),
        forecast: forecast(transactions),
        overdue: overdue(transactions, today),
    }
}

fn days_to_win(transactions: &[Transaction]) -> Vec<f64> {
    transactions
        .iter()
        .filter(|tx| tx.is_won())
        .filter_map(|tx| {
            let closed = tx.closed_at()?;
            Some((closed - tx.created_at()).num_seconds() as f64 / 86_400.0)
        })
        .collect()
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let clamped = percentile.clamp(0.0, 1.0);
    let rank = (clamped * values.len() as f64).ceil().max(1.0) as usize - 1;
    let idx = rank.min(values.len() - 1);
    values[idx]
}

fn empty_point((year, month): (i32, u32)) -> ForecastPoint {
    ForecastPoint {
        period: format!("{year:04}-{month:02}"),
        amount_cents: 0,
        expected_cents: 0,
        deals: 0,
    }
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}
