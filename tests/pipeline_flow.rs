use anyhow::Result;
use pipeline_tests::{at, day, open_deal};
use platform_api::ApiError;
use platform_db::{MemoryStore, TransactionStore, update_with};
use products_pipeline::{
    CommissionStatus, MilestoneStatus, Stage, Transaction, TransactionRecord, analytics,
};
use rust_decimal_macros::dec;
use serde_json::json;

#[test]
fn deal_moves_from_prospect_to_close() -> Result<()> {
    let deal = open_deal("88 Birch Road", 45_000_000, dec!(3), at(2025, 1, 2));
    assert_eq!(deal.commission().amount_cents, 1_350_000);
    assert_eq!(deal.commission_status(), CommissionStatus::Pending);

    let id = deal.id().to_string();
    let store = MemoryStore::from_transactions([deal])?;

    for (step, when) in [at(2025, 1, 10), at(2025, 1, 20), at(2025, 2, 1)]
        .into_iter()
        .enumerate()
    {
        let moved = update_with(&store, &id, |tx| tx.advance(when))?;
        assert_eq!(moved.stage(), Stage::FORWARD[step + 1]);
        assert_eq!(moved.probability(), moved.stage().default_probability());
    }

    // Out of order on purpose: closing paperwork lands before inspection.
    update_with(&store, &id, |tx| tx.complete_milestone("closing", at(2025, 2, 5)))?;
    let tx = store.get(&id)?.expect("stored");
    assert_eq!(tx.next_milestone().map(|m| m.id.as_str()), Some("offer"));
    assert_eq!(tx.milestone_progress().percent, 25);

    let won = update_with(&store, &id, |tx| tx.transition(Stage::ClosedWon, at(2025, 2, 10)))?;
    assert_eq!(won.probability(), 100);
    assert_eq!(won.commission_status(), CommissionStatus::Earned);
    assert_eq!(won.closed_at(), Some(at(2025, 2, 10)));
    assert_eq!(won.stage_history().len(), 5);

    let err = update_with(&store, &id, |tx| tx.transition(Stage::Proposal, at(2025, 2, 11)))
        .unwrap_err();
    assert_eq!(ApiError::from(err).code(), "INVALID_TRANSITION");
    Ok(())
}

#[test]
fn milestone_statuses_track_today() -> Result<()> {
    let deal = open_deal("3 Quay Street", 60_000_000, dec!(2.5), at(2025, 3, 1));
    let close = deal.expected_close_date();
    let inspection_due = close - chrono::Duration::days(30);

    let statuses = deal.milestone_statuses(inspection_due - chrono::Duration::days(2));
    let by_id = |id: &str| statuses.iter().find(|(m, _)| m == id).map(|(_, s)| *s);
    assert_eq!(by_id("offer"), Some(MilestoneStatus::Overdue));
    assert_eq!(by_id("inspection"), Some(MilestoneStatus::DueSoon));
    assert_eq!(by_id("financing"), Some(MilestoneStatus::OnTrack));

    let done = deal.complete_milestone("offer", at(2025, 3, 20))?;
    assert_eq!(
        done.milestones()[0].status(inspection_due),
        MilestoneStatus::Completed
    );
    Ok(())
}

#[test]
fn rest_payload_round_trips_through_engine() -> Result<()> {
    let payload = json!([
        {
            "id": "opp-1",
            "title": "Lakeside Duplex",
            "amountCents": 100,
            "stage": "Prospecting",
            "expectedCloseDate": "2025-05-01",
            "transactionType": "Sale",
            "commission": { "rate": 5.0 },
            "createdAt": "2025-01-01T00:00:00Z",
            "modifiedAt": "2025-01-01T00:00:00Z"
        },
        {
            "id": "opp-2",
            "title": "Downtown Office",
            "amountCents": 200,
            "stage": "Negotiation",
            "probability": 90,
            "expectedCloseDate": "2025-03-01",
            "transactionType": "Lease",
            "commission": { "rate": 5.0 },
            "createdAt": "2025-01-01T00:00:00Z",
            "modifiedAt": "2025-01-01T00:00:00Z"
        },
        {
            "id": "opp-3",
            "title": "Harbor Condo",
            "amountCents": 300,
            "stage": "Closed Won",
            "expectedCloseDate": "2025-02-01",
            "transactionType": "Purchase",
            "commission": { "rate": 5.0, "amountCents": 999 },
            "createdAt": "2025-01-01T00:00:00Z",
            "modifiedAt": "2025-01-11T00:00:00Z",
            "closedDate": "2025-01-11T00:00:00Z"
        }
    ]);
    let records: Vec<TransactionRecord> = serde_json::from_value(payload)?;
    let deals = records
        .into_iter()
        .map(Transaction::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    assert!(deals[1].probability_overridden());
    assert_eq!(deals[2].commission().amount_cents, 15);

    let summary = analytics::summarize(&deals, day(2025, 4, 1));
    assert_eq!(summary.total_volume_cents, 300);
    assert_eq!(summary.closed_won_volume_cents, 300);
    assert_eq!(summary.weighted_volume_cents, 10 + 180);
    assert_eq!(summary.commission_earned_cents, 15);
    assert_eq!(summary.commission_pending_cents, 5 + 10);
    assert_eq!(summary.average_close_days, Some(10.0));
    assert_eq!(summary.overdue, vec!["opp-2".to_string()]);
    assert!((summary.conversion_rate - 100.0 / 3.0).abs() < 1e-9);

    let echoed = serde_json::to_value(deals[2].to_record())?;
    assert_eq!(echoed["commission"]["amountCents"], 15);
    assert_eq!(echoed["closedDate"], "2025-01-11T00:00:00Z");
    Ok(())
}

#[test]
fn unknown_stage_is_rejected_at_the_boundary() {
    let record = json!({
        "id": "opp-x",
        "title": "Mystery Lot",
        "amountCents": 1,
        "stage": "Escrow",
        "expectedCloseDate": "2025-05-01",
        "transactionType": "Sale",
        "commission": { "rate": 1.0 },
        "createdAt": "2025-01-01T00:00:00Z",
        "modifiedAt": "2025-01-01T00:00:00Z"
    });
    let parsed = serde_json::from_value::<Transaction>(record);
    assert!(parsed.is_err());
}
