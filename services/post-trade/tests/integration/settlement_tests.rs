//! Settlement attempt lifecycle tests

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use services_common::SettlementId;

use oms::execution::Fees;
use post_trade::allocation::AllocationRequest;
use post_trade::error::PostTradeError;
use post_trade::settlement::{
    SettlementConfig, SettlementDetails, SettlementFilter, SettlementStatus, SettlementTracker,
};

use crate::common::*;
use crate::init_test_logging;

fn details() -> SettlementDetails {
    SettlementDetails::new("Northern Trust", "NT-2024-000123")
}

#[test]
fn confirmed_allocation_settles_on_t_plus_2() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);

    let record = tracker.create(&allocation).unwrap();

    assert_eq!(record.attempt, 1);
    assert_eq!(record.status, SettlementStatus::Pending);
    assert_eq!(record.allocation_id, allocation.id);
    assert_eq!(
        record.settlement_date,
        allocation.confirmed_at.unwrap() + Duration::days(2)
    );
    assert_eq!(tracker.get(record.id).unwrap().id, record.id);
}

#[test]
fn unconfirmed_allocations_cannot_enter_settlement() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let pending = manager
        .split_explicit(
            &execution,
            &[AllocationRequest::new("ACC-SOLO", execution.quantity)],
        )
        .unwrap()
        .remove(0);

    let result = tracker.create(&pending);

    assert!(matches!(
        result,
        Err(PostTradeError::NotConfirmed { allocation_id, .. }) if allocation_id == pending.id
    ));
    assert!(tracker.is_empty());
}

#[test]
fn settling_records_the_custodian_reference() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    let record = tracker.create(&allocation).unwrap();

    let settled = tracker.mark_settled(record.id, details()).unwrap();

    assert_eq!(settled.status, SettlementStatus::Settled);
    assert_eq!(settled.details, Some(details()));
    assert!(settled.failure_reason.is_none());
}

#[test]
fn settled_attempts_are_terminal() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    let record = tracker.create(&allocation).unwrap();
    tracker.mark_settled(record.id, details()).unwrap();

    assert!(matches!(
        tracker.mark_settled(record.id, details()),
        Err(PostTradeError::InvalidSettlementTransition {
            current_status: SettlementStatus::Settled,
            ..
        })
    ));
    assert!(matches!(
        tracker.mark_failed(record.id, "late objection", None),
        Err(PostTradeError::InvalidSettlementTransition { .. })
    ));
    assert!(matches!(
        tracker.retry(record.id),
        Err(PostTradeError::InvalidSettlementTransition { .. })
    ));
}

#[test]
fn failed_attempts_keep_their_record_and_retries_append() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    let first = tracker.create(&allocation).unwrap();

    let failed = tracker
        .mark_failed(
            first.id,
            "insufficient cash at custodian",
            Some("ops ticket 4711".to_string()),
        )
        .unwrap();
    assert_eq!(failed.status, SettlementStatus::Failed);

    let second = tracker.retry(first.id).unwrap();
    assert_eq!(second.attempt, 2);
    assert_eq!(second.status, SettlementStatus::Pending);
    assert_eq!(second.allocation_id, allocation.id);
    assert_ne!(second.id, first.id);

    let history = tracker.history(allocation.id);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].attempt, 1);
    assert_eq!(history[0].status, SettlementStatus::Failed);
    assert_eq!(
        history[0].failure_reason.as_deref(),
        Some("insufficient cash at custodian")
    );
    assert_eq!(history[0].notes.as_deref(), Some("ops ticket 4711"));
    assert_eq!(history[1].attempt, 2);
}

#[test]
fn only_the_latest_attempt_can_be_retried() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    let first = tracker.create(&allocation).unwrap();
    tracker.mark_failed(first.id, "holiday calendar mismatch", None).unwrap();

    let second = tracker.retry(first.id).unwrap();
    tracker.mark_failed(second.id, "holiday calendar mismatch", None).unwrap();

    assert!(matches!(
        tracker.retry(first.id),
        Err(PostTradeError::Validation { .. })
    ));

    let third = tracker.retry(second.id).unwrap();
    assert_eq!(third.attempt, 3);
    assert_eq!(tracker.history(allocation.id).len(), 3);
}

#[test]
fn an_allocation_gets_exactly_one_first_attempt() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    tracker.create(&allocation).unwrap();

    assert!(matches!(
        tracker.create(&allocation),
        Err(PostTradeError::Validation { .. })
    ));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn due_returns_only_matured_pending_attempts() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);
    let record = tracker.create(&allocation).unwrap();

    assert!(tracker.due(record.settlement_date - Duration::days(1)).is_empty());
    assert_eq!(tracker.due(record.settlement_date).len(), 1);

    tracker.mark_settled(record.id, details()).unwrap();
    assert!(tracker.due(record.settlement_date + Duration::days(1)).is_empty());
}

#[test]
fn filters_select_by_allocation_status_and_date_window() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::default();
    let growth = execution(500, 15_000, Fees::ZERO);
    let balanced = execution_for(BALANCED, 300, 20_000, Fees::ZERO);

    let first = confirmed_allocation(&manager, &growth);
    let second = confirmed_allocation(&manager, &balanced);
    let first_record = tracker.create(&first).unwrap();
    tracker.create(&second).unwrap();
    tracker.mark_failed(first_record.id, "missing SSI", None).unwrap();

    let for_first = tracker.query(&SettlementFilter {
        allocation_id: Some(first.id),
        ..SettlementFilter::default()
    });
    assert_eq!(for_first.len(), 1);

    let still_pending = tracker.query(&SettlementFilter {
        status: Some(SettlementStatus::Pending),
        ..SettlementFilter::default()
    });
    assert_eq!(still_pending.len(), 1);
    assert_eq!(still_pending[0].allocation_id, second.id);

    let due_window = tracker.query(&SettlementFilter {
        due_after: Some(Utc::now()),
        due_before: Some(Utc::now() + Duration::days(3)),
        ..SettlementFilter::default()
    });
    assert_eq!(due_window.len(), 2);
}

#[test]
fn unknown_settlement_ids_are_reported() {
    init_test_logging();
    let tracker = SettlementTracker::default();
    let missing = SettlementId::new();

    assert!(matches!(
        tracker.mark_settled(missing, details()),
        Err(PostTradeError::SettlementNotFound { settlement_id }) if settlement_id == missing
    ));
    assert!(tracker.get(missing).is_none());
}

#[test]
fn a_zero_offset_settles_same_day() {
    init_test_logging();
    let manager = manager();
    let tracker = SettlementTracker::new(SettlementConfig {
        settlement_offset_days: 0,
    });
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocation = confirmed_allocation(&manager, &execution);

    let record = tracker.create(&allocation).unwrap();

    assert_eq!(record.settlement_date, allocation.confirmed_at.unwrap());
    assert_eq!(tracker.due(Utc::now()).len(), 1);
}
