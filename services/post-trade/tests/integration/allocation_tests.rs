//! Allocation splitting and lifecycle tests

use pretty_assertions::assert_eq;
use rstest::*;
use services_common::{AccountId, AllocationId, PortfolioId, Px, Qty};

use oms::execution::Fees;
use post_trade::allocation::{AllocationFilter, AllocationRequest, AllocationStatus};
use post_trade::error::PostTradeError;

use crate::common::*;
use crate::init_test_logging;

#[test]
fn explicit_split_preserves_quantity_and_inherits_price() {
    init_test_logging();
    let manager = manager();
    let execution = execution(1_000, 15_025, Fees::new(11_300, 0));

    let allocations = manager
        .split_explicit(
            &execution,
            &[
                AllocationRequest::new("ACC-ALPHA", Qty::from_units(600)),
                AllocationRequest::new("ACC-BETA", Qty::from_units(400)),
            ],
        )
        .unwrap();

    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].quantity, Qty::from_units(600));
    assert_eq!(allocations[1].quantity, Qty::from_units(400));
    for allocation in &allocations {
        assert_eq!(allocation.price, Px::from_cents(15_025));
        assert_eq!(allocation.status, AllocationStatus::Pending);
        assert_eq!(allocation.execution_id, execution.id);
        assert!(allocation.confirmed_at.is_none());
    }

    let total_quantity: i64 = allocations.iter().map(|a| a.quantity.as_i64()).sum();
    let total_fees: i64 = allocations.iter().map(|a| a.fees.total()).sum();
    assert_eq!(total_quantity, execution.quantity.as_i64());
    assert_eq!(total_fees, execution.fees.total());

    let stored = manager.for_execution(execution.id);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].account_id, AccountId::new("ACC-ALPHA"));
}

#[test]
fn half_split_of_200_units_gives_each_account_a_0_565_fee() {
    init_test_logging();
    let manager = manager();
    // 1.13 in fee ticks
    let execution = execution(200, 10_000, Fees::new(11_300, 0));

    let allocations = manager
        .split_explicit(
            &execution,
            &[
                AllocationRequest::new("ACC-FIRST", Qty::from_units(100)),
                AllocationRequest::new("ACC-SECOND", Qty::from_units(100)),
            ],
        )
        .unwrap();

    // 0.565 each, nothing left over
    assert_eq!(allocations[0].fees.total(), 5_650);
    assert_eq!(allocations[1].fees.total(), 5_650);
}

#[test]
fn odd_fee_remainder_is_assigned_to_the_first_allocation() {
    init_test_logging();
    let manager = manager();
    let execution = execution(200, 10_000, Fees::new(11_301, 0));

    let allocations = manager
        .split_explicit(
            &execution,
            &[
                AllocationRequest::new("ACC-FIRST", Qty::from_units(100)),
                AllocationRequest::new("ACC-SECOND", Qty::from_units(100)),
            ],
        )
        .unwrap();

    assert_eq!(allocations[0].account_id, AccountId::new("ACC-FIRST"));
    assert_eq!(allocations[0].fees.total(), 5_651);
    assert_eq!(allocations[1].fees.total(), 5_650);
}

#[rstest]
#[case::under_allocated(600, 300)]
#[case::over_allocated(700, 400)]
fn mismatched_explicit_split_creates_nothing(#[case] first: i64, #[case] second: i64) {
    init_test_logging();
    let manager = manager();
    let execution = execution(1_000, 15_000, Fees::ZERO);

    let result = manager.split_explicit(
        &execution,
        &[
            AllocationRequest::new("ACC-ALPHA", Qty::from_units(first)),
            AllocationRequest::new("ACC-BETA", Qty::from_units(second)),
        ],
    );

    assert!(matches!(
        result,
        Err(PostTradeError::AllocationMismatch { expected, allocated, .. })
            if expected == Qty::from_units(1_000)
                && allocated == Qty::from_units(first + second)
    ));
    assert!(manager.is_empty());
}

#[rstest]
#[case::zero(0)]
#[case::negative(-100)]
fn non_positive_request_line_fails_validation(#[case] quantity_units: i64) {
    init_test_logging();
    let manager = manager();
    let execution = execution(1_000, 15_000, Fees::ZERO);

    let result = manager.split_explicit(
        &execution,
        &[
            AllocationRequest::new("ACC-ALPHA", Qty::from_units(1_000 - quantity_units)),
            AllocationRequest::new("ACC-BETA", Qty::from_units(quantity_units)),
        ],
    );

    assert!(matches!(result, Err(PostTradeError::Validation { .. })));
    assert!(manager.is_empty());
}

#[test]
fn pro_rata_split_follows_registry_weights() {
    init_test_logging();
    let manager = manager();
    let execution = execution(1_000, 15_000, Fees::new(11_300, 0));

    let allocations = manager.split_pro_rata(&execution).unwrap();

    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].account_id, AccountId::new("ACC-ALPHA"));
    assert_eq!(allocations[0].quantity, Qty::from_units(600));
    assert_eq!(allocations[0].fees, Fees::new(6_780, 0));
    assert_eq!(allocations[1].account_id, AccountId::new("ACC-BETA"));
    assert_eq!(allocations[1].quantity, Qty::from_units(400));
    assert_eq!(allocations[1].fees, Fees::new(4_520, 0));
}

#[test]
fn pro_rata_quantity_remainder_goes_to_the_first_account() {
    init_test_logging();
    let manager = manager();
    let mut execution = execution_for(BALANCED, 1, 15_000, Fees::ZERO);
    // One tick over a whole unit so the three-way floor leaves a remainder
    execution.quantity = Qty::from_i64(10_001);

    let allocations = manager.split_pro_rata(&execution).unwrap();

    let quantities: Vec<i64> = allocations.iter().map(|a| a.quantity.as_i64()).collect();
    assert_eq!(quantities, vec![3_335, 3_333, 3_333]);
    assert_eq!(quantities.iter().sum::<i64>(), 10_001);
}

#[test]
fn pro_rata_without_registered_weights_is_refused() {
    init_test_logging();
    let manager = manager();
    let execution = execution_for("UNKNOWN-99", 100, 15_000, Fees::ZERO);

    let result = manager.split_pro_rata(&execution);

    assert!(matches!(
        result,
        Err(PostTradeError::WeightsUnavailable { portfolio_id, .. })
            if portfolio_id == PortfolioId::new("UNKNOWN-99")
    ));
    assert!(manager.is_empty());
}

#[test]
fn an_execution_can_only_be_resplit_after_full_rejection() {
    init_test_logging();
    let manager = manager();
    let execution = execution(1_000, 15_000, Fees::ZERO);

    let first = manager
        .split_explicit(
            &execution,
            &[AllocationRequest::new("ACC-ALPHA", Qty::from_units(1_000))],
        )
        .unwrap();

    assert!(matches!(
        manager.split_pro_rata(&execution),
        Err(PostTradeError::AlreadyAllocated { execution_id }) if execution_id == execution.id
    ));

    manager.reject(first[0].id, "wrong account").unwrap();

    let second = manager.split_pro_rata(&execution).unwrap();
    assert_eq!(second.len(), 2);
    // The rejected history stays alongside the live split
    assert_eq!(manager.for_execution(execution.id).len(), 3);
}

#[test]
fn confirm_stamps_the_confirmation_instant() {
    init_test_logging();
    let manager = manager();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocations = manager.split_pro_rata(&execution).unwrap();

    let confirmed = manager.confirm(allocations[0].id).unwrap();

    assert_eq!(confirmed.status, AllocationStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
    assert_eq!(
        manager.get(allocations[0].id).unwrap().status,
        AllocationStatus::Confirmed
    );
    // The sibling allocation is untouched
    assert_eq!(
        manager.get(allocations[1].id).unwrap().status,
        AllocationStatus::Pending
    );
}

#[test]
fn terminal_allocations_admit_no_further_transitions() {
    init_test_logging();
    let manager = manager();
    let execution = execution(500, 15_000, Fees::ZERO);
    let allocations = manager.split_pro_rata(&execution).unwrap();

    let confirmed = manager.confirm(allocations[0].id).unwrap();
    assert!(matches!(
        manager.confirm(confirmed.id),
        Err(PostTradeError::InvalidAllocationTransition {
            current_status: AllocationStatus::Confirmed,
            ..
        })
    ));
    assert!(matches!(
        manager.reject(confirmed.id, "late change of mind"),
        Err(PostTradeError::InvalidAllocationTransition { .. })
    ));

    let rejected = manager.reject(allocations[1].id, "account closed").unwrap();
    assert!(matches!(
        manager.confirm(rejected.id),
        Err(PostTradeError::InvalidAllocationTransition {
            current_status: AllocationStatus::Rejected,
            ..
        })
    ));
}

#[test]
fn unknown_allocation_ids_are_reported() {
    init_test_logging();
    let manager = manager();
    let missing = AllocationId::new();

    assert!(matches!(
        manager.confirm(missing),
        Err(PostTradeError::AllocationNotFound { allocation_id }) if allocation_id == missing
    ));
    assert!(manager.get(missing).is_none());
}

#[test]
fn filters_select_by_account_status_and_portfolio() {
    init_test_logging();
    let manager = manager();
    let growth = execution(1_000, 15_000, Fees::ZERO);
    let balanced = execution_for(BALANCED, 300, 20_000, Fees::ZERO);

    let growth_allocations = manager.split_pro_rata(&growth).unwrap();
    manager.split_pro_rata(&balanced).unwrap();
    manager.confirm(growth_allocations[0].id).unwrap();

    let by_account = manager.query(&AllocationFilter {
        account_id: Some(AccountId::new("ACC-ALPHA")),
        ..AllocationFilter::default()
    });
    assert_eq!(by_account.len(), 1);

    let confirmed = manager.query(&AllocationFilter {
        status: Some(AllocationStatus::Confirmed),
        ..AllocationFilter::default()
    });
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id, growth_allocations[0].id);

    let balanced_only = manager.query(&AllocationFilter {
        portfolio_id: Some(PortfolioId::new(BALANCED)),
        ..AllocationFilter::default()
    });
    assert_eq!(balanced_only.len(), 3);

    assert_eq!(manager.len(), 5);
}
