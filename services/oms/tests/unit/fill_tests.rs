//! Unit tests for fill application and execution records

use proptest::prelude::*;
use services_common::{Px, Qty, SliceId};

use oms::OrderManager;
use oms::error::OmsError;
use oms::execution::Fees;
use oms::order::OrderStatus;

use crate::common::*;
use crate::init_test_logging;

#[tokio::test]
async fn each_slice_id_applies_exactly_once() {
    init_test_logging();
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 1_000)).await;

    let slice_id = SliceId::new();
    let first = manager
        .apply_fill(order.id, fill_report_for_slice(slice_id, 400, 10_000))
        .unwrap();
    let replay = manager.apply_fill(order.id, fill_report_for_slice(slice_id, 400, 10_000));

    assert!(matches!(
        replay,
        Err(OmsError::DuplicateFill { order_id, slice_id: rejected })
            if order_id == order.id && rejected == slice_id
    ));

    let order = manager.get_order(order.id).unwrap();
    assert_eq!(order.filled_quantity, Qty::from_units(400));
    assert_eq!(order.fills.len(), 1);
    assert_eq!(order.fills[0].execution_id, first.id);
    assert_eq!(manager.executions_for_order(order.id).len(), 1);
    assert_eq!(manager.metrics().duplicate_fills, 1);
}

#[tokio::test]
async fn overfill_is_rejected_without_mutation() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 100)).await;
    manager
        .apply_fill(order.id, fill_report(60, 10_000))
        .unwrap();

    let result = manager.apply_fill(order.id, fill_report(50, 10_000));

    assert!(matches!(result, Err(OmsError::Validation { .. })));
    let order = manager.get_order(order.id).unwrap();
    assert_eq!(order.filled_quantity, Qty::from_units(60));
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
}

#[tokio::test]
async fn non_positive_fill_quantity_is_rejected() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 100)).await;

    assert!(matches!(
        manager.apply_fill(order.id, fill_report(0, 10_000)),
        Err(OmsError::Validation { .. })
    ));
    assert!(matches!(
        manager.apply_fill(order.id, fill_report(-10, 10_000)),
        Err(OmsError::Validation { .. })
    ));
}

#[tokio::test]
async fn average_price_is_quantity_weighted_and_exact() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 1_000)).await;

    manager
        .apply_fill(order.id, fill_report(100, 5_000))
        .unwrap();
    manager
        .apply_fill(order.id, fill_report(200, 5_030))
        .unwrap();
    manager
        .apply_fill(order.id, fill_report(700, 4_990))
        .unwrap();

    let order = manager.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    // (100 * 50.00 + 200 * 50.30 + 700 * 49.90) / 1000 = 49.99
    assert_eq!(order.average_fill_price, Some(Px::from_cents(4_999)));
}

#[tokio::test]
async fn fees_accumulate_across_fills() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 200)).await;

    let mut report = fill_report(100, 10_000);
    report.fees = Fees::new(5_650, 0);
    manager.apply_fill(order.id, report).unwrap();

    let mut report = fill_report(100, 10_000);
    report.fees = Fees::new(5_650, 0);
    manager.apply_fill(order.id, report).unwrap();

    let order = manager.get_order(order.id).unwrap();
    // 0.565 + 0.565 = 1.13 in price ticks
    assert_eq!(order.total_fees(), 11_300);
}

#[tokio::test]
async fn execution_record_carries_order_attributes() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 500)).await;

    let execution = manager
        .apply_fill(order.id, fill_report(200, 10_050))
        .unwrap();

    let stored = manager.get_execution(execution.id).unwrap();
    assert_eq!(stored.order_id, order.id);
    assert_eq!(stored.portfolio_id, order.portfolio_id);
    assert_eq!(stored.symbol, order.symbol);
    assert_eq!(stored.side, order.side);
    assert_eq!(stored.quantity, Qty::from_units(200));
    assert_eq!(stored.price, Px::from_cents(10_050));
    assert_eq!(stored.venue, "mock");
}

#[tokio::test]
async fn partial_fill_keeps_accepting_while_cancel_pending() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(1, 300)).await;
    manager.request_cancel(order.id).unwrap();

    manager
        .apply_fill(order.id, fill_report(100, 10_000))
        .unwrap();

    let order = manager.get_order(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
    assert!(order.cancel_pending);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any sequence of positive fills summing to the order quantity must
    /// leave filled + remaining == quantity at every step and end filled.
    #[test]
    fn fills_conserve_quantity(parts in prop::collection::vec(1i64..=500, 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let manager = OrderManager::new(isolated_config());
            let total: i64 = parts.iter().sum();
            let order = manager
                .create_order(market_order_request(0, total))
                .await
                .unwrap();
            manager.mark_open(order.id).unwrap();

            for part in &parts {
                manager.apply_fill(order.id, fill_report(*part, 10_000)).unwrap();
                let snapshot = manager.get_order(order.id).unwrap();
                assert_eq!(
                    snapshot.filled_quantity.as_i64() + snapshot.remaining_quantity.as_i64(),
                    snapshot.quantity.as_i64()
                );
            }

            let done = manager.get_order(order.id).unwrap();
            assert_eq!(done.status, OrderStatus::Filled);
            assert_eq!(done.fills.len(), parts.len());
            assert_eq!(done.filled_quantity, Qty::from_units(total));
        });
    }

    /// The weighted average price never leaves the band spanned by the
    /// individual fill prices.
    #[test]
    fn average_price_stays_within_fill_band(
        fills in prop::collection::vec((1i64..=400, 4_000i64..=6_000), 1..10)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let manager = OrderManager::new(isolated_config());
            let total: i64 = fills.iter().map(|(q, _)| q).sum();
            let order = manager
                .create_order(market_order_request(0, total))
                .await
                .unwrap();
            manager.mark_open(order.id).unwrap();

            for (quantity, price_cents) in &fills {
                manager
                    .apply_fill(order.id, fill_report(*quantity, *price_cents))
                    .unwrap();
            }

            let done = manager.get_order(order.id).unwrap();
            let average = done.average_fill_price.unwrap();
            let min = fills.iter().map(|(_, p)| Px::from_cents(*p)).min().unwrap();
            let max = fills.iter().map(|(_, p)| Px::from_cents(*p)).max().unwrap();
            assert!(average >= min && average <= max);
        });
    }
}
