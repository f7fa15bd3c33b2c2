//! End-to-end order execution against the mock venue

use pretty_assertions::assert_eq;

use execution_router::error::ExecutionError;
use execution_router::mock_venue::{FillMode, MockVenueConfig};
use oms::order::OrderStatus;
use services_common::{Px, Qty};

use crate::{
    elapsed_twap_request, elapsed_vwap_request, fast_config, fast_venue_config, init_test_logging,
    limit_request, market_request, rig, rig_with,
};

#[tokio::test]
async fn market_order_fills_completely_with_fees() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);

    let order = rig
        .engine
        .submit_order(market_request(0, 1_000))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.filled_quantity, Qty::from_units(1_000));
    assert_eq!(done.average_fill_price, Some(Px::from_cents(10_000)));

    let executions = rig.oms.executions_for_order(order.id);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].venue, "mock");
    // 5 bps commission on 100,000.0000 notional.
    assert_eq!(executions[0].fees.total(), 500_000);
}

#[tokio::test]
async fn limit_order_fills_at_its_price_without_a_market_quote() {
    init_test_logging();
    let rig = rig();

    let order = rig
        .engine
        .submit_order(limit_request(1, 200, 15_025))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.average_fill_price, Some(Px::from_cents(15_025)));
    let executions = rig.oms.executions_for_order(order.id);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].price, Px::from_cents(15_025));
}

#[tokio::test]
async fn twap_carries_unfilled_quantity_into_the_next_window() {
    init_test_logging();
    let rig = rig();
    // Two 500-unit windows. The venue only has 300 for the first slice,
    // so 200 roll into the second window's target.
    rig.mock
        .script_fill(Qty::from_units(300), Px::from_cents(10_000));
    rig.mock
        .script_fill(Qty::from_units(700), Px::from_cents(10_100));

    let order = rig
        .engine
        .submit_order(elapsed_twap_request(0, 1_000, 2))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.filled_quantity, Qty::from_units(1_000));
    // (300 * 100.00 + 700 * 101.00) / 1000 = 100.70
    assert_eq!(done.average_fill_price, Some(Px::from_cents(10_070)));

    let executions = rig.oms.executions_for_order(order.id);
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].quantity, Qty::from_units(300));
    assert_eq!(executions[1].quantity, Qty::from_units(700));
}

#[tokio::test]
async fn vwap_order_fills_within_the_first_window_when_liquidity_allows() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 9_950);

    let order = rig
        .engine
        .submit_order(elapsed_vwap_request(0, 1_000, 1_000))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    // The default curve projects far more volume than 1000 units, so the
    // first window's participation target covers the whole order.
    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.average_fill_price, Some(Px::from_cents(9_950)));
    assert_eq!(rig.oms.executions_for_order(order.id).len(), 1);
}

#[tokio::test]
async fn partial_fills_resubmit_replacement_slices_until_the_zero_fill_guard() {
    init_test_logging();
    let rig = rig_with(
        fast_config(),
        MockVenueConfig {
            fill_mode: FillMode::PartialBps(5_000),
            ..fast_venue_config()
        },
    );
    rig.set_price_cents("AAPL", 10_000);

    // Eight ticks halve down 4, 2, 1, then the last tick rounds to zero
    // fills until the guard stops the worker.
    let mut request = market_request(0, 1);
    request.quantity = Qty::from_i64(8);
    let order = rig.engine.submit_order(request).await.unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::PartiallyFilled);
    assert_eq!(done.filled_quantity, Qty::from_i64(7));
    assert_eq!(done.remaining_quantity, Qty::from_i64(1));
    assert_eq!(rig.oms.executions_for_order(order.id).len(), 3);

    let metrics = rig.engine.metrics();
    assert_eq!(metrics.slices_submitted, 6);
}

#[tokio::test]
async fn transient_submit_failures_are_retried() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);
    rig.mock.fail_next_submits(2);

    let order = rig
        .engine
        .submit_order(market_request(0, 100))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(rig.engine.metrics().submit_retries, 2);
    let stats = rig.venues.stats("mock").unwrap();
    assert_eq!(stats.submit_failures, 2);
    assert_eq!(stats.slices_sent, 1);
}

#[tokio::test]
async fn exhausted_submissions_reject_the_order() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);
    rig.mock.fail_next_submits(10);

    let order = rig
        .engine
        .submit_order(market_request(0, 100))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Rejected);
    assert!(done.fills.is_empty());
    assert_eq!(rig.engine.metrics().slices_failed, 1);
}

#[tokio::test]
async fn venue_rejection_ends_an_unfilled_order_rejected() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);
    rig.mock.reject_next_slices(1);

    let order = rig
        .engine
        .submit_order(market_request(0, 100))
        .await
        .unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Rejected);
    assert!(rig.oms.executions_for_order(order.id).is_empty());
    assert_eq!(rig.engine.metrics().slices_failed, 1);
}

#[tokio::test]
async fn starting_an_order_twice_is_refused() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);

    let order = rig
        .engine
        .create_order(market_request(0, 100))
        .await
        .unwrap();
    rig.engine.start_order(order.id).unwrap();
    let second = rig.engine.start_order(order.id);

    assert!(matches!(
        second,
        Err(ExecutionError::AlreadyStarted { order_id }) if order_id == order.id
    ));
    rig.engine.wait_for_completion(order.id).await.unwrap();
}

#[tokio::test]
async fn bad_strategy_parameters_fail_before_any_state_exists() {
    init_test_logging();
    let rig = rig();

    let mut request = elapsed_twap_request(0, 1_000, 2);
    if let services_common::Strategy::Twap { start, end, .. } = &mut request.strategy {
        std::mem::swap(start, end);
    }
    let result = rig.engine.create_order(request).await;

    assert!(matches!(result, Err(ExecutionError::InvalidStrategy { .. })));
    assert_eq!(rig.oms.order_count(), 0);
}
