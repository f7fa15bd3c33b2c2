//! Cancel quiesce protocol coverage
//!
//! Cancels are acknowledgement-based: the worker pulls venue exposure,
//! drains whatever was already in flight, and only then confirms with
//! the state machine.

use std::time::Duration;

use pretty_assertions::assert_eq;

use execution_router::mock_venue::MockVenueConfig;
use oms::error::OmsError;
use oms::order::OrderStatus;
use services_common::Qty;

use crate::{
    fast_config, future_twap_request, init_test_logging, market_request, rig, rig_with,
};

#[tokio::test]
async fn cancel_before_start_confirms_immediately() {
    init_test_logging();
    let rig = rig();

    let order = rig
        .engine
        .create_order(market_request(0, 500))
        .await
        .unwrap();
    rig.engine.cancel_order(order.id).await.unwrap();
    let canceled = rig.oms.get_order(order.id).unwrap();

    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert!(!canceled.cancel_pending);
}

#[tokio::test]
async fn cancel_while_waiting_for_a_window_stops_before_any_slice() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);

    // First window opens ten seconds out; the worker is parked on it.
    let order = rig
        .engine
        .submit_order(future_twap_request(0, 1_000, 10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.engine.cancel_order(order.id).await.unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Canceled);
    assert!(rig.oms.executions_for_order(order.id).is_empty());
    assert_eq!(rig.engine.metrics().slices_submitted, 0);
}

#[tokio::test]
async fn cancel_of_a_resting_slice_quiesces_without_a_fill() {
    init_test_logging();
    // Fills would take a minute; the cancel gets there first.
    let rig = rig_with(
        fast_config(),
        MockVenueConfig {
            fill_latency: Duration::from_secs(60),
            cancel_latency: Duration::from_millis(25),
            ..MockVenueConfig::default()
        },
    );
    rig.set_price_cents("AAPL", 10_000);

    let order = rig
        .engine
        .submit_order(market_request(0, 1_000))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.engine.cancel_order(order.id).await.unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    assert_eq!(done.status, OrderStatus::Canceled);
    assert!(done.fills.is_empty());

    let metrics = rig.oms.metrics();
    assert_eq!(metrics.cancels_requested, 1);
    assert_eq!(metrics.orders_canceled, 1);
}

#[tokio::test]
async fn late_fill_beats_the_cancel() {
    init_test_logging();
    // Fill lands while the cancel is still waiting on its confirmation,
    // and the venue is configured to let in-flight fills survive.
    let rig = rig_with(
        fast_config(),
        MockVenueConfig {
            fill_latency: Duration::from_millis(50),
            cancel_latency: Duration::from_millis(100),
            ..MockVenueConfig::default()
        },
    );
    rig.mock.set_fills_survive_cancel(true);
    rig.set_price_cents("AAPL", 10_000);

    let order = rig
        .engine
        .submit_order(market_request(0, 1_000))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    rig.engine.cancel_order(order.id).await.unwrap();
    let done = rig.engine.wait_for_completion(order.id).await.unwrap();

    // The completing fill wins; the cancel confirmation is a no-op.
    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.filled_quantity, Qty::from_units(1_000));
    assert!(!done.cancel_pending);
    assert_eq!(rig.oms.executions_for_order(order.id).len(), 1);
}

#[tokio::test]
async fn cancel_after_completion_reports_the_terminal_state() {
    init_test_logging();
    let rig = rig();
    rig.set_price_cents("AAPL", 10_000);

    let order = rig
        .engine
        .submit_order(market_request(0, 100))
        .await
        .unwrap();
    rig.engine.wait_for_completion(order.id).await.unwrap();
    let result = rig.engine.cancel_order(order.id).await;

    assert!(matches!(
        result,
        Err(execution_router::error::ExecutionError::Oms(
            OmsError::InvalidStateTransition { .. }
        ))
    ));
}
