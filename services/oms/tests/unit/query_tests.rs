//! Unit tests for order/execution queries and the audit trail

use std::time::Duration;

use services_common::{PortfolioId, Symbol};

use oms::OrderManager;
use oms::audit::AuditKind;
use oms::order::OrderStatus;
use oms::store::{ExecutionFilter, OrderFilter};

use crate::common::*;
use crate::init_test_logging;

#[tokio::test]
async fn orders_filter_by_portfolio_symbol_and_status() {
    init_test_logging();
    let manager = OrderManager::new(test_config());

    // ids 0..6 spread across three portfolios and symbols round-robin.
    for id in 0..6 {
        manager
            .create_order(market_order_request(id, 100))
            .await
            .unwrap();
    }
    let target = manager
        .query_orders(&OrderFilter {
            portfolio_id: Some(PortfolioId::new("PORT-0")),
            ..Default::default()
        })
        .into_iter()
        .next()
        .unwrap();
    manager.mark_open(target.id).unwrap();

    let by_portfolio = manager.query_orders(&OrderFilter {
        portfolio_id: Some(PortfolioId::new("PORT-0")),
        ..Default::default()
    });
    assert_eq!(by_portfolio.len(), 2);

    let by_symbol_open = manager.query_orders(&OrderFilter {
        symbol: Some(Symbol::new("AAPL")),
        status: Some(OrderStatus::Open),
        ..Default::default()
    });
    assert_eq!(by_symbol_open.len(), 1);
    assert_eq!(by_symbol_open[0].id, target.id);

    let all_new = manager.query_orders(&OrderFilter {
        status: Some(OrderStatus::New),
        ..Default::default()
    });
    assert_eq!(all_new.len(), 5);
}

#[tokio::test]
async fn orders_filter_by_creation_window() {
    let manager = OrderManager::new(test_config());

    let early = manager
        .create_order(market_order_request(0, 100))
        .await
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let cut = chrono::Utc::now();
    std::thread::sleep(Duration::from_millis(5));
    let late = manager
        .create_order(market_order_request(1, 100))
        .await
        .unwrap();

    let after = manager.query_orders(&OrderFilter {
        created_after: Some(cut),
        ..Default::default()
    });
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, late.id);

    let before = manager.query_orders(&OrderFilter {
        created_before: Some(cut),
        ..Default::default()
    });
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].id, early.id);
}

#[tokio::test]
async fn query_results_preserve_creation_order() {
    let manager = OrderManager::new(test_config());
    let mut created = Vec::new();
    for id in 0..5 {
        created.push(
            manager
                .create_order(market_order_request(id, 100))
                .await
                .unwrap()
                .id,
        );
    }

    let all: Vec<_> = manager
        .query_orders(&OrderFilter::default())
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(all, created);
}

#[tokio::test]
async fn client_order_id_lookup() {
    let manager = OrderManager::new(test_config());
    let order = manager
        .create_order(market_order_request(7, 100))
        .await
        .unwrap();

    let hit = manager.get_order_by_client_id("TEST-000007").unwrap();
    assert_eq!(hit.id, order.id);
    assert!(manager.get_order_by_client_id("TEST-999999").is_none());
}

#[tokio::test]
async fn active_orders_exclude_terminal_states() {
    let manager = OrderManager::new(test_config());

    let open = open_order(&manager, market_order_request(0, 100)).await;
    let filled = open_order(&manager, market_order_request(1, 100)).await;
    manager
        .apply_fill(filled.id, fill_report(100, 10_000))
        .unwrap();
    let canceled = open_order(&manager, market_order_request(2, 100)).await;
    manager.request_cancel(canceled.id).unwrap();
    manager.confirm_cancel(canceled.id).unwrap();

    let active = manager.active_orders();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, open.id);
    assert_eq!(manager.metrics().active_orders, 1);
}

#[tokio::test]
async fn executions_filter_by_order_and_venue() {
    let manager = OrderManager::new(test_config());
    let first = open_order(&manager, market_order_request(0, 200)).await;
    let second = open_order(&manager, market_order_request(1, 200)).await;

    manager
        .apply_fill(first.id, fill_report(100, 10_000))
        .unwrap();
    manager
        .apply_fill(first.id, fill_report(100, 10_010))
        .unwrap();
    manager
        .apply_fill(second.id, fill_report(50, 9_990))
        .unwrap();

    assert_eq!(manager.executions_for_order(first.id).len(), 2);
    assert_eq!(manager.executions_for_order(second.id).len(), 1);

    let by_venue = manager.query_executions(&ExecutionFilter {
        venue: Some("mock".to_string()),
        ..Default::default()
    });
    assert_eq!(by_venue.len(), 3);

    let by_order = manager.query_executions(&ExecutionFilter {
        order_id: Some(first.id),
        ..Default::default()
    });
    assert_eq!(by_order.len(), 2);
}

#[tokio::test]
async fn audit_trail_records_the_full_story() {
    let manager = OrderManager::new(test_config());
    let order = open_order(&manager, market_order_request(0, 100)).await;
    manager
        .apply_fill(order.id, fill_report(40, 10_000))
        .unwrap();
    manager.request_cancel(order.id).unwrap();
    manager.confirm_cancel(order.id).unwrap();

    let trail = manager.audit_trail().for_order(order.id);
    let kinds: Vec<AuditKind> = trail.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AuditKind::OrderCreated,
            AuditKind::StatusChanged,
            AuditKind::FillApplied,
            AuditKind::CancelRequested,
            AuditKind::StatusChanged,
        ]
    );

    // Sequence numbers are strictly increasing.
    let sequences: Vec<u64> = trail.iter().map(|r| r.sequence).collect();
    let mut sorted = sequences.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sequences, sorted);
}

#[tokio::test]
async fn audit_can_be_disabled() {
    let manager = OrderManager::new(isolated_config());
    let order = open_order(&manager, market_order_request(0, 100)).await;
    manager
        .apply_fill(order.id, fill_report(100, 10_000))
        .unwrap();

    assert!(manager.audit_trail().for_order(order.id).is_empty());
}

#[tokio::test]
async fn metrics_snapshot_tracks_operations() {
    let manager = OrderManager::new(test_config());

    let a = open_order(&manager, market_order_request(0, 100)).await;
    manager.apply_fill(a.id, fill_report(100, 10_000)).unwrap();
    let b = open_order(&manager, market_order_request(1, 100)).await;
    manager.request_cancel(b.id).unwrap();
    manager.confirm_cancel(b.id).unwrap();

    let snapshot = manager.metrics();
    assert_eq!(snapshot.orders_created, 2);
    assert_eq!(snapshot.orders_filled, 1);
    assert_eq!(snapshot.orders_canceled, 1);
    assert_eq!(snapshot.fills_applied, 1);
    assert_eq!(snapshot.active_orders, 0);
}
