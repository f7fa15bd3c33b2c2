//! Assertions reconciling order state against execution records

use std::sync::Arc;

use oms::execution::Execution;
use oms::order::Order;

/// Panics unless the executions exactly account for the order's filled
/// quantity
pub fn assert_fills_conserve_quantity(order: &Order, executions: &[Arc<Execution>]) {
    let executed: i64 = executions.iter().map(|e| e.quantity.as_i64()).sum();
    assert_eq!(
        executed,
        order.filled_quantity.as_i64(),
        "executions of order {} sum to {executed} ticks, the order says {}",
        order.id,
        order.filled_quantity.as_i64()
    );
}

/// Panics unless the order's average fill price equals the
/// quantity-weighted average of its executions, truncated the way the
/// order bookkeeping truncates
pub fn assert_average_price_consistent(order: &Order, executions: &[Arc<Execution>]) {
    let total_quantity: i128 = executions
        .iter()
        .map(|e| i128::from(e.quantity.as_i64()))
        .sum();
    if total_quantity == 0 {
        assert_eq!(
            order.average_fill_price, None,
            "order {} reports an average price without executions",
            order.id
        );
        return;
    }
    let total_value: i128 = executions
        .iter()
        .map(|e| i128::from(e.price.as_i64()) * i128::from(e.quantity.as_i64()))
        .sum();
    let expected = (total_value / total_quantity) as i64;
    assert_eq!(
        order.average_fill_price.map(|p| p.as_i64()),
        Some(expected),
        "order {} average fill price disagrees with its executions",
        order.id
    );
}
