//! Order lifecycle management
//!
//! Single source of truth for the status graph:
//! `new -> open -> {partially_filled <-> open} -> filled | canceled | rejected`.
//! Terminal states admit nothing.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{OmsError, OmsResult};
use crate::order::{Order, OrderRequest, OrderStatus, OrderType};

/// Order lifecycle manager
pub struct OrderLifecycleManager {
    /// Valid state transitions
    valid_transitions: HashMap<OrderStatus, Vec<OrderStatus>>,
}

impl Default for OrderLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderLifecycleManager {
    /// Create new lifecycle manager
    #[must_use]
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();

        valid_transitions.insert(
            OrderStatus::New,
            vec![
                OrderStatus::Open,
                OrderStatus::Canceled,
                OrderStatus::Rejected,
            ],
        );

        valid_transitions.insert(
            OrderStatus::Open,
            vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Canceled,
                OrderStatus::Rejected,
            ],
        );

        valid_transitions.insert(
            OrderStatus::PartiallyFilled,
            vec![
                OrderStatus::Open,
                OrderStatus::Filled,
                OrderStatus::Canceled,
            ],
        );

        // Terminal states have no transitions
        valid_transitions.insert(OrderStatus::Filled, vec![]);
        valid_transitions.insert(OrderStatus::Canceled, vec![]);
        valid_transitions.insert(OrderStatus::Rejected, vec![]);

        Self { valid_transitions }
    }

    /// Validate an order request before any state is created
    pub fn validate_request(&self, request: &OrderRequest) -> OmsResult<()> {
        if request.quantity.as_i64() <= 0 {
            return Err(OmsError::Validation {
                reason: "order quantity must be positive".to_string(),
            });
        }

        match request.order_type {
            OrderType::Limit => {
                if request.price.is_none() {
                    return Err(OmsError::Validation {
                        reason: "limit order requires a price".to_string(),
                    });
                }
            }
            OrderType::Stop => {
                if request.stop_price.is_none() {
                    return Err(OmsError::Validation {
                        reason: "stop order requires a stop price".to_string(),
                    });
                }
            }
            OrderType::Market => {}
        }

        if request.portfolio_id.as_str().is_empty() {
            return Err(OmsError::Validation {
                reason: "portfolio id is required".to_string(),
            });
        }

        if request.symbol.as_str().is_empty() {
            return Err(OmsError::Validation {
                reason: "symbol is required".to_string(),
            });
        }

        Ok(())
    }

    /// Validate a state transition for `order`
    pub fn validate_transition(
        &self,
        order: &Order,
        new_status: OrderStatus,
        operation: &str,
    ) -> OmsResult<()> {
        let current_status = order.status;

        if let Some(valid_next_states) = self.valid_transitions.get(&current_status)
            && valid_next_states.contains(&new_status)
        {
            debug!(order_id = %order.id, %current_status, %new_status, "valid transition");
            return Ok(());
        }

        Err(OmsError::InvalidStateTransition {
            order_id: order.id,
            operation: operation.to_string(),
            current_state: current_status,
        })
    }

    /// Check if order can accept a cancel request
    #[must_use]
    pub const fn can_cancel(&self, order: &Order) -> bool {
        !order.is_terminal()
    }

    /// Check if order can be amended: only before it is being worked with
    /// fills, per the amend contract
    #[must_use]
    pub fn can_amend(&self, order: &Order) -> bool {
        matches!(order.status, OrderStatus::New | OrderStatus::Open) && order.fills.is_empty()
    }
}
