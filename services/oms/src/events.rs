//! Order event broadcasting
//!
//! Every state change fans out on a broadcast channel. The basket
//! coordinator drives its derived status from these; reporting consumers
//! can subscribe without touching engine internals.

use chrono::{DateTime, Utc};
use services_common::OrderId;

use crate::execution::Execution;
use crate::order::{Amendment, Order, OrderStatus};

/// Order event for broadcasting
#[derive(Debug, Clone)]
pub enum OrderEvent {
    /// New order created
    Created(Order),
    /// Order status changed
    StatusChanged {
        /// Order ID
        order_id: OrderId,
        /// Old status
        old_status: OrderStatus,
        /// New status
        new_status: OrderStatus,
        /// Timestamp
        timestamp: DateTime<Utc>,
    },
    /// A fill was applied and an execution emitted
    Filled {
        /// Order ID
        order_id: OrderId,
        /// The execution record the fill produced
        execution: Execution,
    },
    /// Order amended
    Amended {
        /// Order ID
        order_id: OrderId,
        /// Amendment details
        amendment: Amendment,
    },
    /// Cancel requested; the order keeps working until quiescence confirms
    CancelRequested {
        /// Order ID
        order_id: OrderId,
        /// Timestamp
        timestamp: DateTime<Utc>,
    },
    /// Cancel confirmed after quiescence; the order is terminal
    Canceled {
        /// Order ID
        order_id: OrderId,
        /// Timestamp
        timestamp: DateTime<Utc>,
    },
}

impl OrderEvent {
    /// The order this event concerns
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Created(order) => order.id,
            Self::StatusChanged { order_id, .. }
            | Self::Filled { order_id, .. }
            | Self::Amended { order_id, .. }
            | Self::CancelRequested { order_id, .. }
            | Self::Canceled { order_id, .. } => *order_id,
        }
    }
}
