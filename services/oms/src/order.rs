//! Order definitions and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services_common::{
    ExecutionId, OrderId, OrderSide, PortfolioId, Px, Qty, SliceId, Strategy, Symbol,
};
use std::fmt;
use uuid::Uuid;

use crate::execution::Fees;

/// Order structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID
    pub id: OrderId,
    /// Client order ID (optional)
    pub client_order_id: Option<String>,
    /// Portfolio the order trades for
    pub portfolio_id: PortfolioId,
    /// Symbol
    pub symbol: Symbol,
    /// Order side
    pub side: OrderSide,
    /// Order type
    pub order_type: OrderType,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Requested quantity
    pub quantity: Qty,
    /// Filled quantity so far
    pub filled_quantity: Qty,
    /// Remaining quantity
    pub remaining_quantity: Qty,
    /// Limit price (for limit orders)
    pub price: Option<Px>,
    /// Stop price (for stop orders)
    pub stop_price: Option<Px>,
    /// Quantity-weighted average fill price
    pub average_fill_price: Option<Px>,
    /// Routing strategy worked by the execution engine
    pub strategy: Strategy,
    /// Preferred venue, if the caller has one
    pub venue_hint: Option<String>,
    /// Order status
    pub status: OrderStatus,
    /// Cancel requested but not yet confirmed quiesced. Not a status: fills
    /// are still applied while this is set.
    pub cancel_pending: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Fills applied so far, one per slice id
    pub fills: Vec<Fill>,
    /// Amendments
    pub amendments: Vec<Amendment>,
    /// Version number, bumped on amend
    pub version: u32,
    /// Sequence number
    pub sequence_number: u64,
}

/// Order request for creating new orders
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Client order ID
    pub client_order_id: Option<String>,
    /// Portfolio the order trades for
    pub portfolio_id: PortfolioId,
    /// Symbol
    pub symbol: Symbol,
    /// Side
    pub side: OrderSide,
    /// Order type
    pub order_type: OrderType,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Quantity
    pub quantity: Qty,
    /// Limit price
    pub price: Option<Px>,
    /// Stop price
    pub stop_price: Option<Px>,
    /// Routing strategy
    pub strategy: Strategy,
    /// Preferred venue
    pub venue_hint: Option<String>,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Market order
    Market,
    /// Limit order
    Limit,
    /// Stop order
    Stop,
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till canceled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Good for day
    Day,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, not yet being worked
    New,
    /// Being worked by the execution engine
    Open,
    /// Some quantity filled, some remaining
    PartiallyFilled,
    /// Fully filled (terminal)
    Filled,
    /// Canceled after confirmed quiescence (terminal)
    Canceled,
    /// Rejected before any fill (terminal)
    Rejected,
}

impl OrderStatus {
    /// Terminal states admit no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
        };
        write!(f, "{name}")
    }
}

/// Fill applied to an order, one per slice id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// The slice that produced this fill; also the idempotency key
    pub slice_id: SliceId,
    /// The execution record this fill emitted
    pub execution_id: ExecutionId,
    /// Fill quantity
    pub quantity: Qty,
    /// Fill price
    pub price: Px,
    /// Venue that reported the fill
    pub venue: String,
    /// Fee breakdown
    pub fees: Fees,
    /// Fill timestamp
    pub timestamp: DateTime<Utc>,
}

/// Order amendment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amendment {
    /// Amendment ID
    pub id: Uuid,
    /// Order ID
    pub order_id: OrderId,
    /// New quantity, if changed
    pub new_quantity: Option<Qty>,
    /// New price, if changed
    pub new_price: Option<Px>,
    /// Amendment reason
    pub reason: String,
    /// Amendment timestamp
    pub timestamp: DateTime<Utc>,
}

/// Amendment request
#[derive(Debug, Clone, Default)]
pub struct AmendRequest {
    /// New quantity, if changing
    pub new_quantity: Option<Qty>,
    /// New price, if changing
    pub new_price: Option<Px>,
    /// Reason recorded with the amendment
    pub reason: String,
}

impl Order {
    /// Build a new order from a validated request
    #[must_use]
    pub fn from_request(request: OrderRequest, sequence_number: u64) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            client_order_id: request.client_order_id,
            portfolio_id: request.portfolio_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            quantity: request.quantity,
            filled_quantity: Qty::ZERO,
            remaining_quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            average_fill_price: None,
            strategy: request.strategy,
            venue_hint: request.venue_hint,
            status: OrderStatus::New,
            cancel_pending: false,
            created_at: now,
            updated_at: now,
            fills: Vec::new(),
            amendments: Vec::new(),
            version: 1,
            sequence_number,
        }
    }

    /// Quantity-weighted average price over all fills, recomputed from the
    /// fill list with i128 intermediates so precision never degrades across
    /// repeated updates.
    #[must_use]
    pub fn compute_average_fill_price(&self) -> Option<Px> {
        if self.fills.is_empty() {
            return None;
        }

        let total_value: i128 = self
            .fills
            .iter()
            .map(|f| i128::from(f.price.as_i64()) * i128::from(f.quantity.as_i64()))
            .sum();
        let total_quantity: i128 = self
            .fills
            .iter()
            .map(|f| i128::from(f.quantity.as_i64()))
            .sum();

        if total_quantity > 0 {
            Some(Px::from_i64((total_value / total_quantity) as i64))
        } else {
            None
        }
    }

    /// Whether a fill for `slice_id` has already been applied
    #[must_use]
    pub fn has_fill_for_slice(&self, slice_id: SliceId) -> bool {
        self.fills.iter().any(|f| f.slice_id == slice_id)
    }

    /// Total fees across all fills, in ticks
    #[must_use]
    pub fn total_fees(&self) -> i64 {
        self.fills.iter().map(|f| f.fees.total()).sum()
    }

    /// Check if order is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::New | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    /// Check if order is terminal
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fill rate as a percentage
    #[must_use]
    pub fn fill_rate(&self) -> f64 {
        if self.quantity.as_i64() == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            (self.filled_quantity.as_i64() as f64 / self.quantity.as_i64() as f64) * 100.0
        }
    }
}
