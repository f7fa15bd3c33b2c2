//! Immutable execution records
//!
//! One execution is emitted per applied fill and never mutated afterwards.
//! Downstream allocation and settlement always work from these records,
//! never from mutable order state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services_common::{ExecutionId, OrderId, OrderSide, PortfolioId, Px, Qty, SliceId, Symbol};

/// Fee breakdown for one execution, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    /// Broker commission
    pub commission: i64,
    /// Venue / exchange fee
    pub venue_fee: i64,
}

impl Fees {
    /// No fees
    pub const ZERO: Self = Self {
        commission: 0,
        venue_fee: 0,
    };

    /// Create a fee breakdown
    #[must_use]
    pub const fn new(commission: i64, venue_fee: i64) -> Self {
        Self {
            commission,
            venue_fee,
        }
    }

    /// Total fees in ticks
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.commission + self.venue_fee
    }
}

/// An immutable trade fact: one slice filled at one price on one venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution ID
    pub id: ExecutionId,
    /// Parent order
    pub order_id: OrderId,
    /// Slice that produced the fill; the fill idempotency key
    pub slice_id: SliceId,
    /// Portfolio of the parent order
    pub portfolio_id: PortfolioId,
    /// Symbol
    pub symbol: Symbol,
    /// Side of the parent order
    pub side: OrderSide,
    /// Filled quantity
    pub quantity: Qty,
    /// Fill price
    pub price: Px,
    /// Venue that filled the slice
    pub venue: String,
    /// Fee breakdown
    pub fees: Fees,
    /// When the venue reported the fill
    pub executed_at: DateTime<Utc>,
}

impl Execution {
    /// Notional value in ticks
    #[must_use]
    pub fn notional(&self) -> i64 {
        self.price.mul_qty(self.quantity)
    }
}

/// Fill details reported by the venue path for one slice
#[derive(Debug, Clone)]
pub struct FillReport {
    /// Slice the fill belongs to
    pub slice_id: SliceId,
    /// Filled quantity
    pub quantity: Qty,
    /// Fill price
    pub price: Px,
    /// Reporting venue
    pub venue: String,
    /// Fee breakdown
    pub fees: Fees,
    /// Venue-side execution timestamp
    pub executed_at: DateTime<Utc>,
}
