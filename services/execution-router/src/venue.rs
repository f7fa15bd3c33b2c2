//! Venue adapter boundary
//!
//! A venue adapter accepts child slices, acknowledges them synchronously,
//! and reports everything that happens afterwards through an event
//! stream: fills, slice completion, rejections, cancel confirmations.

use async_trait::async_trait;
use oms::execution::FillReport;
use services_common::{OrderId, OrderSide, Px, Qty, SliceId, Symbol};
use tokio::sync::broadcast;

use crate::error::ExecutionResult;

/// One child order routed to a venue
///
/// The slice id is the fill idempotency key end to end: every fill the
/// venue reports for this slice carries it, and the order state machine
/// accepts at most one fill per id.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Idempotency key for the resulting fill
    pub id: SliceId,
    /// Parent order
    pub order_id: OrderId,
    /// Instrument
    pub symbol: Symbol,
    /// Side
    pub side: OrderSide,
    /// Quantity to work
    pub quantity: Qty,
    /// Resting price; `None` executes at market
    pub limit_price: Option<Px>,
}

/// Synchronous acknowledgement of a submitted slice
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Slice being acknowledged
    pub slice_id: SliceId,
    /// Venue-assigned identifier
    pub venue_order_id: String,
}

/// Asynchronous reports from a venue
#[derive(Debug, Clone)]
pub enum VenueEvent {
    /// A fill for one slice
    Fill {
        /// Parent order
        order_id: OrderId,
        /// Fill details keyed by slice id
        report: FillReport,
    },
    /// The venue has finished working a slice
    SliceDone {
        /// Completed slice
        slice_id: SliceId,
        /// Parent order
        order_id: OrderId,
        /// Total quantity filled on this slice
        filled: Qty,
    },
    /// The venue refused a slice after acknowledging it
    SliceRejected {
        /// Rejected slice
        slice_id: SliceId,
        /// Parent order
        order_id: OrderId,
        /// Venue-supplied reason
        reason: String,
    },
    /// All working slices for the order are confirmed gone
    CancelConfirmed {
        /// Parent order
        order_id: OrderId,
    },
}

/// Venue connectivity boundary
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue name used for routing and in execution records
    fn name(&self) -> &str;

    /// Submit one slice; acknowledgement is synchronous, everything
    /// afterwards arrives on the event stream
    async fn submit_slice(&self, slice: Slice) -> ExecutionResult<SubmitAck>;

    /// Pull all working slices for an order; completion is signalled by
    /// [`VenueEvent::CancelConfirmed`]
    async fn cancel_slices(&self, order_id: OrderId) -> ExecutionResult<()>;

    /// Subscribe to the venue's event stream
    fn subscribe(&self) -> broadcast::Receiver<VenueEvent>;

    /// Whether the venue can currently take orders
    async fn is_healthy(&self) -> bool;
}
