//! Execution engine error types

use oms::error::OmsError;
use services_common::{BasketId, OrderId, SliceId, Symbol};
use thiserror::Error;

/// Execution engine errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Order state machine rejected the operation
    #[error(transparent)]
    Oms(#[from] OmsError),

    /// Strategy parameters do not form a runnable schedule
    #[error("invalid strategy parameters: {reason}")]
    InvalidStrategy {
        /// What is wrong with the parameters
        reason: String,
    },

    /// A specific venue refused or could not take the request
    #[error("venue {venue} unavailable: {reason}")]
    VenueUnavailable {
        /// Venue name
        venue: String,
        /// Why the venue could not take the request
        reason: String,
    },

    /// No registered venue is currently healthy
    #[error("no venues available")]
    NoVenuesAvailable,

    /// The venue has no market price to execute against
    #[error("no market price for {symbol} on {venue}")]
    NoMarketPrice {
        /// Venue name
        venue: String,
        /// Symbol without a price
        symbol: Symbol,
    },

    /// The venue rejected one child slice outright
    #[error("venue rejected slice {slice_id}: {reason}")]
    SliceRejected {
        /// Rejected slice
        slice_id: SliceId,
        /// Venue-supplied reason
        reason: String,
    },

    /// A worker is already driving this order
    #[error("order {order_id} is already being worked")]
    AlreadyStarted {
        /// Order in question
        order_id: OrderId,
    },

    /// Basket refused before any constituent order was created
    #[error("basket rejected: {reason}")]
    BasketRejected {
        /// Why the basket was refused
        reason: String,
    },

    /// No basket with this id
    #[error("basket {basket_id} not found")]
    BasketNotFound {
        /// Requested basket id
        basket_id: BasketId,
    },
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;
