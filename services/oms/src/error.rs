//! Error types for the order state machine

use services_common::{OrderId, Qty, SliceId};
use thiserror::Error;

use crate::order::OrderStatus;

/// Order state machine error types
#[derive(Error, Debug)]
pub enum OmsError {
    /// Order not found in the system
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The identifier of the order that could not be found
        order_id: OrderId,
    },

    /// Request failed validation; no state was created or changed
    #[error("validation failed: {reason}")]
    Validation {
        /// The precondition the request violated
        reason: String,
    },

    /// Risk service declined the request; no state was created
    #[error("risk rejected: {reason} (approved maximum {max_quantity})")]
    RiskRejected {
        /// The grounds the risk service gave
        reason: String,
        /// Largest quantity risk would have approved
        max_quantity: Qty,
    },

    /// Operation attempted from a state that does not permit it
    #[error("order {order_id} cannot be {operation} in state {current_state}")]
    InvalidStateTransition {
        /// The order the operation targeted
        order_id: OrderId,
        /// The operation that was attempted
        operation: String,
        /// The state that forbids the operation
        current_state: OrderStatus,
    },

    /// Replay of an already-applied fill; no state was changed
    #[error("duplicate fill for order {order_id}, slice {slice_id}")]
    DuplicateFill {
        /// The order the fill targeted
        order_id: OrderId,
        /// The slice id that was already recorded
        slice_id: SliceId,
    },

    /// Amendment violates a precondition beyond plain state checks
    #[error("amendment rejected for order {order_id}: {reason}")]
    AmendRejected {
        /// The order the amendment targeted
        order_id: OrderId,
        /// The precondition the amendment violated
        reason: String,
    },
}

/// Type alias for order state machine results
pub type OmsResult<T> = Result<T, OmsError>;
