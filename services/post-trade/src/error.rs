//! Error types for allocation and settlement

use account_registry::RegistryError;
use services_common::{AllocationId, ExecutionId, PortfolioId, Qty, SettlementId};
use thiserror::Error;

use crate::allocation::AllocationStatus;
use crate::settlement::SettlementStatus;

/// Post-trade error types
#[derive(Error, Debug)]
pub enum PostTradeError {
    /// Allocation not found in the store
    #[error("allocation not found: {allocation_id}")]
    AllocationNotFound {
        /// The identifier of the allocation that could not be found
        allocation_id: AllocationId,
    },

    /// Settlement attempt not found in the store
    #[error("settlement not found: {settlement_id}")]
    SettlementNotFound {
        /// The identifier of the settlement that could not be found
        settlement_id: SettlementId,
    },

    /// Request failed validation; no state was created or changed
    #[error("validation failed: {reason}")]
    Validation {
        /// The precondition the request violated
        reason: String,
    },

    /// Explicit split does not sum to the execution quantity; no
    /// allocations were created
    #[error(
        "allocations for execution {execution_id} sum to {allocated}, expected exactly {expected}"
    )]
    AllocationMismatch {
        /// The execution the split targeted
        execution_id: ExecutionId,
        /// The execution quantity the split must sum to
        expected: Qty,
        /// What the request actually summed to
        allocated: Qty,
    },

    /// The execution already carries a live (non-rejected) split
    #[error("execution {execution_id} is already allocated")]
    AlreadyAllocated {
        /// The execution that was split before
        execution_id: ExecutionId,
    },

    /// Settlement requires a confirmed allocation
    #[error("allocation {allocation_id} is {current_status}, settlement requires confirmed")]
    NotConfirmed {
        /// The allocation offered for settlement
        allocation_id: AllocationId,
        /// Its current status
        current_status: AllocationStatus,
    },

    /// Operation attempted on an allocation whose status forbids it
    #[error("allocation {allocation_id} cannot be {operation} in status {current_status}")]
    InvalidAllocationTransition {
        /// The allocation the operation targeted
        allocation_id: AllocationId,
        /// The operation that was attempted
        operation: String,
        /// The status that forbids the operation
        current_status: AllocationStatus,
    },

    /// Operation attempted on a settlement whose status forbids it
    #[error("settlement {settlement_id} cannot be {operation} in status {current_status}")]
    InvalidSettlementTransition {
        /// The settlement attempt the operation targeted
        settlement_id: SettlementId,
        /// The operation that was attempted
        operation: String,
        /// The status that forbids the operation
        current_status: SettlementStatus,
    },

    /// The account registry could not supply usable weights
    #[error("no usable sub-account weights for portfolio {portfolio_id}")]
    WeightsUnavailable {
        /// The portfolio a pro-rata split was requested for
        portfolio_id: PortfolioId,
        /// What the registry reported
        #[source]
        source: RegistryError,
    },
}

/// Type alias for post-trade results
pub type PostTradeResult<T> = Result<T, PostTradeError>;
