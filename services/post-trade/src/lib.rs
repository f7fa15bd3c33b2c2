//! Post-trade processing
//!
//! Turns immutable executions into per-account allocations and drives each
//! confirmed allocation through settlement:
//! - All-or-nothing splits, explicit or pro-rata against registered
//!   sub-account weights, with quantities summing to the execution quantity
//!   exactly
//! - Deterministic rounding: floored shares with quantity and fee
//!   remainders assigned to the first allocation
//! - Append-only settlement attempts with T+n dating; a failed attempt
//!   keeps its record and a retry adds the next one
//!
//! Settlement runs on its own timeline of days and is driven by explicit
//! calls, never by the trading path.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod allocation;
pub mod error;
pub mod settlement;
