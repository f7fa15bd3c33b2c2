//! Execution strategy descriptors
//!
//! The strategy travels with the order. The execution router turns it into
//! a slice schedule; everything else treats it as opaque data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an order's quantity is worked over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Single immediate slice for the full remaining quantity
    Market,
    /// Single persistent slice resting at the order's limit price
    Limit,
    /// Equal time slicing of `[start, end)`
    Twap {
        /// Schedule window start
        start: DateTime<Utc>,
        /// Schedule window end (exclusive)
        end: DateTime<Utc>,
        /// Interval width in minutes
        interval_minutes: u32,
        /// Emit one final market slice for any remainder at `end`
        aggressive_completion: bool,
    },
    /// Volume-curve slicing of `[start, end)`
    Vwap {
        /// Schedule window start
        start: DateTime<Utc>,
        /// Schedule window end (exclusive)
        end: DateTime<Utc>,
        /// Target participation of predicted interval volume, in basis points
        participation_rate_bps: i32,
        /// Emit one final market slice for any remainder at `end`
        aggressive_completion: bool,
    },
}

impl Strategy {
    /// Strategy name for logs and reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Twap { .. } => "twap",
            Self::Vwap { .. } => "vwap",
        }
    }

    /// True for strategies that slice over a time window
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        matches!(self, Self::Twap { .. } | Self::Vwap { .. })
    }

    /// Whether the remainder at `end` completes with a market slice
    #[must_use]
    pub const fn aggressive_completion(&self) -> bool {
        match self {
            Self::Market | Self::Limit => false,
            Self::Twap {
                aggressive_completion,
                ..
            }
            | Self::Vwap {
                aggressive_completion,
                ..
            } => *aggressive_completion,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
