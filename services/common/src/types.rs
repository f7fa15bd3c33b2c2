//! Fixed-point price and quantity types
//!
//! All engine arithmetic runs on i64 ticks with 4 decimal places for
//! determinism. `f64` conversions exist only for external API boundaries
//! and display.

use crate::constants::fixed_point::SCALE_4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Price stored as i64 ticks (1 tick = 0.0001 units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Create a price from a float value. External API boundary only;
    /// internal code should prefer `from_i64`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let scaled = (value * SCALE_4 as f64).round();
        Self(clamp_to_i64(scaled))
    }

    /// Create from i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from cents (100 cents = 1 unit)
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents * (SCALE_4 / 100))
    }

    /// Get price as i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Get price as f64. Display/external boundary only; values above
    /// 2^53 / 10000 lose precision.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / SCALE_4 as f64
        }
    }

    /// Add two prices (fixed-point arithmetic)
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Subtract two prices (fixed-point arithmetic)
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Notional value of `qty` at this price, in ticks. Widens to i128
    /// internally so large price/quantity products cannot overflow.
    #[must_use]
    pub const fn mul_qty(self, qty: Qty) -> i64 {
        ((self.0 as i128 * qty.0 as i128) / SCALE_4 as i128) as i64
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE_4;
        let frac = (self.0 % SCALE_4).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Quantity stored as i64 units (1 unit = 0.0001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(i64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Create a quantity from a float value. External API boundary only;
    /// internal code should prefer `from_i64`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let scaled = (value * SCALE_4 as f64).round();
        Self(clamp_to_i64(scaled))
    }

    /// Create from i64 units
    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Create from whole units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * SCALE_4)
    }

    /// Get quantity as i64 units
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Get quantity as f64. Display/external boundary only.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / SCALE_4 as f64
        }
    }

    /// Check if quantity is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Add two quantities (fixed-point arithmetic)
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Subtract two quantities (fixed-point arithmetic)
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Subtract, flooring at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        if self.0 > other.0 { Self(self.0 - other.0) } else { Self(0) }
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE_4;
        let frac = (self.0 % SCALE_4).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Clamp a rounded f64 into the i64 range before casting.
fn clamp_to_i64(scaled: f64) -> i64 {
    const MAX_SAFE: f64 = 9_223_372_036_854_775_807.0;
    const MIN_SAFE: f64 = -9_223_372_036_854_775_808.0;

    if scaled >= MAX_SAFE {
        i64::MAX
    } else if scaled <= MIN_SAFE {
        i64::MIN
    } else {
        #[allow(clippy::cast_possible_truncation)]
        {
            scaled as i64
        }
    }
}
