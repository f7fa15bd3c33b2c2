//! Numeric constants shared across services

/// Fixed-point scaling factors
pub mod fixed_point {
    /// Scale for 4 decimal places (1 tick = 0.0001)
    pub const SCALE_4: i64 = 10_000;

    /// Scale for 2 decimal places
    pub const SCALE_2: i64 = 100;

    /// Basis point divisor (10_000 bps = 100%)
    pub const BASIS_POINTS: i64 = 10_000;
}
