//! Slice scheduling for time- and volume-weighted strategies

use chrono::{DateTime, Duration, Utc};
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{Qty, Strategy, Symbol};

use crate::error::{ExecutionError, ExecutionResult};
use crate::volume::VolumeCurve;

/// Schedules above this many windows are refused as misconfigured
const MAX_WINDOWS: i64 = 10_000;

/// One scheduled submission window with its quantity target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceWindow {
    /// Window ordinal, zero-based
    pub index: u32,
    /// Submission instant
    pub start: DateTime<Utc>,
    /// End of the window
    pub end: DateTime<Utc>,
    /// Quantity to work in this window
    pub target: Qty,
}

/// Submission plan for a scheduled strategy
///
/// Building the plan doubles as strategy parameter validation, so the
/// engine constructs one at submit time and again inside the worker.
#[derive(Debug, Clone)]
pub struct SlicePlan {
    /// Ordered submission windows
    pub windows: Vec<SliceWindow>,
    /// Sweep any remainder with a market slice after the last window
    pub aggressive_completion: bool,
}

impl SlicePlan {
    /// Build the plan for `strategy`
    ///
    /// `Market` and `Limit` need no schedule and get an empty plan.
    pub fn for_strategy(
        strategy: &Strategy,
        symbol: &Symbol,
        quantity: Qty,
        curve: &dyn VolumeCurve,
    ) -> ExecutionResult<Self> {
        match strategy {
            Strategy::Market | Strategy::Limit => Ok(Self {
                windows: Vec::new(),
                aggressive_completion: false,
            }),
            Strategy::Twap {
                start,
                end,
                interval_minutes,
                aggressive_completion,
            } => Self::twap(*start, *end, *interval_minutes, quantity, *aggressive_completion),
            Strategy::Vwap {
                start,
                end,
                participation_rate_bps,
                aggressive_completion,
            } => Self::vwap(
                *start,
                *end,
                *participation_rate_bps,
                symbol,
                curve,
                *aggressive_completion,
            ),
        }
    }

    /// Evenly timed windows with equal targets; the final window absorbs
    /// the integer-division residue so targets sum to `quantity` exactly
    pub fn twap(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: u32,
        quantity: Qty,
        aggressive_completion: bool,
    ) -> ExecutionResult<Self> {
        let duration = end - start;
        if duration <= Duration::zero() {
            return Err(ExecutionError::InvalidStrategy {
                reason: "schedule end must be after start".to_string(),
            });
        }
        if interval_minutes == 0 {
            return Err(ExecutionError::InvalidStrategy {
                reason: "interval must be positive".to_string(),
            });
        }

        let interval = Duration::minutes(i64::from(interval_minutes));
        let count = (duration.num_seconds() / interval.num_seconds()).max(1);
        if count > MAX_WINDOWS {
            return Err(ExecutionError::InvalidStrategy {
                reason: format!("schedule produces {count} windows, limit is {MAX_WINDOWS}"),
            });
        }

        let base = quantity.as_i64() / count;
        let mut windows = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for index in 0..count {
            // count is bounded by MAX_WINDOWS, so these never saturate
            let ordinal = i32::try_from(index).unwrap_or(i32::MAX);
            let last = index == count - 1;
            windows.push(SliceWindow {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                start: start + interval * ordinal,
                end: if last { end } else { start + interval * (ordinal + 1) },
                target: if last {
                    Qty::from_i64(quantity.as_i64() - base * (count - 1))
                } else {
                    Qty::from_i64(base)
                },
            });
        }

        Ok(Self {
            windows,
            aggressive_completion,
        })
    }

    /// Volume-weighted windows: one per curve bucket, each targeting the
    /// participation share of that bucket's projected volume
    ///
    /// Targets are independent of the order quantity; the worker caps each
    /// submission by the order's remaining quantity.
    pub fn vwap(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        participation_rate_bps: i32,
        symbol: &Symbol,
        curve: &dyn VolumeCurve,
        aggressive_completion: bool,
    ) -> ExecutionResult<Self> {
        let duration = end - start;
        if duration <= Duration::zero() {
            return Err(ExecutionError::InvalidStrategy {
                reason: "schedule end must be after start".to_string(),
            });
        }
        if participation_rate_bps <= 0 || i64::from(participation_rate_bps) > BASIS_POINTS {
            return Err(ExecutionError::InvalidStrategy {
                reason: format!(
                    "participation rate {participation_rate_bps} must be within (0, {BASIS_POINTS}] basis points"
                ),
            });
        }

        let weights = curve.weights();
        if weights.is_empty() {
            return Err(ExecutionError::InvalidStrategy {
                reason: "volume curve has no buckets".to_string(),
            });
        }
        let total_weight: i128 = weights.iter().map(|w| i128::from(*w)).sum();
        if total_weight == 0 {
            return Err(ExecutionError::InvalidStrategy {
                reason: "volume curve weights sum to zero".to_string(),
            });
        }

        let projected = i128::from(curve.projected_volume(symbol).as_i64());
        let window = duration / i32::try_from(weights.len()).unwrap_or(i32::MAX);

        let mut windows = Vec::with_capacity(weights.len());
        for (index, weight) in weights.iter().enumerate() {
            let ordinal = i32::try_from(index).unwrap_or(i32::MAX);
            let last = index == weights.len() - 1;
            let bucket_volume = projected * i128::from(*weight) / total_weight;
            let target =
                bucket_volume * i128::from(participation_rate_bps) / i128::from(BASIS_POINTS);
            windows.push(SliceWindow {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                start: start + window * ordinal,
                end: if last { end } else { start + window * (ordinal + 1) },
                target: Qty::from_i64(i64::try_from(target).unwrap_or(i64::MAX)),
            });
        }

        Ok(Self {
            windows,
            aggressive_completion,
        })
    }

    /// Sum of all window targets
    #[must_use]
    pub fn total_target(&self) -> Qty {
        Qty::from_i64(self.windows.iter().map(|w| w.target.as_i64()).sum())
    }

    /// Whether the plan has any windows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
