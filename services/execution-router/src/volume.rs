//! Intraday volume curves for volume-weighted scheduling

use rustc_hash::FxHashMap;
use services_common::{Qty, Symbol};

/// Projected intraday volume distribution
///
/// Implementations supply relative weights across consecutive equal time
/// buckets plus a projected total volume for the execution window. Both
/// feed the volume-weighted slice targets.
pub trait VolumeCurve: Send + Sync {
    /// Relative volume weights, one per bucket, in session order
    fn weights(&self) -> &[u32];

    /// Projected tradable volume across the whole window for `symbol`
    fn projected_volume(&self, symbol: &Symbol) -> Qty;

    /// Weights resampled onto `buckets` windows
    ///
    /// Nearest-index sampling; exact when `buckets` equals the native
    /// bucket count.
    fn sampled_weights(&self, buckets: usize) -> Vec<u32> {
        let native = self.weights();
        if buckets == 0 || native.is_empty() {
            return Vec::new();
        }
        (0..buckets)
            .map(|bucket| native[bucket * native.len() / buckets])
            .collect()
    }
}

/// U-shaped curve typical of an equities session: heavy open, quiet
/// midday, heavy close
pub struct UShapedCurve {
    weights: Vec<u32>,
    projected: FxHashMap<Symbol, Qty>,
    default_volume: Qty,
}

impl UShapedCurve {
    /// Create with the standard session shape and a fallback projected
    /// volume used for symbols without an override
    #[must_use]
    pub fn new(default_volume: Qty) -> Self {
        Self {
            weights: vec![
                150, 120, 100, 80, 70, 60, 50, 45, 40, 35, // Morning
                30, 28, 25, 25, 25, 25, 25, 28, 30, 35, // Midday
                40, 45, 50, 60, 70, 80, 100, 120, 150, 200, // Afternoon
            ],
            projected: FxHashMap::default(),
            default_volume,
        }
    }

    /// Override the projected volume for one symbol
    #[must_use]
    pub fn with_projected_volume(mut self, symbol: Symbol, volume: Qty) -> Self {
        self.projected.insert(symbol, volume);
        self
    }
}

impl Default for UShapedCurve {
    fn default() -> Self {
        Self::new(Qty::from_units(1_000_000))
    }
}

impl VolumeCurve for UShapedCurve {
    fn weights(&self) -> &[u32] {
        &self.weights
    }

    fn projected_volume(&self, symbol: &Symbol) -> Qty {
        self.projected
            .get(symbol)
            .copied()
            .unwrap_or(self.default_volume)
    }
}

/// Uniform curve, mostly useful in tests where even targets are easier
/// to reason about
pub struct FlatCurve {
    weights: Vec<u32>,
    volume: Qty,
}

impl FlatCurve {
    /// Equal weight across `buckets` buckets with one projected volume
    /// for every symbol
    #[must_use]
    pub fn new(buckets: usize, volume: Qty) -> Self {
        Self {
            weights: vec![1; buckets.max(1)],
            volume,
        }
    }
}

impl VolumeCurve for FlatCurve {
    fn weights(&self) -> &[u32] {
        &self.weights
    }

    fn projected_volume(&self, _symbol: &Symbol) -> Qty {
        self.volume
    }
}
