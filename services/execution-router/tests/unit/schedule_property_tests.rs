//! Property coverage for schedule construction
//!
//! Schedules are pure functions of the strategy parameters, so these
//! run without a runtime or venue.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use execution_router::schedule::SlicePlan;
use execution_router::volume::FlatCurve;
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{Qty, Symbol};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn twap_conserves_quantity_and_tiles_the_window(
        quantity_units in 1i64..50_000,
        window_count in 1i64..60,
        interval_minutes in 1u32..30,
    ) {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap();
        let end = start + Duration::minutes(i64::from(interval_minutes) * window_count);
        let quantity = Qty::from_units(quantity_units);

        let plan = SlicePlan::twap(start, end, interval_minutes, quantity, false).unwrap();

        // No quantity is dropped and no gap exists between windows.
        prop_assert_eq!(plan.total_target(), quantity);
        prop_assert_eq!(plan.windows.len() as i64, window_count);
        prop_assert_eq!(plan.windows[0].start, start);
        prop_assert_eq!(plan.windows.last().unwrap().end, end);
        for pair in plan.windows.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
        }

        // Every window but the last carries the base target; the last
        // absorbs the division residue.
        let base = quantity.as_i64() / window_count;
        for window in &plan.windows[..plan.windows.len() - 1] {
            prop_assert_eq!(window.target.as_i64(), base);
        }
        prop_assert!(plan.windows.last().unwrap().target.as_i64() >= base);
    }

    #[test]
    fn vwap_targets_are_the_participation_share_of_each_bucket(
        buckets in 1usize..40,
        volume_units in 100i64..1_000_000,
        participation_bps in 1i32..=10_000,
    ) {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap();
        let end = start + Duration::minutes(i64::try_from(buckets).unwrap());
        let volume = Qty::from_units(volume_units);
        let curve = FlatCurve::new(buckets, volume);
        let symbol = Symbol::new("AAPL");

        let plan = SlicePlan::vwap(start, end, participation_bps, &symbol, &curve, false).unwrap();

        prop_assert_eq!(plan.windows.len(), buckets);
        let bucket_volume = i128::from(volume.as_i64()) / i128::try_from(buckets).unwrap();
        let expected = bucket_volume * i128::from(participation_bps) / i128::from(BASIS_POINTS);
        for window in &plan.windows {
            prop_assert_eq!(i128::from(window.target.as_i64()), expected);
        }
        prop_assert_eq!(plan.windows.last().unwrap().end, end);
    }

    #[test]
    fn degenerate_twap_windows_are_refused(
        quantity_units in 1i64..1_000,
        backwards_minutes in 0i64..120,
    ) {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap();
        let end = start - Duration::minutes(backwards_minutes);
        let plan = SlicePlan::twap(start, end, 5, Qty::from_units(quantity_units), false);
        prop_assert!(plan.is_err());
    }
}
