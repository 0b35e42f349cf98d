//! Fuzz target: `StatisticsWindow`
//!
//! Drives a window of arbitrary length and flags with arbitrary samples and
//! verifies:
//! - No panics, including NaN and infinite samples
//! - `len()` never exceeds the capacity
//! - While every input so far is finite, min <= every live sample <= max
//!
//! cargo fuzz run fuzz_window

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartsensors::config::MAX_WINDOW_LEN;
use smartsensors::{SamplingPeriod, SensorFlags, StatisticsWindow};

fuzz_target!(|data: &[u8]| {
    let [len, flag_bits, period, rest @ ..] = data else {
        return;
    };
    let capacity = usize::from(*len) % (MAX_WINDOW_LEN + 1);
    let flags = SensorFlags {
        store_average: flag_bits & 1 != 0,
        store_min_max: flag_bits & 2 != 0,
        store_trend: flag_bits & 4 != 0,
        skip_eval: false,
        high_precision: flag_bits & 8 != 0,
    };

    let Ok(mut w) = StatisticsWindow::new(capacity, flags) else {
        assert_eq!(capacity, 0);
        return;
    };
    if *period != 0 {
        w.set_period(Some(SamplingPeriod::millis(u32::from(*period))));
    }

    let mut all_finite = true;
    for chunk in rest.chunks_exact(4) {
        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        all_finite &= v.is_finite();
        let agg = w.push(v);
        assert!(w.len() <= w.capacity());

        if flags.store_min_max && all_finite {
            let (min, max) = (agg.min.unwrap_or(f32::MIN), agg.max.unwrap_or(f32::MAX));
            assert!(w.samples().all(|s| min <= s && s <= max));
        }
    }
});
