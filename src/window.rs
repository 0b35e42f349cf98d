//! Rolling-window statistics for a single sensor.
//!
//! Fixed-capacity circular buffer plus cached aggregates.  Every `push` is
//! O(1) except for one case: when the evicted sample *was* the cached
//! minimum (or maximum) and the incoming sample does not replace it, the
//! buffer has to be rescanned to find the new extremum.
//!
//! ```text
//!            cursor (next write / oldest once full)
//!              ▼
//!   ┌────┬────┬────┬────┬────┐
//!   │ s5 │ s6 │ s2 │ s3 │ s4 │   N = 5, s6 newest, s2 oldest
//!   └────┴────┴────┴────┴────┘
//! ```
//!
//! | Aggregate  | Available                        | Update                               |
//! |------------|----------------------------------|--------------------------------------|
//! | average    | once the window has filled       | `div(avg·N + new − evicted, N)`      |
//! | min / max  | from the first sample            | eviction-aware, rescan on tie        |
//! | trend      | once filled, period known        | `div(new − oldest, N · period_s)`    |
//! | derivative | from the second sample, period known | `div(new − previous, period_s)`  |
//!
//! `div` is floor division in [`Precision::Integer`] mode and real division
//! in [`Precision::Real`] mode.

use serde::{Deserialize, Serialize};

use crate::config::{validate_window, Precision, SamplingPeriod, SensorFlags, MAX_WINDOW_LEN};
use crate::error::ConfigError;

/// Cached window aggregates.  `None` means "no data yet".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aggregates {
    pub average: Option<f32>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub trend: Option<f32>,
    pub derivative: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct StatisticsWindow {
    buf: heapless::Vec<f32, MAX_WINDOW_LEN>,
    capacity: usize,
    cursor: usize,
    flags: SensorFlags,
    period: Option<SamplingPeriod>,
    previous: Option<f32>,
    aggregates: Aggregates,
}

impl StatisticsWindow {
    /// Create an empty window of `capacity` samples.
    ///
    /// A zero capacity is rejected here so `push` can never fail.
    pub fn new(capacity: usize, flags: SensorFlags) -> Result<Self, ConfigError> {
        validate_window(capacity)?;
        Ok(Self {
            buf: heapless::Vec::new(),
            capacity,
            cursor: 0,
            flags,
            period: None,
            previous: None,
            aggregates: Aggregates::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid samples.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f32> {
        self.previous
    }

    /// Valid samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        let split = if self.is_full() { self.cursor } else { 0 };
        let (newer, older) = self.buf.split_at(split);
        older.iter().chain(newer.iter()).copied()
    }

    /// Change flags mid-stream.  Average and min/max are re-derived from the
    /// buffered samples so they describe the valid entries at once.
    pub fn set_flags(&mut self, flags: SensorFlags) {
        self.flags = flags;
        self.aggregates.average = if flags.store_average { self.full_average() } else { None };
        if flags.store_min_max && !self.buf.is_empty() {
            self.aggregates.min = Some(self.scan(f32::min));
            self.aggregates.max = Some(self.scan(f32::max));
        } else {
            self.aggregates.min = None;
            self.aggregates.max = None;
        }
        if !flags.store_trend {
            self.aggregates.trend = None;
        }
    }

    /// Sampling period used for derivative and trend; `None` disables both.
    pub fn set_period(&mut self, period: Option<SamplingPeriod>) {
        self.period = period;
    }

    pub fn period(&self) -> Option<SamplingPeriod> {
        self.period
    }

    /// Drop every sample and aggregate.  Capacity, flags and period stay.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.cursor = 0;
        self.previous = None;
        self.aggregates = Aggregates::default();
    }

    /// Insert `value`, evicting the oldest sample once full, and return the
    /// updated aggregates.
    pub fn push(&mut self, value: f32) -> Aggregates {
        let n = self.capacity as f32;
        let precision = self.flags.precision();

        let evicted = if self.is_full() {
            let old = self.buf[self.cursor];
            self.buf[self.cursor] = value;
            Some(old)
        } else {
            // Capacity is bounded by MAX_WINDOW_LEN at construction.
            let _ = self.buf.push(value);
            None
        };
        self.cursor = (self.cursor + 1) % self.capacity;
        let full = self.is_full();

        if self.flags.store_average {
            self.aggregates.average = match (self.aggregates.average, evicted) {
                (Some(avg), Some(old)) => Some(precision.div(avg * n + value - old, n)),
                (None, _) => self.full_average(),
                (avg, None) => avg,
            };
        }

        if let Some(secs) = self.period.map(|p| p.as_secs_f32()) {
            if let Some(prev) = self.previous {
                self.aggregates.derivative = Some(precision.div(value - prev, secs));
            }
            if self.flags.store_trend && full {
                let oldest = self.buf[self.cursor];
                self.aggregates.trend = Some(precision.div(value - oldest, n * secs));
            }
        }

        if self.flags.store_min_max {
            self.update_extrema(value, evicted);
        }

        self.previous = Some(value);
        self.aggregates
    }

    fn update_extrema(&mut self, value: f32, evicted: Option<f32>) {
        let (Some(min), Some(max)) = (self.aggregates.min, self.aggregates.max) else {
            // `value` is already buffered.
            self.aggregates.min = Some(self.scan(f32::min));
            self.aggregates.max = Some(self.scan(f32::max));
            return;
        };

        let new_min = match evicted {
            Some(old) if old == min && value > min => self.scan(f32::min),
            _ => min.min(value),
        };
        let new_max = match evicted {
            Some(old) if old == max && value < max => self.scan(f32::max),
            _ => max.max(value),
        };

        self.aggregates.min = Some(new_min);
        self.aggregates.max = Some(new_max);
    }

    fn full_average(&self) -> Option<f32> {
        let n = self.capacity as f32;
        self.is_full()
            .then(|| self.flags.precision().div(self.buf.iter().sum(), n))
    }

    fn scan(&self, pick: fn(f32, f32) -> f32) -> f32 {
        self.buf.iter().copied().reduce(pick).unwrap_or_default()
    }
}
