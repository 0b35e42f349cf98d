//! Sensor and pool configuration parameters.
//!
//! Everything here is plain data: flags that steer window evaluation,
//! sampling units and periods, and the serialisable pool plan the demo
//! firmware loads at boot.  Static capacities live here too so every module
//! sizes its fixed buffers from one place.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// --- Static capacities ---

/// Longest observation window (samples) a sensor can hold.
pub const MAX_WINDOW_LEN: usize = 128;
/// Most sensors a single pool can multiplex.
pub const MAX_POOL_SENSORS: usize = 16;
/// Most steps an edge sequence can have.
pub const MAX_SEQUENCE_STEPS: usize = 8;
/// Deepest derived-sensor chain walked when checking for cycles.
pub const MAX_DERIVATION_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Evaluation flags
// ---------------------------------------------------------------------------

/// Numeric mode for every division in window evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// Floor division, as integer arithmetic on small MCUs.
    #[default]
    Integer,
    /// Plain floating point division.
    Real,
}

impl Precision {
    pub fn div(self, num: f32, den: f32) -> f32 {
        match self {
            Self::Integer => (num / den).floor(),
            Self::Real => num / den,
        }
    }
}

/// Per-sensor switches for window evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorFlags {
    /// Maintain the moving average.
    pub store_average: bool,
    /// Maintain window minimum and maximum.
    pub store_min_max: bool,
    /// Maintain the window trend.
    pub store_trend: bool,
    /// Skip window evaluation entirely; only samples are kept.
    pub skip_eval: bool,
    /// Real instead of floor division.
    pub high_precision: bool,
}

impl SensorFlags {
    /// Analog inputs track every aggregate with integer arithmetic.
    pub const fn analog() -> Self {
        Self {
            store_average: true,
            store_min_max: true,
            store_trend: true,
            skip_eval: false,
            high_precision: false,
        }
    }

    /// Digital inputs only average (duty ratio), in real arithmetic.
    pub const fn digital() -> Self {
        Self {
            store_average: true,
            store_min_max: false,
            store_trend: false,
            skip_eval: false,
            high_precision: true,
        }
    }

    pub fn precision(&self) -> Precision {
        if self.high_precision {
            Precision::Real
        } else {
            Precision::Integer
        }
    }
}

impl Default for SensorFlags {
    fn default() -> Self {
        Self::analog()
    }
}

// ---------------------------------------------------------------------------
// Sampling parameters
// ---------------------------------------------------------------------------

/// Unit of a sampling period; selects the scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingUnit {
    /// Periodic timer callback.
    #[default]
    Millis,
    /// Dedicated tight loop sleeping between samples.
    Micros,
}

/// Which pipeline an acquisition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionKind {
    #[default]
    Raw,
    /// Raw value passed through the sensor's normalization function.
    Normalized,
}

/// Sampling period with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingPeriod {
    pub value: u32,
    pub unit: SamplingUnit,
}

impl SamplingPeriod {
    pub const fn millis(value: u32) -> Self {
        Self {
            value,
            unit: SamplingUnit::Millis,
        }
    }

    pub const fn micros(value: u32) -> Self {
        Self {
            value,
            unit: SamplingUnit::Micros,
        }
    }

    pub fn as_secs_f32(&self) -> f32 {
        match self.unit {
            SamplingUnit::Millis => self.value as f32 / 1_000.0,
            SamplingUnit::Micros => self.value as f32 / 1_000_000.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.value == 0 {
            return Err(ConfigError::InvalidPeriod);
        }
        Ok(())
    }
}

/// Reject window lengths the static buffer cannot hold.
pub fn validate_window(len: usize) -> Result<(), ConfigError> {
    if len == 0 {
        return Err(ConfigError::InvalidWindowLength);
    }
    if len > MAX_WINDOW_LEN {
        return Err(ConfigError::WindowTooLong {
            requested: len,
            max: MAX_WINDOW_LEN,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pool plan
// ---------------------------------------------------------------------------

/// Sampling parameters of one pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Sampling period in milliseconds.
    pub period_ms: u32,
    /// Observation window; `None` skips window evaluation.
    #[serde(default)]
    pub window: Option<usize>,
    #[serde(default)]
    pub kind: AcquisitionKind,
}

/// Ordered per-member sampling parameters of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolPlan {
    pub entries: heapless::Vec<PoolEntry, MAX_POOL_SENSORS>,
}

impl PoolPlan {
    /// Parse and validate a JSON plan, e.g.
    /// `{"entries":[{"period_ms":1000,"window":5,"kind":"Raw"}]}`.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let plan: Self = serde_json::from_str(doc).map_err(|_| ConfigError::InvalidDocument)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        for entry in &self.entries {
            SamplingPeriod::millis(entry.period_ms).validate()?;
            if let Some(len) = entry.window {
                validate_window(len)?;
            }
        }
        Ok(())
    }

    pub fn periods(&self) -> heapless::Vec<u32, MAX_POOL_SENSORS> {
        self.entries.iter().map(|e| e.period_ms).collect()
    }

    pub fn windows(&self) -> heapless::Vec<Option<usize>, MAX_POOL_SENSORS> {
        self.entries.iter().map(|e| e.window).collect()
    }

    pub fn kinds(&self) -> heapless::Vec<AcquisitionKind, MAX_POOL_SENSORS> {
        self.entries.iter().map(|e| e.kind).collect()
    }
}
