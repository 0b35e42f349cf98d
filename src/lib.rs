//! SmartSensors library.
//!
//! Windowed statistics over sampled pins, timed edge-sequence recognition
//! on digital inputs, and many sensors multiplexed on one timer.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each adapter; everything else runs on the host against
//! [`adapters::sim`].
//!
//! ```text
//! pins ──▶ Sensor ──▶ StatisticsWindow ──▶ hooks (actions, checks)
//!   │         ▲
//!   │         └── SensorPool (one timer, remaining-time scheduling)
//!   └──▶ edges ──▶ EdgeSequenceMatcher ──▶ step actions
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod events;
pub mod pins;
pub mod pool;
pub mod ports;
pub mod sensors;
pub mod sequence;
pub mod window;

mod error;
mod esp_link_shims;

pub use config::{
    AcquisitionKind, PoolEntry, PoolPlan, Precision, SamplingPeriod, SamplingUnit, SensorFlags,
};
pub use error::{AcquireError, ConfigError, Error, HwError};
pub use pool::SensorPool;
pub use ports::{PinId, Platform};
pub use sensors::{DigitalSensor, Field, Sensor, SensorState, Source};
pub use sequence::{Edge, EdgeSequenceMatcher, Level, SequenceSpec, StepAction};
pub use window::{Aggregates, StatisticsWindow};
