//! Analog sensor construction.
//!
//! Analog sensors read raw ADC conversions and track every aggregate in
//! integer precision unless told otherwise.  A derived sensor is an analog
//! sensor fed by another sensor's average or derivative instead of a pin.

use log::info;

use crate::config::SensorFlags;
use crate::error::HwError;
use crate::ports::{PinId, PinMode, Platform};

use super::{Field, Sensor, Source};

impl Sensor {
    /// Sensor on an ADC pin.  The pin is configured here.
    pub fn analog(pin: PinId, platform: &Platform) -> Result<Self, HwError> {
        platform.pins.configure(pin, PinMode::AnalogInput)?;
        let sensor = Self::with_source(Source::Pin(pin), SensorFlags::analog(), platform);
        info!("sensor#{}: analog on {}", sensor.id(), pin);
        Ok(sensor)
    }

    /// Sensor observing `field` of `source`.
    ///
    /// The new sensor cannot be part of a cycle yet, so no check is needed;
    /// later [`Sensor::rebind_source`] calls are checked.
    pub fn derived(source: &Sensor, field: Field, platform: &Platform) -> Self {
        let sensor = Self::with_source(Source::derived(source, field), SensorFlags::analog(), platform);
        info!("sensor#{}: derived from sensor#{} {:?}", sensor.id(), source.id(), field);
        sensor
    }
}
