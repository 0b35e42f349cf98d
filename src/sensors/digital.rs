//! Digital sensors: windowed duty-cycle statistics plus edge sequences.
//!
//! A [`DigitalSensor`] is a [`Sensor`] (it derefs to one) on a digital
//! input, with the edge-driven API on top.  Edge sequences never go
//! through the statistics window; they run on the pin's edge
//! notifications and their own timers.
//!
//! `on_sequence`, `on_rise` and `on_fall` all register on the same pin
//! edges, so each call replaces what an earlier one registered for that
//! edge.

use core::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use crate::config::SensorFlags;
use crate::error::{ConfigError, HwError};
use crate::ports::{EdgeNotifier, PinId, PinMode, Platform, Timer};
use crate::sequence::{Edge, EdgeSequenceMatcher, Level, SequenceSpec, StepAction};

use super::{Sensor, Source};

pub struct DigitalSensor {
    sensor: Sensor,
    pin: PinId,
    edges: Arc<dyn EdgeNotifier>,
    timer: Arc<dyn Timer>,
    sequence: Mutex<Option<EdgeSequenceMatcher>>,
}

impl Deref for DigitalSensor {
    type Target = Sensor;

    fn deref(&self) -> &Sensor {
        &self.sensor
    }
}

impl DigitalSensor {
    /// Sensor on a digital input pin.  Reads are `0.0` / `1.0`.
    pub fn new(pin: PinId, platform: &Platform) -> Result<Self, HwError> {
        platform.pins.configure(pin, PinMode::DigitalInput)?;
        let sensor = Sensor::with_source(Source::Pin(pin), SensorFlags::digital(), platform);
        info!("sensor#{}: digital on {}", sensor.id(), pin);
        Ok(Self {
            sensor,
            pin,
            edges: Arc::clone(&platform.edges),
            timer: Arc::clone(&platform.timer),
            sequence: Mutex::new(None),
        })
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// The underlying sensor handle, e.g. to put it in a pool.
    pub fn as_sensor(&self) -> &Sensor {
        &self.sensor
    }

    /// Recognise a timed sequence of level changes.  Replaces any sequence
    /// configured before.
    pub fn on_sequence(&self, spec: SequenceSpec) -> Result<&Self, ConfigError> {
        let matcher = EdgeSequenceMatcher::new(self.pin, Arc::clone(&self.timer), spec)?;
        self.edges.on_rise(self.pin, Box::new(matcher.edge_handler(Edge::Rise)));
        self.edges.on_fall(self.pin, Box::new(matcher.edge_handler(Edge::Fall)));
        // Dropping the previous matcher cancels its timers.
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner) = Some(matcher);
        Ok(self)
    }

    /// LOW → HIGH, held `min_ms..max_ms`, then HIGH → LOW runs `action`.
    /// Holding past `max_ms` runs `overflow`, if given.
    pub fn on_rise_and_fall(
        &self,
        min_ms: u32,
        max_ms: u32,
        action: impl FnMut() + Send + 'static,
        overflow: Option<StepAction>,
    ) -> Result<&Self, ConfigError> {
        self.on_sequence(SequenceSpec::single(Level::Low, min_ms, max_ms, Box::new(action), overflow))
    }

    /// HIGH → LOW, held `min_ms..max_ms`, then LOW → HIGH runs `action`.
    pub fn on_fall_and_rise(
        &self,
        min_ms: u32,
        max_ms: u32,
        action: impl FnMut() + Send + 'static,
        overflow: Option<StepAction>,
    ) -> Result<&Self, ConfigError> {
        self.on_sequence(SequenceSpec::single(Level::High, min_ms, max_ms, Box::new(action), overflow))
    }

    /// Raw callback on every rising edge of the pin.
    pub fn on_rise(&self, action: impl FnMut() + Send + 'static) -> &Self {
        self.edges.on_rise(self.pin, Box::new(action));
        self
    }

    /// Raw callback on every falling edge of the pin.
    pub fn on_fall(&self, action: impl FnMut() + Send + 'static) -> &Self {
        self.edges.on_fall(self.pin, Box::new(action));
        self
    }

    /// Drop the configured sequence and cancel its timers.
    pub fn clear_sequence(&self) -> &Self {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner).take();
        self
    }

    pub fn has_sequence(&self) -> bool {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}
