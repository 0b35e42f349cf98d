//! [`PinDriver`] over `embedded-hal` digital inputs.
//!
//! Lets boards whose pins come from a HAL crate (or test doubles) feed
//! digital sensors without an ADC.  Analog configuration is refused.

use std::sync::{Mutex, PoisonError};

use embedded_hal::digital::InputPin;

use crate::error::HwError;
use crate::ports::{PinDriver, PinId, PinMode};

pub struct HalPins<P> {
    pins: Mutex<Vec<(PinId, P)>>,
}

impl<P: InputPin + Send> HalPins<P> {
    pub fn new() -> Self {
        Self {
            pins: Mutex::new(Vec::new()),
        }
    }

    /// Add `input` as `id`; replaces a pin registered under the same id.
    pub fn with_pin(self, id: PinId, input: P) -> Self {
        {
            let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
            pins.retain(|(p, _)| *p != id);
            pins.push((id, input));
        }
        self
    }
}

impl<P: InputPin + Send> Default for HalPins<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: InputPin + Send> PinDriver for HalPins<P> {
    fn configure(&self, pin: PinId, mode: PinMode) -> Result<(), HwError> {
        let pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        if !pins.iter().any(|(p, _)| *p == pin) {
            return Err(HwError::UnknownPin(pin));
        }
        match mode {
            PinMode::DigitalInput => Ok(()),
            PinMode::AnalogInput => Err(HwError::PinConfigFailed(-1)),
        }
    }

    fn read(&self, pin: PinId) -> Result<f32, HwError> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, input) = pins
            .iter_mut()
            .find(|(p, _)| *p == pin)
            .ok_or(HwError::UnknownPin(pin))?;
        match input.is_high() {
            Ok(true) => Ok(1.0),
            Ok(false) => Ok(0.0),
            Err(_) => Err(HwError::PinReadFailed(-1)),
        }
    }
}
