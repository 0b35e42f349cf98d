//! Where a sensor's raw value comes from.
//!
//! A sensor either reads a physical pin or observes a computed field of
//! another sensor.  The observer link is a `Weak` reference: a derived
//! sensor never keeps its source alive, and a released source surfaces as
//! [`AcquireError::SourceReleased`] rather than a dangling read.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::config::MAX_DERIVATION_DEPTH;
use crate::error::{AcquireError, ConfigError};
use crate::ports::{PinDriver, PinId};

use super::{Sensor, SensorShared};

/// Held across the cycle check and the source swap of every rebind, so two
/// rebinds cannot each pass the check and close a cycle together.
static REBIND: Mutex<()> = Mutex::new(());

pub(crate) fn rebind_lock() -> MutexGuard<'static, ()> {
    REBIND.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Computed field a derived sensor reads from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Average,
    Derivative,
}

#[derive(Clone)]
pub enum Source {
    Pin(PinId),
    Derived(DerivedSource),
}

/// Non-owning `(sensor, field)` pair.
#[derive(Clone)]
pub struct DerivedSource {
    sensor: Weak<SensorShared>,
    field: Field,
}

impl DerivedSource {
    pub fn field(&self) -> Field {
        self.field
    }
}

impl core::fmt::Debug for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Pin(pin) => write!(f, "Pin({pin})"),
            Self::Derived(d) => match d.sensor.upgrade() {
                Some(s) => write!(f, "Derived(sensor#{}, {:?})", s.id, d.field),
                None => write!(f, "Derived(released, {:?})", d.field),
            },
        }
    }
}

impl Source {
    pub fn derived(sensor: &Sensor, field: Field) -> Self {
        Self::Derived(DerivedSource {
            sensor: Arc::downgrade(&sensor.shared),
            field,
        })
    }

    /// Read the current value.  `Ok(None)` when a derived source has not
    /// produced the selected field yet.
    pub(crate) fn read(&self, pins: &dyn PinDriver) -> Result<Option<f32>, AcquireError> {
        match self {
            Self::Pin(pin) => Ok(Some(pins.read(*pin)?)),
            Self::Derived(d) => {
                let shared = d.sensor.upgrade().ok_or(AcquireError::SourceReleased)?;
                let state = Sensor { shared }.state();
                Ok(match d.field {
                    Field::Average => state.average(),
                    Field::Derivative => state.derivative(),
                })
            }
        }
    }

    fn upstream(&self) -> Option<Arc<SensorShared>> {
        match self {
            Self::Pin(_) => None,
            Self::Derived(d) => d.sensor.upgrade(),
        }
    }

    /// Refuse `self` as the source of `owner` if the derivation chain
    /// reaches `owner` again, or runs deeper than [`MAX_DERIVATION_DEPTH`].
    pub(crate) fn check_acyclic(&self, owner: &Arc<SensorShared>) -> Result<(), ConfigError> {
        let mut next = self.upstream();
        for _ in 0..MAX_DERIVATION_DEPTH {
            let Some(sensor) = next else {
                return Ok(());
            };
            if Arc::ptr_eq(&sensor, owner) {
                return Err(ConfigError::SourceCycle);
            }
            next = sensor.lock_core().source.upstream();
        }
        match next {
            None => Ok(()),
            Some(_) => Err(ConfigError::SourceCycle),
        }
    }
}
