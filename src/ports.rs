//! Port traits: the boundary between sensor logic and the hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Sensor / SensorPool / EdgeSequenceMatcher
//! ```
//!
//! Adapters (ESP-IDF GPIO + esp_timer, embedded-hal pins, the host
//! simulation) implement these traits.  The core only ever sees them through
//! `Arc<dyn _>` handles bundled in a [`Platform`], so every piece of sampling
//! and debounce logic runs unchanged against the simulation in tests.
//!
//! All callbacks handed to a port are `Send`: timer expirations run on the
//! timer task, edge notifications on whatever context drains the ISR queue,
//! and loop bodies on their own thread.

use core::fmt;
use core::ops::ControlFlow;

use std::sync::Arc;

use embedded_hal::delay::DelayNs;

use crate::error::HwError;

// ───────────────────────────────────────────────────────────────
// Pins
// ───────────────────────────────────────────────────────────────

/// GPIO number of a physical pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub i32);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// How a pin is configured before it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// ADC channel; reads return the raw conversion.
    AnalogInput,
    /// Digital input; reads return `0.0` or `1.0`.
    DigitalInput,
}

/// Synchronous raw reads from physical pins.
pub trait PinDriver: Send + Sync {
    /// Configure `pin` for reading in `mode`.
    fn configure(&self, pin: PinId, mode: PinMode) -> Result<(), HwError>;

    /// Read the current raw value of `pin`.
    fn read(&self, pin: PinId) -> Result<f32, HwError>;
}

// ───────────────────────────────────────────────────────────────
// Edge notifications
// ───────────────────────────────────────────────────────────────

/// Callback fired on an electrical transition.
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// Registers per-pin edge callbacks.
///
/// Registering again for the same pin and edge replaces the previous
/// callback.
pub trait EdgeNotifier: Send + Sync {
    /// Fire `callback` on every LOW → HIGH transition of `pin`.
    fn on_rise(&self, pin: PinId, callback: EdgeCallback);

    /// Fire `callback` on every HIGH → LOW transition of `pin`.
    fn on_fall(&self, pin: PinId, callback: EdgeCallback);
}

// ───────────────────────────────────────────────────────────────
// Timers
// ───────────────────────────────────────────────────────────────

/// Opaque handle of an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u32);

/// Callback fired on timer expiry.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Millisecond one-shot / periodic timers.
///
/// Cancellation is best effort: a callback that already fired and is queued
/// for execution may still run once after `cancel` returns.  Every caller in
/// this crate tags its callbacks so such a late run is recognised and ignored.
pub trait Timer: Send + Sync {
    /// Run `callback` once, `delay_ms` from now.
    fn one_shot(&self, delay_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError>;

    /// Run `callback` every `period_ms` until cancelled.
    fn interval(&self, period_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError>;

    /// Disarm `handle`.  Unknown or already-expired handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

// ───────────────────────────────────────────────────────────────
// Concurrent execution
// ───────────────────────────────────────────────────────────────

/// One iteration of a dedicated loop.  The executor calls it repeatedly,
/// handing in the delay provider of the loop's own context, until it
/// returns `ControlFlow::Break`.
pub type LoopBody = Box<dyn FnMut(&mut dyn DelayNs) -> ControlFlow<()> + Send + 'static>;

/// Spawns independent units of execution (threads / RTOS tasks).
pub trait ConcurrentExecution: Send + Sync {
    fn spawn(&self, name: &'static str, body: LoopBody) -> Result<(), HwError>;
}

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

/// Every capability a sensor may need, cheaply cloneable.
#[derive(Clone)]
pub struct Platform {
    pub pins: Arc<dyn PinDriver>,
    pub edges: Arc<dyn EdgeNotifier>,
    pub timer: Arc<dyn Timer>,
    pub executor: Arc<dyn ConcurrentExecution>,
}

impl Platform {
    pub fn new(
        pins: Arc<dyn PinDriver>,
        edges: Arc<dyn EdgeNotifier>,
        timer: Arc<dyn Timer>,
        executor: Arc<dyn ConcurrentExecution>,
    ) -> Self {
        Self {
            pins,
            edges,
            timer,
            executor,
        }
    }
}
