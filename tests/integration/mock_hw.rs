//! Scripted pin source for integration tests.
//!
//! Every read of a pin pops the next value of its script; once the script
//! runs out the last value repeats.  Timers, edges and loops come from the
//! library's simulation adapters, so tests drive time explicitly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use smartsensors::adapters::sim::SimPlatform;
use smartsensors::{HwError, PinId, Platform};
use smartsensors::ports::{PinDriver, PinMode};

// ── ScriptedPins ──────────────────────────────────────────────

#[derive(Default)]
struct Script {
    pending: VecDeque<f32>,
    last: Option<f32>,
    reads: usize,
}

#[derive(Default)]
pub struct ScriptedPins {
    scripts: Mutex<HashMap<PinId, Script>>,
    modes: Mutex<HashMap<PinId, PinMode>>,
}

#[allow(dead_code)]
impl ScriptedPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `values` to the script of `pin`.
    pub fn script(&self, pin: PinId, values: &[f32]) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(pin).or_default().pending.extend(values.iter().copied());
    }

    /// Number of reads served for `pin`.
    pub fn reads(&self, pin: PinId) -> usize {
        self.scripts.lock().unwrap().get(&pin).map_or(0, |s| s.reads)
    }

    pub fn mode(&self, pin: PinId) -> Option<PinMode> {
        self.modes.lock().unwrap().get(&pin).copied()
    }
}

impl PinDriver for ScriptedPins {
    fn configure(&self, pin: PinId, mode: PinMode) -> Result<(), HwError> {
        self.modes.lock().unwrap().insert(pin, mode);
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<f32, HwError> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(&pin).ok_or(HwError::UnknownPin(pin))?;
        script.reads += 1;
        if let Some(v) = script.pending.pop_front() {
            script.last = Some(v);
        }
        script.last.ok_or(HwError::PinReadFailed(-1))
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Scripted pins plus the simulated clock, edges and executor.
pub struct Rig {
    pub sim: SimPlatform,
    pub pins: Arc<ScriptedPins>,
    pub platform: Platform,
}

impl Rig {
    pub fn new() -> Self {
        let sim = SimPlatform::new();
        let pins = Arc::new(ScriptedPins::new());
        let platform = Platform::new(
            pins.clone(),
            sim.pins.clone(),
            sim.clock.clone(),
            sim.executor.clone(),
        );
        Self { sim, pins, platform }
    }

    pub fn advance(&self, ms: u64) {
        self.sim.clock.advance(ms);
    }
}

/// Collects every value a sensor hook observes.
pub fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (Arc::clone(&log), log)
}
