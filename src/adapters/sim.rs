//! Host simulation of every port: virtual-time timers, scriptable pins and a
//! step-by-step loop executor.
//!
//! Nothing here sleeps or spawns.  Tests move time forward explicitly with
//! [`SimClock::advance`], change pin levels with [`SimPins::set_level`] (which
//! fires the registered edge callbacks) and run microsecond loops one
//! iteration at a time with [`ManualExecutor::step_all`].
//!
//! Callbacks are always invoked with no internal lock held, so they may arm,
//! cancel or re-register freely.

use core::ops::ControlFlow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;

use crate::error::HwError;
use crate::ports::{
    ConcurrentExecution, EdgeCallback, EdgeNotifier, LoopBody, PinDriver, PinId, PinMode, Platform, Timer,
    TimerCallback, TimerHandle,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Virtual clock
// ───────────────────────────────────────────────────────────────

struct Entry {
    due_ms: u64,
    period_ms: Option<u32>,
    /// `None` while the callback is running.
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct ClockInner {
    now_ms: u64,
    next_handle: u32,
    entries: BTreeMap<u32, Entry>,
    peak: usize,
    fail_arms: bool,
}

impl ClockInner {
    fn insert(&mut self, delay_ms: u32, period_ms: Option<u32>, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        if self.fail_arms {
            return Err(HwError::TimerUnavailable);
        }
        self.next_handle = self.next_handle.wrapping_add(1);
        let handle = self.next_handle;
        self.entries.insert(
            handle,
            Entry {
                due_ms: self.now_ms + u64::from(delay_ms),
                period_ms,
                callback: Some(callback),
            },
        );
        self.peak = self.peak.max(self.entries.len());
        Ok(TimerHandle(handle))
    }

    /// Earliest runnable entry due at or before `limit`; ties go to the
    /// entry armed first.
    fn next_due(&self, limit: u64) -> Option<(u32, u64)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.callback.is_some() && e.due_ms <= limit)
            .min_by_key(|(h, e)| (e.due_ms, **h))
            .map(|(h, e)| (*h, e.due_ms))
    }
}

/// Virtual millisecond timer.
#[derive(Default)]
pub struct SimClock {
    inner: Mutex<ClockInner>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        lock(&self.inner).now_ms
    }

    /// Move time forward by `ms`, firing every timer that falls due, in
    /// due-time order, with `now_ms()` set to each timer's due time.
    pub fn advance(&self, ms: u64) {
        let target = lock(&self.inner).now_ms + ms;
        loop {
            let (handle, mut callback) = {
                let mut inner = lock(&self.inner);
                let Some((handle, due)) = inner.next_due(target) else {
                    inner.now_ms = target;
                    return;
                };
                inner.now_ms = due;
                let one_shot = inner.entries.get(&handle).is_some_and(|e| e.period_ms.is_none());
                let callback = if one_shot {
                    inner.entries.remove(&handle).and_then(|e| e.callback)
                } else {
                    inner.entries.get_mut(&handle).and_then(|e| e.callback.take())
                };
                match callback {
                    Some(cb) => (handle, cb),
                    None => continue,
                }
            };

            callback();

            let mut inner = lock(&self.inner);
            if let Some(entry) = inner.entries.get_mut(&handle) {
                if let Some(period) = entry.period_ms {
                    entry.due_ms += u64::from(period.max(1));
                    entry.callback = Some(callback);
                }
            }
        }
    }

    /// Timers currently armed.
    pub fn armed(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Most timers ever armed at the same time.
    pub fn peak_armed(&self) -> usize {
        lock(&self.inner).peak
    }

    /// Make every following arm fail with `TimerUnavailable`.
    pub fn fail_arms(&self, fail: bool) {
        lock(&self.inner).fail_arms = fail;
    }
}

impl Timer for SimClock {
    fn one_shot(&self, delay_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        lock(&self.inner).insert(delay_ms, None, callback)
    }

    fn interval(&self, period_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        lock(&self.inner).insert(period_ms, Some(period_ms), callback)
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.inner).entries.remove(&handle.0);
    }
}

// ───────────────────────────────────────────────────────────────
// Pins
// ───────────────────────────────────────────────────────────────

type SharedCallback = Arc<Mutex<EdgeCallback>>;

#[derive(Default)]
struct PinsInner {
    modes: HashMap<PinId, PinMode>,
    levels: HashMap<PinId, f32>,
    failing: HashMap<PinId, i32>,
    rise: HashMap<PinId, SharedCallback>,
    fall: HashMap<PinId, SharedCallback>,
}

/// Scriptable pin levels.  A level of `0.5` or more counts as HIGH for edge
/// detection.
#[derive(Default)]
pub struct SimPins {
    inner: Mutex<PinsInner>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level of `pin`, firing rise/fall callbacks on a digital
    /// transition.
    pub fn set_level(&self, pin: PinId, level: f32) {
        let callback = {
            let mut inner = lock(&self.inner);
            let old = inner.levels.insert(pin, level).unwrap_or(0.0);
            match (old >= 0.5, level >= 0.5) {
                (false, true) => inner.rise.get(&pin).cloned(),
                (true, false) => inner.fall.get(&pin).cloned(),
                _ => None,
            }
        };
        if let Some(cb) = callback {
            (lock(&cb))();
        }
    }

    pub fn level(&self, pin: PinId) -> f32 {
        lock(&self.inner).levels.get(&pin).copied().unwrap_or(0.0)
    }

    pub fn mode(&self, pin: PinId) -> Option<PinMode> {
        lock(&self.inner).modes.get(&pin).copied()
    }

    /// Make reads of `pin` fail with driver code `rc`; `None` heals it.
    pub fn fail_reads(&self, pin: PinId, rc: Option<i32>) {
        let mut inner = lock(&self.inner);
        match rc {
            Some(rc) => inner.failing.insert(pin, rc),
            None => inner.failing.remove(&pin),
        };
    }
}

impl PinDriver for SimPins {
    fn configure(&self, pin: PinId, mode: PinMode) -> Result<(), HwError> {
        lock(&self.inner).modes.insert(pin, mode);
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<f32, HwError> {
        let inner = lock(&self.inner);
        if !inner.modes.contains_key(&pin) {
            return Err(HwError::UnknownPin(pin));
        }
        if let Some(&rc) = inner.failing.get(&pin) {
            return Err(HwError::PinReadFailed(rc));
        }
        Ok(inner.levels.get(&pin).copied().unwrap_or(0.0))
    }
}

impl EdgeNotifier for SimPins {
    fn on_rise(&self, pin: PinId, callback: EdgeCallback) {
        lock(&self.inner).rise.insert(pin, Arc::new(Mutex::new(callback)));
    }

    fn on_fall(&self, pin: PinId, callback: EdgeCallback) {
        lock(&self.inner).fall.insert(pin, Arc::new(Mutex::new(callback)));
    }
}

// ───────────────────────────────────────────────────────────────
// Loop executor
// ───────────────────────────────────────────────────────────────

/// Delay that only records how long it was asked to wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

#[derive(Default)]
struct ExecInner {
    bodies: Vec<(&'static str, LoopBody)>,
    delay: RecordingDelay,
}

/// Runs spawned loop bodies only when stepped.
#[derive(Default)]
pub struct ManualExecutor {
    inner: Mutex<ExecInner>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one iteration of every live body.  Bodies that break are
    /// dropped.  Returns how many continued.
    pub fn step_all(&self) -> usize {
        let (mut bodies, mut delay) = {
            let mut inner = lock(&self.inner);
            (core::mem::take(&mut inner.bodies), inner.delay)
        };
        bodies.retain_mut(|(_, body)| body(&mut delay) == ControlFlow::Continue(()));
        let continued = bodies.len();

        let mut inner = lock(&self.inner);
        inner.delay = delay;
        let spawned_meanwhile = core::mem::take(&mut inner.bodies);
        inner.bodies = bodies;
        inner.bodies.extend(spawned_meanwhile);
        continued
    }

    /// Loop bodies not yet finished.
    pub fn live(&self) -> usize {
        lock(&self.inner).bodies.len()
    }

    /// Total time the bodies asked to sleep, in microseconds.
    pub fn slept_us(&self) -> u64 {
        lock(&self.inner).delay.total_ns / 1_000
    }
}

impl ConcurrentExecution for ManualExecutor {
    fn spawn(&self, name: &'static str, body: LoopBody) -> Result<(), HwError> {
        lock(&self.inner).bodies.push((name, body));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Bundle
// ───────────────────────────────────────────────────────────────

/// All simulation adapters, with typed handles kept for scripting.
#[derive(Clone)]
pub struct SimPlatform {
    pub clock: Arc<SimClock>,
    pub pins: Arc<SimPins>,
    pub executor: Arc<ManualExecutor>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SimClock::new()),
            pins: Arc::new(SimPins::new()),
            executor: Arc::new(ManualExecutor::new()),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform::new(
            self.pins.clone(),
            self.pins.clone(),
            self.clock.clone(),
            self.executor.clone(),
        )
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}
