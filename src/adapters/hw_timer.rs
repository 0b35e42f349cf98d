//! Millisecond timers for sampling and debounce.
//!
//! On ESP-IDF, [`EspTimerAdapter`] arms `esp_timer` instances through the
//! task-dispatched timer service: callbacks run on the `esp_timer` task,
//! never in ISR context, so they may lock and log.
//!
//! Deleting an `EspTimer` waits for its callback to return, and callers
//! cancel while holding the locks those callbacks take.  Cancelled and
//! expired timers are therefore only stopped in place and deleted later by
//! [`EspTimerAdapter::collect`], which the owner calls with no locks held.
//!
//! On simulation targets, [`ThreadTimer`] approximates the same contract
//! with one sleeping thread per armed timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::HwError;
use crate::ports::{Timer, TimerCallback, TimerHandle};

#[cfg(target_os = "espidf")]
use core::time::Duration;
#[cfg(target_os = "espidf")]
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
struct Armed {
    timer: EspTimer<'static>,
    /// Set once a one-shot has fired; periodic timers never set it.
    done: Arc<AtomicBool>,
}

/// `esp_timer` backed [`Timer`].
#[cfg(target_os = "espidf")]
pub struct EspTimerAdapter {
    service: EspTaskTimerService,
    next: AtomicU32,
    armed: Mutex<HashMap<u32, Armed>>,
    retired: Mutex<Vec<Armed>>,
}

#[cfg(target_os = "espidf")]
impl EspTimerAdapter {
    pub fn new() -> Result<Self, HwError> {
        let service = EspTaskTimerService::new().map_err(|e| {
            log::error!("hw_timer: timer service unavailable ({})", e);
            HwError::TimerUnavailable
        })?;
        Ok(Self {
            service,
            next: AtomicU32::new(1),
            armed: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Delete cancelled and expired timers.  Call from task context with no
    /// sensor or sequence lock held.
    pub fn collect(&self) -> usize {
        let retired = core::mem::take(&mut *lock(&self.retired));
        let n = retired.len();
        drop(retired);
        n
    }

    fn arm(&self, periodic: bool, ms: u32, mut callback: TimerCallback) -> Result<TimerHandle, HwError> {
        let done = Arc::new(AtomicBool::new(false));
        let fired = Arc::clone(&done);
        let timer = self
            .service
            .timer(move || {
                if !periodic {
                    fired.store(true, Ordering::Release);
                }
                callback();
            })
            .map_err(|_| HwError::TimerUnavailable)?;

        let period = Duration::from_millis(u64::from(ms));
        let started = if periodic { timer.every(period) } else { timer.after(period) };
        started.map_err(|e| {
            log::error!("hw_timer: start failed ({})", e);
            HwError::TimerUnavailable
        })?;

        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let mut armed = lock(&self.armed);
        let expired: Vec<u32> = armed
            .iter()
            .filter(|(_, a)| a.done.load(Ordering::Acquire) && !a.timer.is_scheduled().unwrap_or(false))
            .map(|(id, _)| *id)
            .collect();
        if !expired.is_empty() {
            let mut retired = lock(&self.retired);
            retired.extend(expired.iter().filter_map(|id| armed.remove(id)));
        }
        armed.insert(id, Armed { timer, done });
        Ok(TimerHandle(id))
    }
}

#[cfg(target_os = "espidf")]
impl Timer for EspTimerAdapter {
    fn one_shot(&self, delay_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        self.arm(false, delay_ms, callback)
    }

    fn interval(&self, period_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        self.arm(true, period_ms, callback)
    }

    fn cancel(&self, handle: TimerHandle) {
        let removed = lock(&self.armed).remove(&handle.0);
        if let Some(a) = removed {
            let _ = a.timer.cancel();
            lock(&self.retired).push(a);
        }
    }
}

// ── Simulation ────────────────────────────────────────────────

/// Thread-per-timer fallback for host runs.
pub struct ThreadTimer {
    next: AtomicU32,
    cancelled: Arc<Mutex<HashMap<u32, Arc<AtomicBool>>>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            cancelled: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn arm(&self, periodic: bool, ms: u32, mut callback: TimerCallback) -> Result<TimerHandle, HwError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        lock(&self.cancelled).insert(id, Arc::clone(&stop));
        let registry = Arc::clone(&self.cancelled);
        let period = std::time::Duration::from_millis(u64::from(ms));

        std::thread::Builder::new()
            .name("sim-timer".into())
            .spawn(move || {
                loop {
                    std::thread::sleep(period);
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    callback();
                    if !periodic {
                        break;
                    }
                }
                lock(&registry).remove(&id);
            })
            .map_err(|_| HwError::TimerUnavailable)?;
        Ok(TimerHandle(id))
    }

    /// Timers still armed.
    pub fn armed(&self) -> usize {
        lock(&self.cancelled).len()
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ThreadTimer {
    fn one_shot(&self, delay_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        self.arm(false, delay_ms, callback)
    }

    fn interval(&self, period_ms: u32, callback: TimerCallback) -> Result<TimerHandle, HwError> {
        self.arm(true, period_ms, callback)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(stop) = lock(&self.cancelled).remove(&handle.0) {
            stop.store(true, Ordering::Release);
        }
    }
}
