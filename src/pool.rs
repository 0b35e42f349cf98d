//! Sensor pool: many sampling periods on one timer.
//!
//! The pool never holds more than one outstanding one-shot timer, however
//! many sensors it drives.  Each member has a period and a remaining time
//! until its next acquisition; every tick acquires the members that are due,
//! then waits for the nearest next due time.
//!
//! ```text
//!   periods = [1000, 700]
//!
//!   t:      0     700   1000  1400  2000  2100
//!   s0:     ·      ·     ●     ·     ●     ·
//!   s1:     ·      ●     ·     ●     ·     ●
//!   wait:   700   300    400   600   100   ...
//! ```
//!
//! Planning step (`m` = smallest remaining time):
//!
//! 1. members with `remaining == m` become due and restart at `period`,
//! 2. every other member has `m` subtracted,
//! 3. the next tick is armed `m` ms from now, unless the pool was stopped.
//!
//! Members keep exactly their own period relative to the shared clock, and
//! ties fire in the same tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, error, info, warn};

use crate::config::{validate_window, AcquisitionKind, PoolPlan, SamplingPeriod, MAX_POOL_SENSORS};
use crate::error::{ConfigError, Error};
use crate::ports::{Platform, Timer, TimerHandle};
use crate::sensors::Sensor;

// ═══════════════════════════════════════════════════════════════
//  Slots
// ═══════════════════════════════════════════════════════════════

/// Whether a member's samples go through its statistics window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Windowed(usize),
    /// No observation window: samples are kept, no aggregates.
    Skipped,
}

/// Multiplexing state of one pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub period_ms: u32,
    /// Time until this member is next due, in `(0, period_ms]`.
    pub remaining_ms: u32,
    pub kind: AcquisitionKind,
    pub evaluation: Evaluation,
}

impl Slot {
    pub fn new(period_ms: u32, window: Option<usize>, kind: AcquisitionKind) -> Self {
        Self {
            period_ms,
            remaining_ms: period_ms,
            kind,
            evaluation: window.map_or(Evaluation::Skipped, Evaluation::Windowed),
        }
    }
}

pub type DueList = heapless::Vec<usize, MAX_POOL_SENSORS>;

/// One planning step: fill `due` with the members that fire after the
/// returned delay and advance every remaining time by that delay.
///
/// `slots` must not be empty and every period must be non-zero.
pub fn plan_next(slots: &mut [Slot], due: &mut DueList) -> u32 {
    let m = slots.iter().map(|s| s.remaining_ms).min().unwrap_or(0);
    due.clear();
    for (i, slot) in slots.iter_mut().enumerate() {
        if slot.remaining_ms == m {
            let _ = due.push(i);
            slot.remaining_ms = slot.period_ms;
        } else {
            slot.remaining_ms -= m;
        }
    }
    m
}

// ═══════════════════════════════════════════════════════════════
//  Pool
// ═══════════════════════════════════════════════════════════════

struct PoolRun {
    slots: heapless::Vec<Slot, MAX_POOL_SENSORS>,
    due: DueList,
    handle: Option<TimerHandle>,
    /// Consulted at the top of every tick; cancellation alone may race a
    /// tick that is already queued.
    stopped: bool,
    epoch: u32,
}

struct PoolShared {
    sensors: heapless::Vec<Sensor, MAX_POOL_SENSORS>,
    timer: Arc<dyn Timer>,
    run: Mutex<PoolRun>,
}

impl PoolShared {
    fn lock_run(&self) -> MutexGuard<'_, PoolRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Group of sensors sampled on one shared timer.
///
/// The pool refers to its sensors but does not own them: the caller keeps
/// its handles and they stay usable.  Dropping the pool stops it.
pub struct SensorPool {
    shared: Arc<PoolShared>,
}

impl SensorPool {
    pub fn new(sensors: &[&Sensor], platform: &Platform) -> Result<Self, ConfigError> {
        if sensors.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        let mut members = heapless::Vec::new();
        for sensor in sensors {
            members.push((*sensor).clone()).map_err(|_| ConfigError::PoolFull)?;
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                sensors: members,
                timer: Arc::clone(&platform.timer),
                run: Mutex::new(PoolRun {
                    slots: heapless::Vec::new(),
                    due: DueList::new(),
                    handle: None,
                    stopped: true,
                    epoch: 0,
                }),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.shared.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.sensors.is_empty()
    }

    pub fn sensor(&self, i: usize) -> Option<&Sensor> {
        self.shared.sensors.get(i)
    }

    /// Start sampling member `i` every `periods[i]` ms with observation
    /// window `windows[i]` and acquisition `kinds[i]`.
    pub fn start_sampling(
        &self,
        periods: &[u32],
        windows: &[Option<usize>],
        kinds: &[AcquisitionKind],
    ) -> Result<(), Error> {
        let n = self.shared.sensors.len();
        if periods.len() != n || windows.len() != n || kinds.len() != n {
            return Err(ConfigError::MismatchedPoolArrays.into());
        }
        for (&period, window) in periods.iter().zip(windows) {
            SamplingPeriod::millis(period).validate()?;
            if let Some(len) = *window {
                validate_window(len)?;
            }
        }

        let mut run = self.shared.lock_run();
        if !run.stopped {
            return Err(ConfigError::SamplingConflict.into());
        }

        for (i, sensor) in self.shared.sensors.iter().enumerate() {
            if let Err(e) = sensor.attach_to_pool(periods[i], windows[i]) {
                self.shared.sensors[..i].iter().for_each(Sensor::detach_from_pool);
                return Err(e.into());
            }
        }

        run.slots.clear();
        for i in 0..n {
            let _ = run.slots.push(Slot::new(periods[i], windows[i], kinds[i]));
        }
        run.stopped = false;
        run.epoch = run.epoch.wrapping_add(1);

        if let Err(e) = schedule(&self.shared, &mut run) {
            run.stopped = true;
            drop(run);
            self.shared.sensors.iter().for_each(Sensor::detach_from_pool);
            return Err(e);
        }

        info!("pool: sampling {} sensor(s), periods {:?} ms", n, periods);
        Ok(())
    }

    /// Start from a parsed [`PoolPlan`], one entry per member.
    pub fn start_with_plan(&self, plan: &PoolPlan) -> Result<(), Error> {
        plan.validate()?;
        self.start_sampling(&plan.periods(), &plan.windows(), &plan.kinds())
    }

    /// Stop the shared timer and release every member.  A tick already in
    /// flight finishes harmlessly and does not reschedule.
    pub fn stop_sampling(&self) {
        let mut run = self.shared.lock_run();
        if run.stopped {
            return;
        }
        run.stopped = true;
        run.epoch = run.epoch.wrapping_add(1);
        if let Some(handle) = run.handle.take() {
            self.shared.timer.cancel(handle);
        }
        drop(run);

        self.shared.sensors.iter().for_each(Sensor::detach_from_pool);
        info!("pool: sampling stopped");
    }

    pub fn is_sampling(&self) -> bool {
        !self.shared.lock_run().stopped
    }

    /// Multiplexing state of member `i` while sampling.
    pub fn slot(&self, i: usize) -> Option<Slot> {
        self.shared.lock_run().slots.get(i).copied()
    }
}

impl Drop for SensorPool {
    fn drop(&mut self) {
        self.stop_sampling();
    }
}

/// Plan the next tick and arm the shared timer for it.
fn schedule(shared: &Arc<PoolShared>, run: &mut PoolRun) -> Result<(), Error> {
    let delay = plan_next(&mut run.slots, &mut run.due);
    let weak = Arc::downgrade(shared);
    let epoch = run.epoch;
    let handle = shared.timer.one_shot(delay, Box::new(move || tick(&weak, epoch)))?;
    run.handle = Some(handle);
    Ok(())
}

fn tick(weak: &Weak<PoolShared>, epoch: u32) {
    let Some(shared) = weak.upgrade() else {
        return;
    };

    let due: heapless::Vec<(usize, AcquisitionKind), MAX_POOL_SENSORS> = {
        let run = shared.lock_run();
        if run.stopped || run.epoch != epoch {
            debug!("pool: late tick ignored");
            return;
        }
        run.due.iter().map(|&i| (i, run.slots[i].kind)).collect()
    };

    for (i, kind) in due {
        if let Err(e) = shared.sensors[i].acquire(kind) {
            warn!("pool: sensor#{} acquisition failed: {}", shared.sensors[i].id(), e);
        }
    }

    let mut run = shared.lock_run();
    if run.stopped || run.epoch != epoch {
        return;
    }
    run.handle = None;
    if let Err(e) = schedule(&shared, &mut run) {
        error!("pool: cannot arm next tick ({}); sampling halted", e);
        run.stopped = true;
        run.epoch = run.epoch.wrapping_add(1);
        drop(run);
        shared.sensors.iter().for_each(Sensor::detach_from_pool);
    }
}
