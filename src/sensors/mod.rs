//! Sensors: acquisition pipeline, hooks and self-sampling lifecycle.
//!
//! ```text
//!  Source ──read──▶ normalize? ──▶ StatisticsWindow ──▶ every-sample actions
//!  (pin | derived)   (Normalized)   (unless skipped)      then checks (in order)
//! ```
//!
//! A [`Sensor`] is a cheap, cloneable handle.  Acquisition can be driven
//! manually ([`Sensor::acquire`], [`Sensor::get_raw`]), by the sensor's own
//! sampling ([`Sensor::start_sampling`]) or by a
//! [`SensorPool`](crate::pool::SensorPool).  Own sampling and pool control
//! are mutually exclusive, as are the millisecond and microsecond
//! strategies.
//!
//! ## Locking
//!
//! Each sensor has two locks: `hooks` (actions, checks, normalization) and
//! `core` (source, window, samples, sampling state).  `core` is a leaf lock
//! and is never held while user code runs.  Hooks run with `hooks` held and
//! receive a [`SensorState`] snapshot; they may read the sensor but must not
//! register or reset hooks on the sensor that is calling them.

pub mod analog;
pub mod digital;
pub mod sampling;
pub mod source;

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::config::{validate_window, AcquisitionKind, SamplingPeriod, SamplingUnit, SensorFlags};
use crate::error::{AcquireError, ConfigError, Error};
use crate::ports::Platform;
use crate::window::{Aggregates, StatisticsWindow};

pub use digital::DigitalSensor;
pub use source::{Field, Source};

use sampling::ActiveSampling;

static NEXT_SENSOR_ID: AtomicU32 = AtomicU32::new(0);

// ───────────────────────────────────────────────────────────────
// State view
// ───────────────────────────────────────────────────────────────

/// Snapshot of a sensor handed to actions, checks and normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorState {
    flags: SensorFlags,
    current: Option<f32>,
    previous: Option<f32>,
    aggregates: Aggregates,
    period: Option<SamplingPeriod>,
    window: Option<usize>,
}

impl SensorState {
    /// Last acquired sample.  During normalization this is still the
    /// sample before the one being normalized.
    pub fn current_sample(&self) -> Option<f32> {
        self.current
    }

    pub fn previous_sample(&self) -> Option<f32> {
        self.previous
    }

    pub fn average(&self) -> Option<f32> {
        self.aggregates.average
    }

    pub fn min(&self) -> Option<f32> {
        self.aggregates.min
    }

    pub fn max(&self) -> Option<f32> {
        self.aggregates.max
    }

    pub fn trend(&self) -> Option<f32> {
        self.aggregates.trend
    }

    pub fn derivative(&self) -> Option<f32> {
        self.aggregates.derivative
    }

    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    pub fn flags(&self) -> SensorFlags {
        self.flags
    }

    pub fn sampling_period(&self) -> Option<SamplingPeriod> {
        self.period
    }

    /// Observation window length, if window evaluation is configured.
    pub fn observation_window(&self) -> Option<usize> {
        self.window
    }
}

// ───────────────────────────────────────────────────────────────
// Hooks
// ───────────────────────────────────────────────────────────────

pub type SampleAction = Box<dyn FnMut(&SensorState) + Send + 'static>;
pub type Condition = Box<dyn FnMut(&SensorState) -> bool + Send + 'static>;
pub type NormFn = Box<dyn FnMut(f32, &SensorState) -> f32 + Send + 'static>;

struct Check {
    condition: Condition,
    action: SampleAction,
}

#[derive(Default)]
struct Hooks {
    every_sample: Vec<SampleAction>,
    checks: Vec<Check>,
    norm: Option<NormFn>,
}

// ───────────────────────────────────────────────────────────────
// Core state
// ───────────────────────────────────────────────────────────────

pub(crate) struct SensorCore {
    pub(crate) source: Source,
    flags: SensorFlags,
    window: Option<StatisticsWindow>,
    period: Option<SamplingPeriod>,
    current: Option<f32>,
    previous: Option<f32>,
    pub(crate) sampling: Option<ActiveSampling>,
    /// Bumped on every start/stop so late callbacks recognise themselves.
    pub(crate) epoch: u32,
    pool_managed: bool,
}

impl SensorCore {
    fn state(&self) -> SensorState {
        SensorState {
            flags: self.flags,
            current: self.current,
            previous: self.previous,
            aggregates: self.window.as_ref().map(StatisticsWindow::aggregates).unwrap_or_default(),
            period: self.period,
            window: self.window.as_ref().map(StatisticsWindow::capacity),
        }
    }

    fn record(&mut self, value: f32) {
        if !self.flags.skip_eval {
            if let Some(window) = self.window.as_mut() {
                window.push(value);
            }
        }
        self.previous = self.current;
        self.current = Some(value);
    }

    /// Apply the evaluation part of a sampling configuration.  No window
    /// means evaluation is skipped entirely.
    fn configure(&mut self, period: SamplingPeriod, window: Option<usize>) -> Result<(), ConfigError> {
        self.window = match window {
            Some(len) => {
                let mut w = StatisticsWindow::new(len, self.flags)?;
                w.set_period(Some(period));
                Some(w)
            }
            None => None,
        };
        self.flags.skip_eval = window.is_none();
        self.period = Some(period);
        self.current = None;
        self.previous = None;
        Ok(())
    }

    /// Back to "no data": samples, aggregates and period are cleared.
    fn reset(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.reset();
            window.set_period(None);
        }
        self.period = None;
        self.current = None;
        self.previous = None;
    }
}

pub(crate) struct SensorShared {
    pub(crate) id: u32,
    pub(crate) platform: Platform,
    core: Mutex<SensorCore>,
    hooks: Mutex<Hooks>,
}

impl SensorShared {
    pub(crate) fn lock_core(&self) -> MutexGuard<'_, SensorCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SensorShared {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(sampling) = core.sampling.take() {
            sampling.halt(&self.platform);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor handle
// ───────────────────────────────────────────────────────────────

/// Shared handle to one sensor.  Clones refer to the same sensor.
#[derive(Clone)]
pub struct Sensor {
    pub(crate) shared: Arc<SensorShared>,
}

impl core::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sensor")
            .field("id", &self.shared.id)
            .field("source", &self.shared.lock_core().source)
            .finish_non_exhaustive()
    }
}

impl Sensor {
    pub(crate) fn with_source(source: Source, flags: SensorFlags, platform: &Platform) -> Self {
        let core = SensorCore {
            source,
            flags,
            window: None,
            period: None,
            current: None,
            previous: None,
            sampling: None,
            epoch: 0,
            pool_managed: false,
        };
        Self {
            shared: Arc::new(SensorShared {
                id: NEXT_SENSOR_ID.fetch_add(1, Ordering::Relaxed),
                platform: platform.clone(),
                core: Mutex::new(core),
                hooks: Mutex::new(Hooks::default()),
            }),
        }
    }

    /// Process-unique id, used in log lines.
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Whether two handles refer to the same sensor.
    pub fn same_as(&self, other: &Sensor) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ── Acquisition ──────────────────────────────────────────

    /// Read, optionally normalize, evaluate, then run actions and checks.
    ///
    /// `Ok(None)` means the source had no value (a derived source before its
    /// field exists); nothing else happens in that case.
    pub fn acquire(&self, kind: AcquisitionKind) -> Result<Option<f32>, AcquireError> {
        let source = self.shared.lock_core().source.clone();
        let Some(raw) = source.read(self.shared.platform.pins.as_ref())? else {
            debug!("sensor#{}: source has no value yet", self.shared.id);
            return Ok(None);
        };

        let mut hooks = self.shared.lock_hooks();
        let value = match kind {
            AcquisitionKind::Raw => raw,
            AcquisitionKind::Normalized => {
                let norm = hooks.norm.as_mut().ok_or(AcquireError::Skipped)?;
                norm(raw, &self.state())
            }
        };

        let state = {
            let mut core = self.shared.lock_core();
            core.record(value);
            core.state()
        };

        let Hooks {
            every_sample,
            checks,
            ..
        } = &mut *hooks;
        for action in every_sample.iter_mut() {
            action(&state);
        }
        for check in checks.iter_mut() {
            if (check.condition)(&state) {
                (check.action)(&state);
            }
        }
        Ok(Some(value))
    }

    pub fn get_raw(&self) -> Result<Option<f32>, AcquireError> {
        self.acquire(AcquisitionKind::Raw)
    }

    pub fn get_normalized(&self) -> Result<Option<f32>, AcquireError> {
        self.acquire(AcquisitionKind::Normalized)
    }

    // ── Hooks (fluent) ───────────────────────────────────────

    /// Run `action` after every acquisition, in registration order.
    pub fn do_every_sample(&self, action: impl FnMut(&SensorState) + Send + 'static) -> &Self {
        self.shared.lock_hooks().every_sample.push(Box::new(action));
        self
    }

    /// Run `action` after every acquisition for which `condition` holds.
    pub fn add_check(
        &self,
        condition: impl FnMut(&SensorState) -> bool + Send + 'static,
        action: impl FnMut(&SensorState) + Send + 'static,
    ) -> &Self {
        self.shared.lock_hooks().checks.push(Check {
            condition: Box::new(condition),
            action: Box::new(action),
        });
        self
    }

    /// Set the function applied to raw values by normalized acquisitions.
    pub fn set_norm_func(&self, norm: impl FnMut(f32, &SensorState) -> f32 + Send + 'static) -> &Self {
        self.shared.lock_hooks().norm = Some(Box::new(norm));
        self
    }

    pub fn reset_sample_actions(&self) -> &Self {
        self.shared.lock_hooks().every_sample.clear();
        self
    }

    pub fn reset_check(&self) -> &Self {
        self.shared.lock_hooks().checks.clear();
        self
    }

    // ── Configuration ────────────────────────────────────────

    pub fn flags(&self) -> SensorFlags {
        self.shared.lock_core().flags
    }

    pub fn set_flags(&self, flags: SensorFlags) -> &Self {
        let mut core = self.shared.lock_core();
        core.flags = flags;
        if let Some(window) = core.window.as_mut() {
            window.set_flags(flags);
        }
        self
    }

    /// Enable window evaluation for manual acquisition.  Replaces any
    /// existing window, dropping its samples.
    pub fn set_observation_window(&self, len: usize) -> Result<&Self, ConfigError> {
        let mut core = self.shared.lock_core();
        let mut window = StatisticsWindow::new(len, core.flags)?;
        window.set_period(core.period);
        core.window = Some(window);
        core.flags.skip_eval = false;
        Ok(self)
    }

    /// Set the period used for derivative and trend during manual
    /// acquisition.  Own sampling sets it automatically.
    pub fn set_sampling_period(&self, period: Option<SamplingPeriod>) -> &Self {
        let mut core = self.shared.lock_core();
        core.period = period;
        if let Some(window) = core.window.as_mut() {
            window.set_period(period);
        }
        self
    }

    /// Point the sensor at a different source, refusing derivation cycles.
    pub fn rebind_source(&self, source: Source) -> Result<&Self, ConfigError> {
        let _rebind = source::rebind_lock();
        source.check_acyclic(&self.shared)?;
        self.shared.lock_core().source = source;
        Ok(self)
    }

    pub fn source(&self) -> Source {
        self.shared.lock_core().source.clone()
    }

    // ── Sampling lifecycle ───────────────────────────────────

    /// Sample every `period`.  With `window` the aggregates are evaluated
    /// over that many samples; without it evaluation is skipped.
    pub fn start_sampling(
        &self,
        period: SamplingPeriod,
        window: Option<usize>,
        kind: AcquisitionKind,
    ) -> Result<&Self, Error> {
        period.validate()?;
        if let Some(len) = window {
            validate_window(len)?;
        }

        let mut core = self.shared.lock_core();
        if core.pool_managed {
            return Err(ConfigError::PoolManaged.into());
        }
        if core.sampling.is_some() {
            return Err(ConfigError::SamplingConflict.into());
        }
        core.configure(period, window)?;
        core.epoch = core.epoch.wrapping_add(1);

        let active = match period.unit {
            SamplingUnit::Millis => sampling::start_timer(&self.shared, period.value, core.epoch, kind),
            SamplingUnit::Micros => sampling::start_micro_loop(&self.shared, period.value, core.epoch, kind),
        };
        match active {
            Ok(active) => core.sampling = Some(active),
            Err(e) => {
                core.reset();
                return Err(e.into());
            }
        }

        info!(
            "sensor#{}: sampling every {} {:?} (window={:?}, {:?})",
            self.shared.id, period.value, period.unit, window, kind
        );
        Ok(self)
    }

    /// Stop own sampling (if any) and clear samples and aggregates.
    pub fn stop_sampling(&self) -> &Self {
        let mut core = self.shared.lock_core();
        core.epoch = core.epoch.wrapping_add(1);
        if let Some(active) = core.sampling.take() {
            active.halt(&self.shared.platform);
            info!("sensor#{}: sampling stopped", self.shared.id);
        }
        core.reset();
        self
    }

    /// Whether the sensor runs its own timer or loop.
    pub fn is_sampling(&self) -> bool {
        self.shared.lock_core().sampling.is_some()
    }

    pub fn is_pool_managed(&self) -> bool {
        self.shared.lock_core().pool_managed
    }

    /// Block the calling context for `ms` milliseconds.  Sampling already
    /// running elsewhere is unaffected.
    pub fn wait(&self, delay: &mut impl DelayNs, ms: u32) -> &Self {
        delay.delay_ms(ms);
        self
    }

    // ── Pool control ─────────────────────────────────────────

    pub(crate) fn attach_to_pool(&self, period_ms: u32, window: Option<usize>) -> Result<(), ConfigError> {
        let mut core = self.shared.lock_core();
        if core.sampling.is_some() {
            return Err(ConfigError::SamplingConflict);
        }
        if core.pool_managed {
            return Err(ConfigError::PoolManaged);
        }
        core.configure(SamplingPeriod::millis(period_ms), window)?;
        core.pool_managed = true;
        Ok(())
    }

    pub(crate) fn detach_from_pool(&self) {
        let mut core = self.shared.lock_core();
        core.pool_managed = false;
        core.reset();
    }

    // ── Readouts ─────────────────────────────────────────────

    pub fn state(&self) -> SensorState {
        self.shared.lock_core().state()
    }

    pub fn current_sample(&self) -> Option<f32> {
        self.state().current_sample()
    }

    pub fn previous_sample(&self) -> Option<f32> {
        self.state().previous_sample()
    }

    pub fn average(&self) -> Option<f32> {
        self.state().average()
    }

    pub fn min(&self) -> Option<f32> {
        self.state().min()
    }

    pub fn max(&self) -> Option<f32> {
        self.state().max()
    }

    pub fn trend(&self) -> Option<f32> {
        self.state().trend()
    }

    pub fn derivative(&self) -> Option<f32> {
        self.state().derivative()
    }

    pub fn aggregates(&self) -> Aggregates {
        self.state().aggregates()
    }
}
