//! The two self-sampling strategies.
//!
//! - **Millis**: a periodic [`Timer`](crate::ports::Timer) interval whose
//!   callback acquires once per tick.
//! - **Micros**: a dedicated loop spawned through
//!   [`ConcurrentExecution`](crate::ports::ConcurrentExecution) that
//!   acquires, then sleeps the period in microseconds, until told to stop.
//!
//! Both capture the sensor weakly and carry the sampling epoch they were
//! started in.  A tick whose epoch no longer matches (sampling stopped or
//! restarted since) is a late callback and does nothing.

use core::ops::ControlFlow;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::config::AcquisitionKind;
use crate::error::HwError;
use crate::ports::{Platform, TimerHandle};

use super::{Sensor, SensorShared};

/// Sampling a sensor is currently running on its own.
#[derive(Debug)]
pub(crate) enum ActiveSampling {
    Timer { handle: TimerHandle },
    MicroLoop { running: Arc<AtomicBool> },
}

impl ActiveSampling {
    /// Cancel the timer or ask the loop to exit after its current iteration.
    pub(crate) fn halt(self, platform: &Platform) {
        match self {
            Self::Timer { handle } => platform.timer.cancel(handle),
            Self::MicroLoop { running } => running.store(false, Ordering::Release),
        }
    }
}

pub(crate) fn start_timer(
    shared: &Arc<SensorShared>,
    period_ms: u32,
    epoch: u32,
    kind: AcquisitionKind,
) -> Result<ActiveSampling, HwError> {
    let weak = Arc::downgrade(shared);
    let handle = shared.platform.timer.interval(
        period_ms,
        Box::new(move || {
            tick(&weak, epoch, kind);
        }),
    )?;
    Ok(ActiveSampling::Timer { handle })
}

pub(crate) fn start_micro_loop(
    shared: &Arc<SensorShared>,
    period_us: u32,
    epoch: u32,
    kind: AcquisitionKind,
) -> Result<ActiveSampling, HwError> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let weak = Arc::downgrade(shared);

    shared.platform.executor.spawn(
        "sensor-us",
        Box::new(move |delay: &mut dyn DelayNs| {
            if !flag.load(Ordering::Acquire) || !tick(&weak, epoch, kind) {
                return ControlFlow::Break(());
            }
            delay.delay_us(period_us);
            ControlFlow::Continue(())
        }),
    )?;
    Ok(ActiveSampling::MicroLoop { running })
}

/// One sampling tick.  Returns `false` once the sampling it belongs to is
/// gone (sensor dropped, stopped or restarted).
fn tick(weak: &Weak<SensorShared>, epoch: u32, kind: AcquisitionKind) -> bool {
    let Some(shared) = weak.upgrade() else {
        return false;
    };
    {
        let core = shared.lock_core();
        if core.epoch != epoch || core.sampling.is_none() {
            debug!("sensor#{}: late sampling tick ignored", shared.id);
            return false;
        }
    }
    let sensor = Sensor { shared };
    if let Err(e) = sensor.acquire(kind) {
        warn!("sensor#{}: acquisition failed: {}", sensor.shared.id, e);
    }
    true
}
