//! Core-pinned loop execution for ESP32-S3 dual-core.
//!
//! [`PinnedExecutor`] implements [`ConcurrentExecution`]: each spawned
//! [`LoopBody`] gets its own thread, pinned to a CPU core with explicit
//! priority and stack size, and is called until it breaks.
//!
//! # ESP-IDF threading model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use core::ops::ControlFlow;
use std::thread::JoinHandle;

use embedded_hal::delay::DelayNs;

use crate::error::HwError;
use crate::ports::{ConcurrentExecution, LoopBody};

/// CPU core identifiers for the ESP32-S3 Xtensa LX7 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, BLE, lwIP).
    Pro = 0,
    /// Core 1 (APP_CPU): sampling loops.
    App = 1,
}

/// Spawn a thread pinned to `core` with explicit priority and stack.
///
/// `name` must be null-terminated (e.g. `"sensor-us\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, HwError> {
    // SAFETY: the config is copied by esp_pthread_set_cfg; `name` is
    // 'static and null-terminated.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = priority as i32;
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        log::error!("task_pin: esp_pthread_set_cfg failed (rc={})", ret);
        return Err(HwError::SpawnFailed);
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
        .map_err(|_| HwError::SpawnFailed)
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, HwError> {
    let display_name = name.trim_end_matches('\0');
    log::info!("Spawning '{}' (sim, no core pinning, stack={}KB)", display_name, stack_kb);

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size((stack_kb * 1024).max(SIM_MIN_STACK))
        .spawn(f)
        .map_err(|_| HwError::SpawnFailed)
}

/// Host threads need more headroom than the RTOS task budget.
#[cfg(not(target_os = "espidf"))]
const SIM_MIN_STACK: usize = 64 * 1024;

// ── Delay providers ───────────────────────────────────────────

/// Busy-wait microsecond delay (ROM `ets_delay_us`).
#[cfg(target_os = "espidf")]
type LoopDelay = esp_idf_hal::delay::Ets;

#[cfg(not(target_os = "espidf"))]
type LoopDelay = StdDelay;

/// `thread::sleep` based delay for host runs.
#[cfg(not(target_os = "espidf"))]
pub struct StdDelay;

#[cfg(not(target_os = "espidf"))]
impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(target_os = "espidf")]
fn loop_delay() -> LoopDelay {
    esp_idf_hal::delay::Ets
}

#[cfg(not(target_os = "espidf"))]
fn loop_delay() -> LoopDelay {
    StdDelay
}

// ── Executor ──────────────────────────────────────────────────

/// Runs every loop body on its own core-pinned thread.
#[derive(Debug, Clone, Copy)]
pub struct PinnedExecutor {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl Default for PinnedExecutor {
    fn default() -> Self {
        Self {
            core: Core::App,
            priority: 5,
            stack_kb: 4,
        }
    }
}

impl ConcurrentExecution for PinnedExecutor {
    fn spawn(&self, name: &'static str, mut body: LoopBody) -> Result<(), HwError> {
        #[cfg(target_os = "espidf")]
        let name = match name {
            "sensor-us" => "sensor-us\0",
            _ => "sensor-loop\0",
        };
        spawn_on_core(self.core, self.priority, self.stack_kb, name, move || {
            let mut delay = loop_delay();
            while let ControlFlow::Continue(()) = body(&mut delay) {}
            log::debug!("task_pin: loop '{}' finished", name.trim_end_matches('\0'));
        })
        .map(|_| ())
    }
}
