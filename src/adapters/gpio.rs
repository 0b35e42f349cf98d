//! GPIO / ADC adapter and ISR-backed edge notifications.
//!
//! - [`EdgeDispatcher`] implements [`EdgeNotifier`]: callbacks are stored
//!   per pin and edge, and run from task context when
//!   [`EdgeDispatcher::dispatch_pending`] drains the [`EdgeQueue`].
//! - `EspPins` (ESP-IDF only) implements [`PinDriver`] with raw GPIO and
//!   ADC1 oneshot calls, and installs the per-pin ISRs that feed the queue.
//!
//! Only the queue push happens in interrupt context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::events::{EdgeEvent, EdgeQueue};
use crate::ports::{EdgeCallback, EdgeNotifier, PinId};

#[cfg(target_os = "espidf")]
use crate::error::HwError;
#[cfg(target_os = "espidf")]
use crate::ports::{PinDriver, PinMode};

type SharedCallback = Arc<Mutex<EdgeCallback>>;

#[derive(Default)]
struct Registry {
    rise: HashMap<PinId, SharedCallback>,
    fall: HashMap<PinId, SharedCallback>,
}

/// Edge callback registry drained from task context.
pub struct EdgeDispatcher {
    queue: &'static EdgeQueue,
    registry: Mutex<Registry>,
    /// Called once per pin the first time a callback is registered on it.
    arm_pin: Box<dyn Fn(PinId) + Send + Sync>,
}

impl EdgeDispatcher {
    /// Dispatcher over `queue`; `arm_pin` enables the pin's interrupt.
    pub fn new(queue: &'static EdgeQueue, arm_pin: impl Fn(PinId) + Send + Sync + 'static) -> Self {
        Self {
            queue,
            registry: Mutex::new(Registry::default()),
            arm_pin: Box::new(arm_pin),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the callbacks of every queued edge, in arrival order.  Returns
    /// the number of edges drained.
    pub fn dispatch_pending(&self) -> usize {
        let lost = self.queue.take_dropped();
        if lost > 0 {
            warn!("gpio: {} edge(s) lost, queue full", lost);
        }

        let mut drained = 0;
        while let Some(EdgeEvent { pin, rising }) = self.queue.pop() {
            drained += 1;
            let callback = {
                let reg = self.registry();
                let map = if rising { &reg.rise } else { &reg.fall };
                map.get(&pin).cloned()
            };
            match callback {
                Some(cb) => (cb.lock().unwrap_or_else(PoisonError::into_inner))(),
                None => debug!("gpio: {} edge on {} has no callback", if rising { "rise" } else { "fall" }, pin),
            }
        }
        drained
    }

    fn register(&self, pin: PinId, rising: bool, callback: EdgeCallback) {
        let first = {
            let mut reg = self.registry();
            let first = !reg.rise.contains_key(&pin) && !reg.fall.contains_key(&pin);
            let map = if rising { &mut reg.rise } else { &mut reg.fall };
            map.insert(pin, Arc::new(Mutex::new(callback)));
            first
        };
        if first {
            (self.arm_pin)(pin);
        }
    }
}

impl EdgeNotifier for EdgeDispatcher {
    fn on_rise(&self, pin: PinId, callback: EdgeCallback) {
        self.register(pin, true, callback);
    }

    fn on_fall(&self, pin: PinId, callback: EdgeCallback) {
        self.register(pin, false, callback);
    }
}

// ── ESP-IDF pins ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
use esp_idf_sys::*;

#[cfg(target_os = "espidf")]
unsafe extern "C" fn edge_isr(arg: *mut core::ffi::c_void) {
    let gpio = arg as usize as i32;
    // SAFETY: register read on a configured input; ISR safe.
    let rising = unsafe { gpio_get_level(gpio) } != 0;
    crate::events::EDGE_QUEUE.push(EdgeEvent {
        pin: PinId(gpio),
        rising,
    });
}

/// Install the GPIO ISR service and hook `pin` to the edge queue (any edge).
#[cfg(target_os = "espidf")]
pub fn arm_edge_isr(pin: PinId) {
    // SAFETY: gpio_install_isr_service is idempotent (ESP_ERR_INVALID_STATE
    // means already installed); the handler only pushes to the lock-free
    // queue and receives the GPIO number by value.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            log::error!("gpio: ISR service install failed (rc={})", ret);
            return;
        }
        gpio_set_intr_type(pin.0, gpio_int_type_t_GPIO_INTR_ANYEDGE);
        gpio_isr_handler_add(pin.0, Some(edge_isr), pin.0 as usize as *mut core::ffi::c_void);
        gpio_intr_enable(pin.0);
    }
    log::info!("gpio: edge ISR armed on {}", pin);
}

/// ADC1 oneshot + GPIO input driver.
#[cfg(target_os = "espidf")]
pub struct EspPins {
    adc1: Mutex<adc_oneshot_unit_handle_t>,
    modes: Mutex<HashMap<PinId, PinMode>>,
}

// SAFETY: the ADC handle is only used behind the mutex.
#[cfg(target_os = "espidf")]
unsafe impl Send for EspPins {}
#[cfg(target_os = "espidf")]
unsafe impl Sync for EspPins {}

#[cfg(target_os = "espidf")]
impl EspPins {
    pub fn new() -> Result<Self, HwError> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: called once at boot; `handle` outlives the call.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(HwError::PinConfigFailed(ret));
        }
        Ok(Self {
            adc1: Mutex::new(handle),
            modes: Mutex::new(HashMap::new()),
        })
    }

    /// ADC1 channel of a GPIO on the ESP32-S3 (GPIO1..=10 → CH0..=9).
    fn adc1_channel(pin: PinId) -> Result<adc_channel_t, HwError> {
        match pin.0 {
            1..=10 => Ok((pin.0 - 1) as adc_channel_t),
            _ => Err(HwError::UnknownPin(pin)),
        }
    }
}

#[cfg(target_os = "espidf")]
impl PinDriver for EspPins {
    fn configure(&self, pin: PinId, mode: PinMode) -> Result<(), HwError> {
        match mode {
            PinMode::AnalogInput => {
                let channel = Self::adc1_channel(pin)?;
                let chan_cfg = adc_oneshot_chan_cfg_t {
                    atten: adc_atten_t_ADC_ATTEN_DB_12,
                    bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
                };
                let adc = self.adc1.lock().unwrap_or_else(PoisonError::into_inner);
                // SAFETY: handle created in `new`, access serialised by the mutex.
                let ret = unsafe { adc_oneshot_config_channel(*adc, channel, &chan_cfg) };
                if ret != ESP_OK as i32 {
                    return Err(HwError::PinConfigFailed(ret));
                }
            }
            PinMode::DigitalInput => {
                let cfg = gpio_config_t {
                    pin_bit_mask: 1u64 << pin.0,
                    mode: gpio_mode_t_GPIO_MODE_INPUT,
                    pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
                    pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
                    intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
                };
                // SAFETY: plain register configuration of an input pin.
                let ret = unsafe { gpio_config(&cfg) };
                if ret != ESP_OK as i32 {
                    return Err(HwError::PinConfigFailed(ret));
                }
            }
        }
        self.modes.lock().unwrap_or_else(PoisonError::into_inner).insert(pin, mode);
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<f32, HwError> {
        let mode = self.modes.lock().unwrap_or_else(PoisonError::into_inner).get(&pin).copied();
        match mode {
            Some(PinMode::AnalogInput) => {
                let channel = Self::adc1_channel(pin)?;
                let adc = self.adc1.lock().unwrap_or_else(PoisonError::into_inner);
                let mut raw: i32 = 0;
                // SAFETY: as in `configure`.
                let ret = unsafe { adc_oneshot_read(*adc, channel, &mut raw) };
                if ret != ESP_OK as i32 {
                    return Err(HwError::PinReadFailed(ret));
                }
                Ok(raw.max(0) as f32)
            }
            // SAFETY: read-only register access.
            Some(PinMode::DigitalInput) => Ok(if unsafe { gpio_get_level(pin.0) } != 0 { 1.0 } else { 0.0 }),
            None => Err(HwError::UnknownPin(pin)),
        }
    }
}
