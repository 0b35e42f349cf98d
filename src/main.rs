//! SmartSensors demo firmware entry point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  EspPins (ADC1+GPIO)   EdgeDispatcher (ISR queue)            │
//! │  EspTimerAdapter       PinnedExecutor (core 1)               │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  light ─▶ light_avg (derived)        button ─▶ sequence      │
//! │  temp  ─┐                                                    │
//! │  lid   ─┴▶ SensorPool (one timer)                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use smartsensors::adapters::gpio::{arm_edge_isr, EdgeDispatcher, EspPins};
use smartsensors::adapters::hw_timer::EspTimerAdapter;
use smartsensors::adapters::task_pin::PinnedExecutor;
use smartsensors::events::EDGE_QUEUE;
use smartsensors::pins;
use smartsensors::{
    AcquisitionKind, DigitalSensor, Field, Platform, PoolPlan, SamplingPeriod, Sensor, SensorPool,
};

/// Pool plan for `[temp, lid]`: temperature every 2 s over 5 samples, lid
/// switch every 250 ms without statistics.
const POOL_PLAN: &str = r#"{"entries":[
    {"period_ms":2000,"window":5,"kind":"Normalized"},
    {"period_ms":250}
]}"#;

/// 12-bit ADC reading → 0..100 %.
fn adc_percent(raw: f32) -> f32 {
    raw * 100.0 / 4095.0
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartSensors v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Platform ───────────────────────────────────────────
    let edges = Arc::new(EdgeDispatcher::new(&EDGE_QUEUE, arm_edge_isr));
    let timer = Arc::new(EspTimerAdapter::new()?);
    let platform = Platform::new(
        Arc::new(EspPins::new()?),
        Arc::clone(&edges) as _,
        Arc::clone(&timer) as _,
        Arc::new(PinnedExecutor::default()),
    );

    // ── 3. Light sensor + derived moving average ──────────────
    let light = Sensor::analog(pins::LIGHT_ADC, &platform)?;
    light
        .set_norm_func(|raw, _| adc_percent(raw))
        .add_check(
            |s| s.current_sample().is_some_and(|v| v < 5.0),
            |s| warn!("light: dark ({:?} %)", s.current_sample()),
        );
    light.start_sampling(SamplingPeriod::millis(100), Some(10), AcquisitionKind::Normalized)?;

    let light_avg = Sensor::derived(&light, Field::Average, &platform);
    light_avg.do_every_sample(|s| {
        if let (Some(avg), Some(trend)) = (s.average(), s.trend()) {
            info!("light: avg={:.1} % trend={:.2} %/s", avg, trend);
        }
    });
    light_avg.start_sampling(SamplingPeriod::millis(1000), Some(30), AcquisitionKind::Raw)?;

    // ── 4. Button: 0.5–2 s press toggles, longer press resets ──
    let button = DigitalSensor::new(pins::BUTTON, &platform)?;
    let enabled = Arc::new(AtomicBool::new(true));
    let long_presses = Arc::new(AtomicU32::new(0));
    let toggle = Arc::clone(&enabled);
    let long = Arc::clone(&long_presses);
    button.on_rise_and_fall(
        500,
        2000,
        move || {
            let was = toggle.fetch_xor(true, Ordering::Relaxed);
            info!("button: logging {}", if was { "paused" } else { "resumed" });
        },
        Some(Box::new(move || {
            let n = long.fetch_add(1, Ordering::Relaxed) + 1;
            info!("button: long press #{}", n);
        })),
    )?;

    // ── 5. Pool: temperature + lid switch on one timer ────────
    let temp = Sensor::analog(pins::TEMP_ADC, &platform)?;
    temp.set_norm_func(|raw, _| adc_percent(raw));
    let lid = DigitalSensor::new(pins::LID_SWITCH, &platform)?;
    let opened = Arc::new(AtomicBool::new(false));
    let was_open = Arc::clone(&opened);
    lid.do_every_sample(move |s| {
        let open = s.current_sample() == Some(1.0);
        if open != was_open.swap(open, Ordering::Relaxed) {
            info!("lid: {}", if open { "opened" } else { "closed" });
        }
    });

    let pool = SensorPool::new(&[&temp, lid.as_sensor()], &platform)?;
    pool.start_with_plan(&PoolPlan::from_json(POOL_PLAN)?)?;

    // ── 6. Main loop ──────────────────────────────────────────
    info!("Entering main loop");
    loop {
        edges.dispatch_pending();
        timer.collect();

        if enabled.load(Ordering::Relaxed) {
            if let Some(avg) = temp.average() {
                log::debug!("temp: avg={:.1} %", avg);
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
