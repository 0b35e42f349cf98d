//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter      | Implements           | Connects to                      |
//! |--------------|----------------------|----------------------------------|
//! | `gpio`       | EdgeNotifier         | GPIO ISR → edge queue            |
//! |              | PinDriver            | ESP32 ADC1 oneshot, GPIO input   |
//! | `hal_pins`   | PinDriver            | any `embedded-hal` input pin     |
//! | `hw_timer`   | Timer                | esp_timer task service / threads |
//! | `task_pin`   | ConcurrentExecution  | core-pinned FreeRTOS tasks       |
//! | `sim`        | all four             | deterministic host simulation    |

pub mod gpio;
pub mod hal_pins;
pub mod hw_timer;
pub mod sim;
pub mod task_pin;
