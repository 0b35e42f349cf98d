//! GPIO assignments for the demo board.
//!
//! Single source of truth for `main.rs`; library code never hard-codes pins.

use crate::ports::PinId;

// ---------------------------------------------------------------------------
// Analog (ADC1)
// ---------------------------------------------------------------------------

/// Photoresistor divider.  ADC1 channel 3 (GPIO 4 on ESP32-S3).
pub const LIGHT_ADC: PinId = PinId(4);

/// NTC thermistor divider.  ADC1 channel 8 (GPIO 9 on ESP32-S3).
pub const TEMP_ADC: PinId = PinId(9);

// ---------------------------------------------------------------------------
// Digital
// ---------------------------------------------------------------------------

/// Momentary push-button, active HIGH with on-board pull-down.
pub const BUTTON: PinId = PinId(16);

/// Reed switch on the enclosure lid.  HIGH = lid open.
pub const LID_SWITCH: PinId = PinId(10);
