//! Unified error types for the sensor library.
//!
//! One `Error` enum that every subsystem converts into.  All variants are
//! `Copy` so they can be passed through timer and edge callbacks without
//! allocation.
//!
//! Two families exist and they never mix:
//!
//! - **Configuration errors** are returned synchronously from the call that
//!   configured something (`start_sampling`, pool start, `on_sequence`, ...).
//! - **Acquisition errors** come out of `acquire`.  Inside timer, loop and
//!   edge callbacks there is no caller to report to, so they are logged and
//!   dropped there.

use core::fmt;

use crate::ports::PinId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Rejected configuration.
    Config(ConfigError),
    /// A single acquisition could not produce a sample.
    Acquire(AcquireError),
    /// A hardware capability failed.
    Hw(HwError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Acquire(e) => write!(f, "acquire: {e}"),
            Self::Hw(e) => write!(f, "hw: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Observation window length of zero.
    InvalidWindowLength,
    /// Observation window longer than the static buffer capacity.
    WindowTooLong { requested: usize, max: usize },
    /// Sampling period of zero.
    InvalidPeriod,
    /// Pool arrays (sensors, periods, windows, kinds) differ in length.
    MismatchedPoolArrays,
    /// The sensor is already sampling (millisecond timer or microsecond loop).
    SamplingConflict,
    /// The sensor is driven by a pool and cannot run its own sampling.
    PoolManaged,
    /// A pool needs at least one sensor.
    EmptyPool,
    /// More pool members than the static slot table holds.
    PoolFull,
    /// A derived sensor would (transitively) read from itself.
    SourceCycle,
    /// A sequence needs at least one step.
    EmptySequence,
    /// More sequence steps than the static step table holds.
    SequenceTooLong,
    /// Minimum persistence greater than maximum persistence.
    InvalidPersistence,
    /// Step and action lists differ in length.
    MismatchedSequenceActions,
    /// A configuration document could not be parsed.
    InvalidDocument,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindowLength => write!(f, "observation window must hold at least one sample"),
            Self::WindowTooLong { requested, max } => {
                write!(f, "observation window of {requested} exceeds capacity {max}")
            }
            Self::InvalidPeriod => write!(f, "sampling period must be non-zero"),
            Self::MismatchedPoolArrays => write!(f, "pool parameter arrays differ in length"),
            Self::SamplingConflict => write!(f, "sensor is already sampling"),
            Self::PoolManaged => write!(f, "sensor is under pool control"),
            Self::EmptyPool => write!(f, "pool has no sensors"),
            Self::PoolFull => write!(f, "too many pool members"),
            Self::SourceCycle => write!(f, "derived source chain reaches the sensor itself"),
            Self::EmptySequence => write!(f, "sequence has no steps"),
            Self::SequenceTooLong => write!(f, "sequence has too many steps"),
            Self::InvalidPersistence => write!(f, "minimum persistence exceeds maximum"),
            Self::MismatchedSequenceActions => write!(f, "one action per sequence step required"),
            Self::InvalidDocument => write!(f, "invalid configuration document"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Acquisition errors
// ---------------------------------------------------------------------------

/// Reasons an acquisition produced no sample.
///
/// A derived sensor whose source has no value yet is *not* an error: that
/// case comes back as `Ok(None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Normalized acquisition requested with no normalization function set.
    Skipped,
    /// The sensor a derived source points at has been dropped.
    SourceReleased,
    /// The pin read failed.
    Pin(HwError),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped, no normalization function"),
            Self::SourceReleased => write!(f, "source sensor released"),
            Self::Pin(e) => write!(f, "pin: {e}"),
        }
    }
}

impl core::error::Error for AcquireError {}

impl From<AcquireError> for Error {
    fn from(e: AcquireError) -> Self {
        Self::Acquire(e)
    }
}

impl From<HwError> for AcquireError {
    fn from(e: HwError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware capability errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// GPIO / ADC configuration failed (driver return code).
    PinConfigFailed(i32),
    /// GPIO / ADC read failed (driver return code).
    PinReadFailed(i32),
    /// The pin is not known to the driver.
    UnknownPin(PinId),
    /// No timer could be created or armed.
    TimerUnavailable,
    /// A sampling loop could not be spawned.
    SpawnFailed,
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinConfigFailed(rc) => write!(f, "pin config failed (rc={rc})"),
            Self::PinReadFailed(rc) => write!(f, "pin read failed (rc={rc})"),
            Self::UnknownPin(pin) => write!(f, "unknown pin {pin}"),
            Self::TimerUnavailable => write!(f, "timer unavailable"),
            Self::SpawnFailed => write!(f, "sampling loop spawn failed"),
        }
    }
}

impl core::error::Error for HwError {}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Self::Hw(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Library-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
