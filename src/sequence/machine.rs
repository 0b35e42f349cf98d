//! Timed edge-sequence state machine (pure logic, no timers, no I/O).
//!
//! The machine consumes edges and timer expirations and answers with the
//! timer commands to execute and, at most, one notification.  The driver in
//! [`super`] owns the real timers and the user actions.
//!
//! ```text
//!                 opening edge
//!        ┌──────┐ ───────────▶ ┌────────────┐  min fires   ┌────────────┐
//!        │ Idle │              │ WaitingMin │ ───────────▶ │ WaitingMax │
//!        └──────┘ ◀─────────── └────────────┘              └────────────┘
//!           ▲        bounce                                  │      │
//!           │                                   closing edge │      │ max fires
//!           │            (last step)  notify Step(k)         │      │ (Overflow
//!           └────────────────────────────────────────────────┘      │  at step 0)
//!           └───────────────────────────────────────────────────────┘
//! ```
//!
//! Step `k` times how long the pin *stays* at one level.  Step 0 starts on
//! the edge leaving the start level; the level alternates every step.  A
//! closing edge that completes a non-final step is also the opening edge
//! of the next one.
//!
//! Every arm carries a fresh token.  Expirations with any other token are
//! stale (their timer was cancelled or superseded) and are ignored, so a
//! late callback can never corrupt the running sequence.

use crate::config::MAX_SEQUENCE_STEPS;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl core::ops::Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rise,
    Fall,
}

impl Edge {
    /// Level the pin is at after this edge.
    pub fn target(self) -> Level {
        match self {
            Self::Rise => Level::High,
            Self::Fall => Level::Low,
        }
    }
}

/// Allowed time at one level, in milliseconds, measured from the edge that
/// entered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persistence {
    pub min_ms: u32,
    pub max_ms: u32,
}

impl Persistence {
    pub const fn new(min_ms: u32, max_ms: u32) -> Self {
        Self { min_ms, max_ms }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    WaitingMin { step: usize },
    WaitingMax { step: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ArmMin { delay_ms: u32, token: u32 },
    ArmMax { delay_ms: u32, token: u32 },
    CancelMin,
    CancelMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// Step `k` completed within its bounds.
    Step(usize),
    /// The first step outlasted its maximum.
    Overflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub commands: heapless::Vec<Command, 2>,
    pub notify: Option<Notify>,
}

impl Reaction {
    fn with(commands: &[Command], notify: Option<Notify>) -> Self {
        let mut r = Self {
            commands: heapless::Vec::new(),
            notify,
        };
        for &c in commands {
            let _ = r.commands.push(c);
        }
        r
    }
}

#[derive(Debug, Clone)]
pub struct SequenceMachine {
    start: Level,
    steps: heapless::Vec<Persistence, MAX_SEQUENCE_STEPS>,
    has_overflow: bool,
    phase: Phase,
    token: u32,
    overflow_pending: bool,
}

impl SequenceMachine {
    pub fn new(start: Level, steps: &[Persistence], has_overflow: bool) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        if steps.iter().any(|p| p.min_ms > p.max_ms) {
            return Err(ConfigError::InvalidPersistence);
        }
        let steps = heapless::Vec::from_slice(steps).map_err(|_| ConfigError::SequenceTooLong)?;
        Ok(Self {
            start,
            steps,
            has_overflow,
            phase: Phase::Idle,
            token: 0,
            overflow_pending: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn token(&self) -> u32 {
        self.token
    }

    pub fn start(&self) -> Level {
        self.start
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Level the pin must hold during `step`.
    pub fn held_level(&self, step: usize) -> Level {
        if step % 2 == 0 { !self.start } else { self.start }
    }

    pub fn on_edge(&mut self, edge: Edge) -> Reaction {
        match self.phase {
            Phase::Idle => {
                if edge.target() == self.held_level(0) {
                    let arm = self.arm_min(0);
                    Reaction::with(&[arm], None)
                } else {
                    Reaction::default()
                }
            }
            Phase::WaitingMin { step } => {
                if edge.target() == self.held_level(step) {
                    return Reaction::default();
                }
                self.reset();
                Reaction::with(&[Command::CancelMin], None)
            }
            Phase::WaitingMax { step } => {
                if edge.target() == self.held_level(step) {
                    return Reaction::default();
                }
                self.overflow_pending = false;
                let next = step + 1;
                if next < self.steps.len() {
                    let arm = self.arm_min(next);
                    Reaction::with(&[Command::CancelMax, arm], Some(Notify::Step(step)))
                } else {
                    self.reset();
                    Reaction::with(&[Command::CancelMax], Some(Notify::Step(step)))
                }
            }
        }
    }

    pub fn on_min_elapsed(&mut self, token: u32) -> Reaction {
        let Phase::WaitingMin { step } = self.phase else {
            return Reaction::default();
        };
        if token != self.token {
            return Reaction::default();
        }
        let p = self.steps[step];
        self.token = self.token.wrapping_add(1);
        self.phase = Phase::WaitingMax { step };
        self.overflow_pending = step == 0 && self.has_overflow;
        Reaction::with(
            &[Command::ArmMax {
                delay_ms: p.max_ms.saturating_sub(p.min_ms),
                token: self.token,
            }],
            None,
        )
    }

    pub fn on_max_elapsed(&mut self, token: u32) -> Reaction {
        let Phase::WaitingMax { .. } = self.phase else {
            return Reaction::default();
        };
        if token != self.token {
            return Reaction::default();
        }
        let notify = self.overflow_pending.then_some(Notify::Overflow);
        self.reset();
        Reaction::with(&[], notify)
    }

    /// Back to `Idle`; any outstanding token becomes stale.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.overflow_pending = false;
        self.token = self.token.wrapping_add(1);
    }

    fn arm_min(&mut self, step: usize) -> Command {
        self.token = self.token.wrapping_add(1);
        self.phase = Phase::WaitingMin { step };
        Command::ArmMin {
            delay_ms: self.steps[step].min_ms,
            token: self.token,
        }
    }
}
