//! Edge-sequence matcher: debounce and timed press detection on one pin.
//!
//! Wraps the pure [`SequenceMachine`] with real timers and user actions.
//! Edge notifications (ISR-dispatched) and timer expirations (timer task)
//! may interleave; each event runs the machine and executes the resulting
//! timer commands inside one critical section, so an edge arriving while a
//! timer is being cancelled or re-armed always sees a consistent state.
//! User actions run after the critical section is released.

pub mod machine;

use core::cell::RefCell;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as CsMutex;
use log::{debug, error, info};

use crate::config::MAX_SEQUENCE_STEPS;
use crate::error::{ConfigError, HwError};
use crate::ports::{PinId, Timer, TimerHandle};

pub use machine::{Edge, Level, Persistence, Phase, SequenceMachine};
use machine::{Command, Notify, Reaction};

/// Action run when a step completes or the first step overflows.
pub type StepAction = Box<dyn FnMut() + Send + 'static>;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Sequence description, built step by step.
///
/// ```ignore
/// // HIGH for 15–30 ms, then LOW for 15–30 ms.
/// let spec = SequenceSpec::new(Level::Low)
///     .step(15, 30, hello)
///     .step(15, 30, world)
///     .on_overflow(long_press);
/// ```
pub struct SequenceSpec {
    start: Level,
    steps: Vec<(Persistence, Option<StepAction>)>,
    overflow: Option<StepAction>,
}

impl SequenceSpec {
    /// `start` is the resting level the sequence waits to leave.
    pub fn new(start: Level) -> Self {
        Self {
            start,
            steps: Vec::new(),
            overflow: None,
        }
    }

    /// Build from parallel `times` / `actions` lists.
    pub fn from_parts(
        start: Level,
        times: &[Persistence],
        actions: Vec<Option<StepAction>>,
        overflow: Option<StepAction>,
    ) -> Result<Self, ConfigError> {
        if times.len() != actions.len() {
            return Err(ConfigError::MismatchedSequenceActions);
        }
        Ok(Self {
            start,
            steps: times.iter().copied().zip(actions).collect(),
            overflow,
        })
    }

    #[must_use]
    pub fn step(mut self, min_ms: u32, max_ms: u32, action: impl FnMut() + Send + 'static) -> Self {
        self.steps.push((Persistence::new(min_ms, max_ms), Some(Box::new(action))));
        self
    }

    /// A step that must be respected but runs nothing.
    #[must_use]
    pub fn silent_step(mut self, min_ms: u32, max_ms: u32) -> Self {
        self.steps.push((Persistence::new(min_ms, max_ms), None));
        self
    }

    /// Run `action` when the first step outlasts its maximum.
    #[must_use]
    pub fn on_overflow(mut self, action: impl FnMut() + Send + 'static) -> Self {
        self.overflow = Some(Box::new(action));
        self
    }

    /// Single step: leave `start`, hold the opposite level, come back.
    pub fn single(
        start: Level,
        min_ms: u32,
        max_ms: u32,
        action: StepAction,
        overflow: Option<StepAction>,
    ) -> Self {
        Self {
            start,
            steps: vec![(Persistence::new(min_ms, max_ms), Some(action))],
            overflow,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Matcher
// ───────────────────────────────────────────────────────────────

struct Runtime {
    machine: SequenceMachine,
    min_timer: Option<TimerHandle>,
    max_timer: Option<TimerHandle>,
}

struct Actions {
    steps: heapless::Vec<Option<StepAction>, MAX_SEQUENCE_STEPS>,
    overflow: Option<StepAction>,
}

struct MatcherShared {
    pin: PinId,
    timer: Arc<dyn Timer>,
    runtime: CsMutex<CriticalSectionRawMutex, RefCell<Runtime>>,
    actions: Mutex<Actions>,
}

/// Running edge-sequence recogniser.  Dropping it cancels its timers.
pub struct EdgeSequenceMatcher {
    shared: Arc<MatcherShared>,
}

impl EdgeSequenceMatcher {
    pub fn new(pin: PinId, timer: Arc<dyn Timer>, spec: SequenceSpec) -> Result<Self, ConfigError> {
        if spec.steps.len() > MAX_SEQUENCE_STEPS {
            return Err(ConfigError::SequenceTooLong);
        }
        let times: heapless::Vec<Persistence, MAX_SEQUENCE_STEPS> = spec.steps.iter().map(|(p, _)| *p).collect();
        let machine = SequenceMachine::new(spec.start, &times, spec.overflow.is_some())?;

        let mut steps = heapless::Vec::new();
        for (_, action) in spec.steps {
            let _ = steps.push(action);
        }

        info!(
            "sequence on {}: {} step(s) from {:?}, overflow={}",
            pin,
            times.len(),
            spec.start,
            spec.overflow.is_some()
        );

        Ok(Self {
            shared: Arc::new(MatcherShared {
                pin,
                timer,
                runtime: CsMutex::new(RefCell::new(Runtime {
                    machine,
                    min_timer: None,
                    max_timer: None,
                })),
                actions: Mutex::new(Actions {
                    steps,
                    overflow: spec.overflow,
                }),
            }),
        })
    }

    pub fn pin(&self) -> PinId {
        self.shared.pin
    }

    /// Edge-callback factory: the returned closure forwards `edge` to this
    /// matcher for as long as it exists.
    pub fn edge_handler(&self, edge: Edge) -> impl FnMut() + Send + 'static {
        let weak = Arc::downgrade(&self.shared);
        move || {
            if let Some(shared) = weak.upgrade() {
                shared.handle(|m| m.on_edge(edge));
            }
        }
    }

    /// Feed an edge directly (used by the edge handlers).
    pub fn on_edge(&self, edge: Edge) {
        self.shared.handle(|m| m.on_edge(edge));
    }

    pub fn phase(&self) -> Phase {
        self.shared.runtime.lock(|rt| rt.borrow().machine.phase())
    }
}

impl MatcherShared {
    fn handle(self: &Arc<Self>, event: impl FnOnce(&mut SequenceMachine) -> Reaction) {
        let notify = self.runtime.lock(|cell| {
            let mut rt = cell.borrow_mut();
            let reaction = event(&mut rt.machine);
            for cmd in reaction.commands {
                self.apply(&mut *rt, cmd);
            }
            reaction.notify
        });
        if let Some(notify) = notify {
            self.notify(notify);
        }
    }

    fn apply(self: &Arc<Self>, rt: &mut Runtime, cmd: Command) {
        match cmd {
            Command::ArmMin { delay_ms, token } => {
                let weak = Arc::downgrade(self);
                let armed = self.timer.one_shot(
                    delay_ms,
                    Box::new(move || {
                        with_live(&weak, |s| s.min_elapsed(token));
                    }),
                );
                rt.min_timer = self.armed_or_reset(rt, armed);
            }
            Command::ArmMax { delay_ms, token } => {
                let weak = Arc::downgrade(self);
                let armed = self.timer.one_shot(
                    delay_ms,
                    Box::new(move || {
                        with_live(&weak, |s| s.max_elapsed(token));
                    }),
                );
                rt.max_timer = self.armed_or_reset(rt, armed);
            }
            Command::CancelMin => {
                if let Some(h) = rt.min_timer.take() {
                    self.timer.cancel(h);
                }
            }
            Command::CancelMax => {
                if let Some(h) = rt.max_timer.take() {
                    self.timer.cancel(h);
                }
            }
        }
    }

    fn armed_or_reset(
        &self,
        rt: &mut Runtime,
        armed: Result<TimerHandle, HwError>,
    ) -> Option<TimerHandle> {
        match armed {
            Ok(h) => Some(h),
            Err(e) => {
                error!("sequence on {}: {}; back to idle", self.pin, e);
                rt.machine.reset();
                None
            }
        }
    }

    fn min_elapsed(self: &Arc<Self>, token: u32) {
        self.handle(|m| {
            let r = m.on_min_elapsed(token);
            if r.commands.is_empty() {
                debug!("sequence on {}: stale min timer", self.pin);
            }
            r
        });
    }

    fn max_elapsed(self: &Arc<Self>, token: u32) {
        self.handle(|m| m.on_max_elapsed(token));
    }

    fn notify(&self, notify: Notify) {
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        let action = match notify {
            Notify::Step(k) => actions.steps.get_mut(k).and_then(Option::as_mut),
            Notify::Overflow => actions.overflow.as_mut(),
        };
        if let Some(action) = action {
            action();
        }
    }
}

impl Drop for MatcherShared {
    fn drop(&mut self) {
        let rt = self.runtime.get_mut().get_mut();
        for handle in [rt.min_timer.take(), rt.max_timer.take()].into_iter().flatten() {
            self.timer.cancel(handle);
        }
    }
}

fn with_live(weak: &Weak<MatcherShared>, f: impl FnOnce(&Arc<MatcherShared>)) {
    if let Some(shared) = weak.upgrade() {
        f(&shared);
    }
}
