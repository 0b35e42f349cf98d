//! Edge-sequence recognition on a digital input, driven by pin levels and
//! the virtual clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use smartsensors::adapters::sim::SimPlatform;
use smartsensors::sequence::Phase;
use smartsensors::{ConfigError, DigitalSensor, Level, PinId, SequenceSpec};

const BUTTON: PinId = PinId(16);

struct Press {
    sim: SimPlatform,
    button: DigitalSensor,
    short: Arc<AtomicU32>,
    long: Arc<AtomicU32>,
}

/// Button with a 500–2000 ms press action and, optionally, a long-press action.
fn press_rig(with_overflow: bool) -> Press {
    let sim = SimPlatform::new();
    let button = DigitalSensor::new(BUTTON, &sim.platform()).unwrap();
    let short = Arc::new(AtomicU32::new(0));
    let long = Arc::new(AtomicU32::new(0));
    let (s, l) = (Arc::clone(&short), Arc::clone(&long));
    let overflow: Option<smartsensors::StepAction> = with_overflow.then(|| {
        Box::new(move || {
            l.fetch_add(1, Ordering::Relaxed);
        }) as smartsensors::StepAction
    });
    button
        .on_rise_and_fall(
            500,
            2000,
            move || {
                s.fetch_add(1, Ordering::Relaxed);
            },
            overflow,
        )
        .unwrap();
    Press { sim, button, short, long }
}

impl Press {
    fn hold_for(&self, ms: u64) {
        self.sim.pins.set_level(BUTTON, 1.0);
        self.sim.clock.advance(ms);
        self.sim.pins.set_level(BUTTON, 0.0);
    }

    fn counts(&self) -> (u32, u32) {
        (self.short.load(Ordering::Relaxed), self.long.load(Ordering::Relaxed))
    }
}

#[test]
fn press_shorter_than_min_is_a_bounce() {
    let p = press_rig(true);
    p.hold_for(499);
    assert_eq!(p.counts(), (0, 0));
    assert_eq!(p.sim.clock.armed(), 0);
}

#[test]
fn press_inside_the_window_runs_the_action() {
    for held in [500, 1200, 1999] {
        let p = press_rig(true);
        p.hold_for(held);
        assert_eq!(p.counts(), (1, 0), "held {held} ms");
        assert_eq!(p.sim.clock.armed(), 0);
    }
}

#[test]
fn press_reaching_max_overflows_once() {
    for held in [2000, 5000] {
        let p = press_rig(true);
        p.hold_for(held);
        assert_eq!(p.counts(), (0, 1), "held {held} ms");
    }
}

#[test]
fn press_reaching_max_without_overflow_is_silent() {
    let p = press_rig(false);
    p.hold_for(2500);
    assert_eq!(p.counts(), (0, 0));
    assert!(p.button.has_sequence());
}

#[test]
fn overflow_fires_while_still_held() {
    let p = press_rig(true);
    p.sim.pins.set_level(BUTTON, 1.0);
    p.sim.clock.advance(2000);
    assert_eq!(p.counts(), (0, 1));
    p.sim.clock.advance(3000);
    p.sim.pins.set_level(BUTTON, 0.0);
    assert_eq!(p.counts(), (0, 1));
}

#[test]
fn bounce_then_clean_press_is_recognised() {
    let p = press_rig(true);
    p.hold_for(30);
    p.sim.clock.advance(10);
    p.hold_for(700);
    assert_eq!(p.counts(), (1, 0));
}

#[test]
fn one_timer_at_a_time() {
    let p = press_rig(true);
    p.hold_for(800);
    p.hold_for(100);
    p.hold_for(2500);
    assert_eq!(p.sim.clock.peak_armed(), 1);
}

#[test]
fn two_step_sequence_runs_each_step_action() {
    let sim = SimPlatform::new();
    let button = DigitalSensor::new(BUTTON, &sim.platform()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (hello, world) = (Arc::clone(&log), Arc::clone(&log));
    button
        .on_sequence(
            SequenceSpec::new(Level::Low)
                .step(15, 30, move || hello.lock().unwrap().push("hello"))
                .step(15, 30, move || world.lock().unwrap().push("world")),
        )
        .unwrap();

    sim.pins.set_level(BUTTON, 1.0);
    sim.clock.advance(20);
    sim.pins.set_level(BUTTON, 0.0);
    assert_eq!(*log.lock().unwrap(), vec!["hello"]);
    sim.clock.advance(20);
    sim.pins.set_level(BUTTON, 1.0);
    assert_eq!(*log.lock().unwrap(), vec!["hello", "world"]);

    // Second step held too long: no action, machine back to idle.
    sim.pins.set_level(BUTTON, 0.0);
    sim.clock.advance(20);
    sim.pins.set_level(BUTTON, 1.0);
    sim.clock.advance(20);
    sim.pins.set_level(BUTTON, 0.0);
    assert_eq!(*log.lock().unwrap(), vec!["hello", "world", "hello"]);
    sim.clock.advance(40);
    sim.pins.set_level(BUTTON, 1.0);
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn fall_and_rise_starts_from_high() {
    let sim = SimPlatform::new();
    sim.pins.set_level(BUTTON, 1.0);
    let button = DigitalSensor::new(BUTTON, &sim.platform()).unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let h = Arc::clone(&hits);
    button
        .on_fall_and_rise(100, 300, move || {
            h.fetch_add(1, Ordering::Relaxed);
        }, None)
        .unwrap();

    sim.pins.set_level(BUTTON, 0.0);
    sim.clock.advance(150);
    sim.pins.set_level(BUTTON, 1.0);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn invalid_windows_are_rejected() {
    let sim = SimPlatform::new();
    let button = DigitalSensor::new(BUTTON, &sim.platform()).unwrap();
    assert_eq!(
        button.on_rise_and_fall(600, 500, || {}, None).err(),
        Some(ConfigError::InvalidPersistence)
    );
    assert_eq!(
        button.on_sequence(SequenceSpec::new(Level::Low)).err(),
        Some(ConfigError::EmptySequence)
    );
    assert!(!button.has_sequence());
}

#[test]
fn phase_is_observable_through_the_matcher() {
    let sim = SimPlatform::new();
    let matcher = smartsensors::EdgeSequenceMatcher::new(
        BUTTON,
        sim.clock.clone(),
        SequenceSpec::single(Level::Low, 10, 20, Box::new(|| {}), None),
    )
    .unwrap();
    assert_eq!(matcher.phase(), Phase::Idle);
    matcher.on_edge(smartsensors::Edge::Rise);
    assert_eq!(matcher.phase(), Phase::WaitingMin { step: 0 });
    sim.clock.advance(10);
    assert_eq!(matcher.phase(), Phase::WaitingMax { step: 0 });
    sim.clock.advance(10);
    assert_eq!(matcher.phase(), Phase::Idle);
}

#[test]
fn unarmable_min_timer_leaves_the_matcher_idle() {
    let sim = SimPlatform::new();
    let matcher = smartsensors::EdgeSequenceMatcher::new(
        BUTTON,
        sim.clock.clone(),
        SequenceSpec::single(Level::Low, 10, 20, Box::new(|| {}), None),
    )
    .unwrap();
    sim.clock.fail_arms(true);
    matcher.on_edge(smartsensors::Edge::Rise);
    assert_eq!(matcher.phase(), Phase::Idle);
    assert_eq!(sim.clock.armed(), 0);

    sim.clock.fail_arms(false);
    matcher.on_edge(smartsensors::Edge::Fall);
    matcher.on_edge(smartsensors::Edge::Rise);
    assert_eq!(matcher.phase(), Phase::WaitingMin { step: 0 });
}

#[test]
fn unarmable_max_timer_leaves_the_matcher_idle() {
    let sim = SimPlatform::new();
    let matcher = smartsensors::EdgeSequenceMatcher::new(
        BUTTON,
        sim.clock.clone(),
        SequenceSpec::single(Level::Low, 10, 20, Box::new(|| {}), None),
    )
    .unwrap();
    matcher.on_edge(smartsensors::Edge::Rise);
    sim.clock.fail_arms(true);
    sim.clock.advance(10);
    assert_eq!(matcher.phase(), Phase::Idle);
    assert_eq!(sim.clock.armed(), 0);
}

#[test]
fn press_after_a_timer_outage_is_recognised() {
    let p = press_rig(true);
    p.sim.clock.fail_arms(true);
    p.hold_for(800);
    assert_eq!(p.counts(), (0, 0));

    p.sim.clock.fail_arms(false);
    p.hold_for(800);
    assert_eq!(p.counts(), (1, 0));
}
