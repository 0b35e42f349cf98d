//! Self-sampling: timer strategy, microsecond loop strategy and lifecycle.

use smartsensors::adapters::sim::SimPlatform;
use smartsensors::{AcquisitionKind, ConfigError, Error, PinId, SamplingPeriod, Sensor};

use super::mock_hw::{recorder, Rig};

const PIN: PinId = PinId(4);

#[test]
fn millisecond_sampling_fills_window_and_evaluates() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[10.0, 20.0, 30.0, 40.0, 50.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::millis(1000), Some(4), AcquisitionKind::Raw)
        .unwrap();

    rig.advance(3000);
    assert_eq!(s.current_sample(), Some(30.0));
    assert_eq!(s.average(), None, "average only once the window is full");
    assert_eq!(s.min(), Some(10.0));

    rig.advance(1000);
    assert_eq!(s.average(), Some(25.0));
    assert_eq!(s.derivative(), Some(10.0));

    rig.advance(1000);
    assert_eq!(s.previous_sample(), Some(40.0));
    assert_eq!(s.average(), Some(35.0));
    assert_eq!(s.min(), Some(20.0), "evicted minimum is rescanned");
    assert_eq!(s.max(), Some(50.0));
    // (50 - 20) / (4 samples · 1 s), floored.
    assert_eq!(s.trend(), Some(7.0));
}

#[test]
fn every_sample_actions_run_in_order_then_checks() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0, 9.0, 2.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    let (log, out) = recorder::<String>();
    let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
    s.do_every_sample(move |st| l1.lock().unwrap().push(format!("a{}", st.current_sample().unwrap())))
        .do_every_sample(move |_| l2.lock().unwrap().push("b".into()))
        .add_check(
            |st| st.current_sample() > Some(5.0),
            move |st| l3.lock().unwrap().push(format!("high{}", st.current_sample().unwrap())),
        );
    s.start_sampling(SamplingPeriod::millis(10), None, AcquisitionKind::Raw)
        .unwrap();

    rig.advance(30);
    assert_eq!(*out.lock().unwrap(), vec!["a1", "b", "a9", "b", "high9", "a2", "b"]);
}

#[test]
fn normalized_sampling_applies_norm_func() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[4095.0, 0.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.set_norm_func(|raw, _| raw * 100.0 / 4095.0);
    s.start_sampling(SamplingPeriod::millis(50), Some(2), AcquisitionKind::Normalized)
        .unwrap();
    rig.advance(100);
    assert_eq!(s.previous_sample(), Some(100.0));
    assert_eq!(s.current_sample(), Some(0.0));
    assert_eq!(s.average(), Some(50.0));
}

#[test]
fn stop_cancels_the_timer_and_clears_state() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[5.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::millis(100), Some(2), AcquisitionKind::Raw)
        .unwrap();
    rig.advance(250);
    assert_eq!(rig.pins.reads(PIN), 2);

    s.stop_sampling();
    assert!(!s.is_sampling());
    assert_eq!(rig.sim.clock.armed(), 0);
    assert_eq!(s.current_sample(), None);
    assert_eq!(s.state().sampling_period(), None);

    rig.advance(1000);
    assert_eq!(rig.pins.reads(PIN), 2);
}

#[test]
fn second_start_is_a_conflict() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::millis(100), None, AcquisitionKind::Raw)
        .unwrap();
    let again = s.start_sampling(SamplingPeriod::micros(100), None, AcquisitionKind::Raw);
    assert_eq!(again.err(), Some(Error::Config(ConfigError::SamplingConflict)));
}

#[test]
fn restart_after_stop_ignores_the_old_timer() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::millis(100), None, AcquisitionKind::Raw)
        .unwrap();
    s.stop_sampling();
    s.start_sampling(SamplingPeriod::millis(300), None, AcquisitionKind::Raw)
        .unwrap();
    rig.advance(900);
    assert_eq!(rig.pins.reads(PIN), 3);
}

#[test]
fn invalid_parameters_are_rejected_before_anything_starts() {
    let rig = Rig::new();
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    assert_eq!(
        s.start_sampling(SamplingPeriod::millis(0), None, AcquisitionKind::Raw).err(),
        Some(Error::Config(ConfigError::InvalidPeriod))
    );
    assert_eq!(
        s.start_sampling(SamplingPeriod::millis(10), Some(0), AcquisitionKind::Raw).err(),
        Some(Error::Config(ConfigError::InvalidWindowLength))
    );
    assert!(!s.is_sampling());
    assert_eq!(rig.sim.clock.armed(), 0);
}

#[test]
fn microsecond_loop_samples_and_sleeps_between() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[3.0, 6.0, 9.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::micros(250), Some(3), AcquisitionKind::Raw)
        .unwrap();

    for _ in 0..3 {
        assert_eq!(rig.sim.executor.step_all(), 1);
    }
    assert_eq!(s.average(), Some(6.0));
    assert_eq!(rig.sim.executor.slept_us(), 750);

    s.stop_sampling();
    assert_eq!(rig.sim.executor.step_all(), 0);
    assert_eq!(rig.sim.executor.live(), 0);
}

#[test]
fn dropping_the_last_handle_ends_the_loop() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0]);
    let s = Sensor::analog(PIN, &rig.platform).unwrap();
    s.start_sampling(SamplingPeriod::micros(10), None, AcquisitionKind::Raw)
        .unwrap();
    drop(s);
    assert_eq!(rig.sim.executor.step_all(), 0);
}

#[test]
fn failed_reads_do_not_stop_timer_sampling() {
    let sim = SimPlatform::new();
    sim.pins.set_level(PIN, 7.0);
    let s = Sensor::analog(PIN, &sim.platform()).unwrap();
    s.start_sampling(SamplingPeriod::millis(100), Some(2), AcquisitionKind::Raw)
        .unwrap();

    sim.pins.fail_reads(PIN, Some(-1));
    sim.clock.advance(300);
    assert_eq!(s.current_sample(), None);
    assert!(s.is_sampling());
    assert_eq!(sim.clock.armed(), 1);

    sim.pins.fail_reads(PIN, None);
    sim.clock.advance(100);
    assert_eq!(s.current_sample(), Some(7.0));
}

#[test]
fn failed_reads_do_not_end_the_microsecond_loop() {
    let sim = SimPlatform::new();
    sim.pins.set_level(PIN, 4.0);
    let s = Sensor::analog(PIN, &sim.platform()).unwrap();
    s.start_sampling(SamplingPeriod::micros(50), None, AcquisitionKind::Raw)
        .unwrap();

    sim.pins.fail_reads(PIN, Some(-1));
    assert_eq!(sim.executor.step_all(), 1);
    assert_eq!(sim.executor.step_all(), 1);
    assert_eq!(s.current_sample(), None);

    sim.pins.fail_reads(PIN, None);
    assert_eq!(sim.executor.step_all(), 1);
    assert_eq!(s.current_sample(), Some(4.0));
    assert_eq!(sim.executor.slept_us(), 150);
}
