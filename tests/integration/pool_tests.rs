//! Sensor pools: many periods multiplexed on one timer.

use std::sync::{Arc, Mutex};

use smartsensors::adapters::sim::SimPlatform;
use smartsensors::{
    AcquisitionKind, ConfigError, DigitalSensor, Error, HwError, PinId, PoolPlan, SamplingPeriod, Sensor,
    SensorPool,
};

use super::mock_hw::Rig;

/// Analog sensor on `pin` that logs the virtual time of every sample.
fn timed(rig: &Rig, pin: i32) -> (Sensor, Arc<Mutex<Vec<u64>>>) {
    rig.pins.script(PinId(pin), &[1.0]);
    let s = Sensor::analog(PinId(pin), &rig.platform).unwrap();
    let times = Arc::new(Mutex::new(Vec::new()));
    let (t, clock) = (Arc::clone(&times), rig.sim.clock.clone());
    s.do_every_sample(move |_| t.lock().unwrap().push(clock.now_ms()));
    (s, times)
}

#[test]
fn each_member_keeps_its_own_period() {
    let rig = Rig::new();
    let (a, ta) = timed(&rig, 1);
    let (b, tb) = timed(&rig, 2);
    let (c, tc) = timed(&rig, 3);
    let pool = SensorPool::new(&[&a, &b, &c], &rig.platform).unwrap();
    pool.start_sampling(&[1000, 700, 250], &[None; 3], &[AcquisitionKind::Raw; 3])
        .unwrap();

    rig.advance(10_000);
    assert_eq!(ta.lock().unwrap().len(), 10);
    assert_eq!(tb.lock().unwrap().len(), 14);
    assert_eq!(tc.lock().unwrap().len(), 40);
    assert_eq!(&tb.lock().unwrap()[..3], &[700, 1400, 2100]);
    assert_eq!(rig.sim.clock.peak_armed(), 1);
}

#[test]
fn plan_drives_windows_and_kinds() {
    let rig = Rig::new();
    rig.pins.script(PinId(1), &[100.0, 200.0, 300.0]);
    rig.pins.script(PinId(2), &[1.0, 0.0]);
    let temp = Sensor::analog(PinId(1), &rig.platform).unwrap();
    temp.set_norm_func(|raw, _| raw / 100.0);
    let lid = DigitalSensor::new(PinId(2), &rig.platform).unwrap();

    let plan = PoolPlan::from_json(
        r#"{"entries":[{"period_ms":500,"window":3,"kind":"Normalized"},{"period_ms":250}]}"#,
    )
    .unwrap();
    let pool = SensorPool::new(&[&temp, lid.as_sensor()], &rig.platform).unwrap();
    pool.start_with_plan(&plan).unwrap();

    rig.advance(1500);
    assert_eq!(temp.current_sample(), Some(3.0));
    assert_eq!(temp.average(), Some(2.0));
    assert_eq!(temp.state().observation_window(), Some(3));
    assert_eq!(lid.current_sample(), Some(0.0));
    assert_eq!(lid.average(), None, "no window: evaluation skipped");
    assert!(lid.flags().skip_eval);
}

#[test]
fn stop_detaches_and_resets_members() {
    let rig = Rig::new();
    let (a, ta) = timed(&rig, 1);
    let pool = SensorPool::new(&[&a], &rig.platform).unwrap();
    pool.start_sampling(&[100], &[Some(2)], &[AcquisitionKind::Raw])
        .unwrap();
    assert!(a.is_pool_managed());
    rig.advance(300);

    pool.stop_sampling();
    assert!(!pool.is_sampling());
    assert!(!a.is_pool_managed());
    assert_eq!(a.current_sample(), None);
    assert_eq!(rig.sim.clock.armed(), 0);

    rig.advance(1000);
    assert_eq!(ta.lock().unwrap().len(), 3);

    // Released members may sample on their own again.
    a.start_sampling(SamplingPeriod::millis(100), None, AcquisitionKind::Raw)
        .unwrap();
}

#[test]
fn members_cannot_also_sample_on_their_own() {
    let rig = Rig::new();
    let (a, _) = timed(&rig, 1);
    let (b, _) = timed(&rig, 2);
    b.start_sampling(SamplingPeriod::millis(100), None, AcquisitionKind::Raw)
        .unwrap();

    let pool = SensorPool::new(&[&a, &b], &rig.platform).unwrap();
    assert_eq!(
        pool.start_sampling(&[100, 100], &[None, None], &[AcquisitionKind::Raw; 2]),
        Err(Error::Config(ConfigError::SamplingConflict))
    );
    assert!(!a.is_pool_managed(), "partial attach is rolled back");

    b.stop_sampling();
    pool.start_sampling(&[100, 100], &[None, None], &[AcquisitionKind::Raw; 2])
        .unwrap();
    assert_eq!(
        a.start_sampling(SamplingPeriod::millis(10), None, AcquisitionKind::Raw).err(),
        Some(Error::Config(ConfigError::PoolManaged))
    );
}

#[test]
fn malformed_requests_are_rejected() {
    let rig = Rig::new();
    let (a, _) = timed(&rig, 1);
    assert_eq!(
        SensorPool::new(&[], &rig.platform).err(),
        Some(ConfigError::EmptyPool)
    );
    let pool = SensorPool::new(&[&a], &rig.platform).unwrap();
    assert_eq!(
        pool.start_sampling(&[100, 200], &[None], &[AcquisitionKind::Raw]),
        Err(Error::Config(ConfigError::MismatchedPoolArrays))
    );
    assert_eq!(
        pool.start_sampling(&[0], &[None], &[AcquisitionKind::Raw]),
        Err(Error::Config(ConfigError::InvalidPeriod))
    );
    assert_eq!(PoolPlan::from_json("{"), Err(ConfigError::InvalidDocument));
    assert!(!pool.is_sampling());
}

#[test]
fn dropping_the_pool_stops_it() {
    let rig = Rig::new();
    let (a, ta) = timed(&rig, 1);
    {
        let pool = SensorPool::new(&[&a], &rig.platform).unwrap();
        pool.start_sampling(&[100], &[None], &[AcquisitionKind::Raw]).unwrap();
        rig.advance(200);
    }
    rig.advance(1000);
    assert_eq!(ta.lock().unwrap().len(), 2);
    assert!(!a.is_pool_managed());
}

#[test]
fn failing_member_is_skipped_and_the_rest_keep_ticking() {
    let sim = SimPlatform::new();
    sim.pins.set_level(PinId(1), 2.0);
    sim.pins.set_level(PinId(2), 3.0);
    let a = Sensor::analog(PinId(1), &sim.platform()).unwrap();
    let b = Sensor::analog(PinId(2), &sim.platform()).unwrap();
    let seen = Arc::new(Mutex::new(0u32));
    let s = Arc::clone(&seen);
    b.do_every_sample(move |_| *s.lock().unwrap() += 1);

    sim.pins.fail_reads(PinId(1), Some(-3));
    let pool = SensorPool::new(&[&a, &b], &sim.platform()).unwrap();
    pool.start_sampling(&[100, 100], &[None, None], &[AcquisitionKind::Raw; 2])
        .unwrap();

    sim.clock.advance(500);
    assert_eq!(*seen.lock().unwrap(), 5);
    assert_eq!(a.current_sample(), None);
    assert!(pool.is_sampling());

    sim.pins.fail_reads(PinId(1), None);
    sim.clock.advance(100);
    assert_eq!(a.current_sample(), Some(2.0));
    assert_eq!(*seen.lock().unwrap(), 6);
}

#[test]
fn timer_failure_halts_and_releases_the_pool() {
    let sim = SimPlatform::new();
    let a = Sensor::analog(PinId(1), &sim.platform()).unwrap();
    let seen = Arc::new(Mutex::new(0u32));
    let s = Arc::clone(&seen);
    a.do_every_sample(move |_| *s.lock().unwrap() += 1);

    let pool = SensorPool::new(&[&a], &sim.platform()).unwrap();
    pool.start_sampling(&[100], &[Some(2)], &[AcquisitionKind::Raw])
        .unwrap();

    sim.clock.fail_arms(true);
    sim.clock.advance(100);
    assert_eq!(*seen.lock().unwrap(), 1, "the in-flight tick still samples");
    assert!(!pool.is_sampling());
    assert!(!a.is_pool_managed());
    assert_eq!(sim.clock.armed(), 0);

    sim.clock.fail_arms(false);
    sim.clock.advance(1000);
    assert_eq!(*seen.lock().unwrap(), 1);

    pool.start_sampling(&[100], &[None], &[AcquisitionKind::Raw]).unwrap();
    sim.clock.advance(100);
    assert_eq!(*seen.lock().unwrap(), 2);
}

#[test]
fn start_is_refused_when_no_timer_can_be_armed() {
    let sim = SimPlatform::new();
    let a = Sensor::analog(PinId(1), &sim.platform()).unwrap();
    let pool = SensorPool::new(&[&a], &sim.platform()).unwrap();
    sim.clock.fail_arms(true);
    assert_eq!(
        pool.start_sampling(&[100], &[None], &[AcquisitionKind::Raw]),
        Err(Error::Hw(HwError::TimerUnavailable))
    );
    assert!(!pool.is_sampling());
    assert!(!a.is_pool_managed());
}
