//! Derived sensors: one sensor sampling another sensor's average or
//! derivative instead of a pin.

use smartsensors::{AcquireError, AcquisitionKind, ConfigError, Field, PinId, SamplingPeriod, Sensor, Source};

use super::mock_hw::Rig;

const PIN: PinId = PinId(4);

#[test]
fn derived_average_waits_for_the_source_window() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[10.0, 30.0, 50.0, 70.0]);
    let base = Sensor::analog(PIN, &rig.platform).unwrap();
    base.start_sampling(SamplingPeriod::millis(100), Some(2), AcquisitionKind::Raw)
        .unwrap();

    let avg = Sensor::derived(&base, Field::Average, &rig.platform);
    avg.start_sampling(SamplingPeriod::millis(100), Some(2), AcquisitionKind::Raw)
        .unwrap();

    // Base is armed first, so it fires first in every tick.
    rig.advance(100);
    assert_eq!(avg.current_sample(), None, "no upstream average yet");
    rig.advance(100);
    assert_eq!(avg.current_sample(), Some(20.0));
    rig.advance(200);
    assert_eq!(avg.previous_sample(), Some(40.0));
    assert_eq!(avg.current_sample(), Some(60.0));
    assert_eq!(avg.average(), Some(50.0));
}

#[test]
fn derived_derivative_tracks_the_source_slope() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[0.0, 2.0, 6.0]);
    let base = Sensor::analog(PIN, &rig.platform).unwrap();
    base.set_sampling_period(Some(SamplingPeriod::millis(1000)))
        .set_observation_window(4)
        .unwrap();
    let slope = Sensor::derived(&base, Field::Derivative, &rig.platform);

    base.get_raw().unwrap();
    assert_eq!(slope.get_raw(), Ok(None));
    base.get_raw().unwrap();
    assert_eq!(slope.get_raw(), Ok(Some(2.0)));
    base.get_raw().unwrap();
    assert_eq!(slope.get_raw(), Ok(Some(4.0)));
}

#[test]
fn derived_sensor_runs_its_own_hooks() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[8.0, 8.0]);
    let base = Sensor::analog(PIN, &rig.platform).unwrap();
    base.set_observation_window(2).unwrap();
    let avg = Sensor::derived(&base, Field::Average, &rig.platform);
    avg.set_norm_func(|v, _| v / 2.0);

    base.get_raw().unwrap();
    base.get_raw().unwrap();
    assert_eq!(avg.get_normalized(), Ok(Some(4.0)));
}

#[test]
fn released_source_is_reported() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0]);
    let base = Sensor::analog(PIN, &rig.platform).unwrap();
    let avg = Sensor::derived(&base, Field::Average, &rig.platform);
    drop(base);
    assert_eq!(avg.get_raw(), Err(AcquireError::SourceReleased));
}

#[test]
fn cycles_are_refused() {
    let rig = Rig::new();
    rig.pins.script(PIN, &[1.0]);
    let a = Sensor::analog(PIN, &rig.platform).unwrap();
    let b = Sensor::derived(&a, Field::Average, &rig.platform);
    let c = Sensor::derived(&b, Field::Derivative, &rig.platform);

    assert_eq!(
        a.rebind_source(Source::derived(&c, Field::Average)).err(),
        Some(ConfigError::SourceCycle)
    );
    assert_eq!(
        a.rebind_source(Source::derived(&a, Field::Average)).err(),
        Some(ConfigError::SourceCycle)
    );
    // `a` still reads its pin.
    assert!(matches!(a.source(), Source::Pin(PIN)));
}
