use std::rc::Rc;
use std::time::Duration;

use microdoser_core::calibration::{REFERENCE_VOLUME_ML, rescale_rate};
use microdoser_core::keys;
use microdoser_core::mocks::{FixedWallClock, MemoryStore, SpyActuator};
use microdoser_core::{DoserError, PumpController};
use microdoser_traits::{PreferenceStore, WallClock};
use microdoser_traits::clock::test_clock::TestClock;
use proptest::prelude::*;
use rstest::rstest;

fn pump_with(
    store: Rc<MemoryStore>,
    wall: Rc<FixedWallClock>,
    clock: TestClock,
) -> PumpController {
    PumpController::builder("pump_a")
        .with_calibration(1.0)
        .with_daily_dose_ml(30.0)
        .add_schedule(8, 0)
        .with_actuator(SpyActuator::new())
        .with_wall_clock(wall)
        .with_store(store)
        .with_clock(Box::new(clock))
        .build()
        .unwrap()
}

#[test]
fn first_boot_seeds_calibration_slot() {
    let store = Rc::new(MemoryStore::new());
    let pump = pump_with(
        store.clone(),
        Rc::new(FixedWallClock::at(7, 0, 1)),
        TestClock::new(),
    );
    assert_eq!(pump.calibration(), 1.0);
    assert_eq!(store.load_f32(keys::calibration_key("pump_a")), Some(1.0));
    assert_eq!(pump.last_calibration_time(), None);
}

#[test]
fn stored_calibration_wins_over_configured_default() {
    let store = Rc::new(MemoryStore::new());
    store
        .save_f32(keys::calibration_key("pump_a"), 0.8)
        .unwrap();
    let pump = pump_with(
        store,
        Rc::new(FixedWallClock::at(7, 0, 1)),
        TestClock::new(),
    );
    assert_eq!(pump.calibration(), 0.8);
}

#[rstest]
#[case(f32::NAN)]
#[case(0.0)]
#[case(-2.0)]
fn unusable_stored_calibration_is_reset(#[case] bad: f32) {
    let store = Rc::new(MemoryStore::new());
    store
        .save_f32(keys::calibration_key("pump_a"), bad)
        .unwrap();
    let pump = pump_with(
        store.clone(),
        Rc::new(FixedWallClock::at(7, 0, 1)),
        TestClock::new(),
    );
    assert_eq!(pump.calibration(), 1.0);
    assert_eq!(store.load_f32(keys::calibration_key("pump_a")), Some(1.0));
}

#[test]
fn full_workflow_updates_rate_and_timestamp() {
    let store = Rc::new(MemoryStore::new());
    let wall = Rc::new(FixedWallClock::at(9, 30, 100));
    let clock = TestClock::new();
    let mut pump = pump_with(store.clone(), wall.clone(), clock.clone());

    assert_eq!(pump.run_calibration_dose().unwrap(), Duration::from_secs(10));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);

    let rate = pump.apply_measured_result(8.0).unwrap();
    assert!((rate - 1.25).abs() < 1e-6);
    assert_eq!(pump.calibration(), rate);
    assert_eq!(
        store.load_f32(keys::calibration_key("pump_a")),
        Some(rate)
    );

    let stamp = wall.now().unwrap().timestamp;
    assert_eq!(pump.last_calibration_time(), Some(stamp));
    assert_eq!(
        store.load(keys::calibration_time_key("pump_a")),
        Some(stamp)
    );

    // the next scheduled dose uses the new rate: 30 mL / 1.25 mL/s
    assert_eq!(pump.dose_duration(), Duration::from_secs(24));
}

#[test]
fn calibration_survives_restart() {
    let store = Rc::new(MemoryStore::new());
    let wall = Rc::new(FixedWallClock::at(9, 30, 100));
    {
        let mut pump = pump_with(store.clone(), wall.clone(), TestClock::new());
        pump.apply_measured_result(12.5).unwrap();
    }
    let pump = pump_with(store, wall, TestClock::new());
    assert!((pump.calibration() - 0.8).abs() < 1e-6);
    assert!(pump.last_calibration_time().is_some());
}

#[rstest]
#[case(0.1)]
#[case(0.05)]
#[case(0.0)]
#[case(-3.0)]
#[case(f32::INFINITY)]
fn tiny_or_bogus_measurement_changes_nothing(#[case] measured: f32) {
    let store = Rc::new(MemoryStore::new());
    let mut pump = pump_with(
        store.clone(),
        Rc::new(FixedWallClock::at(9, 30, 100)),
        TestClock::new(),
    );
    let writes = store.writes();
    assert!(matches!(
        pump.apply_measured_result(measured),
        Err(DoserError::InvalidMeasurement(_))
    ));
    assert_eq!(pump.calibration(), 1.0);
    assert_eq!(store.writes(), writes);
    assert_eq!(pump.last_calibration_time(), None);
}

#[rstest]
#[case(1.0, f32::MAX)]
#[case(1e-37, f32::MAX)]
#[case(1e37, 0.11)]
#[case(2.0, 1e6)]
fn measurement_that_would_degenerate_the_rate_changes_nothing(
    #[case] rate: f32,
    #[case] measured: f32,
) {
    let store = Rc::new(MemoryStore::new());
    let mut pump = PumpController::builder("pump_a")
        .with_calibration(rate)
        .with_daily_dose_ml(30.0)
        .add_schedule(8, 0)
        .with_actuator(SpyActuator::new())
        .with_wall_clock(Rc::new(FixedWallClock::at(9, 30, 100)))
        .with_store(store.clone())
        .with_clock(Box::new(TestClock::new()))
        .build()
        .unwrap();
    let writes = store.writes();
    assert_eq!(
        pump.apply_measured_result(measured),
        Err(DoserError::InvalidMeasurement(measured))
    );
    assert_eq!(pump.calibration(), rate);
    assert_eq!(store.writes(), writes);
    assert_eq!(pump.last_calibration_time(), None);
}

#[test]
fn repeated_huge_measurements_keep_dosing_possible() {
    let store = Rc::new(MemoryStore::new());
    let mut pump = pump_with(
        store,
        Rc::new(FixedWallClock::at(9, 30, 100)),
        TestClock::new(),
    );
    for _ in 0..2 {
        assert!(pump.apply_measured_result(f32::MAX).is_err());
    }
    assert_eq!(pump.calibration(), 1.0);
    assert_eq!(pump.dose_duration(), Duration::from_secs(30));
}

#[test]
fn rate_is_saved_even_when_clock_is_unsynced() {
    let store = Rc::new(MemoryStore::new());
    let wall = Rc::new(FixedWallClock::unsynced());
    let mut pump = pump_with(store.clone(), wall, TestClock::new());
    let rate = pump.apply_measured_result(5.0).unwrap();
    assert!((rate - 2.0).abs() < 1e-6);
    assert_eq!(store.load_f32(keys::calibration_key("pump_a")), Some(rate));
    assert_eq!(store.load(keys::calibration_time_key("pump_a")), None);
    assert_eq!(pump.last_calibration_time(), None);
}

#[test]
fn calibration_dose_without_output_errors() {
    let store = Rc::new(MemoryStore::new());
    let mut pump = PumpController::builder("pump_a")
        .with_daily_dose_ml(10.0)
        .add_schedule(8, 0)
        .with_store(store)
        .build()
        .unwrap();
    assert_eq!(
        pump.run_calibration_dose(),
        Err(DoserError::NoActuator("pump_a".into()))
    );
}

proptest! {
    #[test]
    fn rescale_matches_reference_ratio(rate in 0.01f32..50.0, measured in 0.11f32..100.0) {
        let new_rate = rescale_rate(rate, measured).unwrap();
        let expected = REFERENCE_VOLUME_ML / measured * rate;
        prop_assert!((new_rate - expected).abs() <= expected * 1e-5);
        prop_assert!(new_rate.is_finite() && new_rate > 0.0);
    }

    #[test]
    fn under_delivery_raises_rate(rate in 0.01f32..50.0, measured in 0.11f32..9.99) {
        prop_assert!(rescale_rate(rate, measured).unwrap() > rate);
    }

    #[test]
    fn at_or_below_threshold_is_rejected(measured in -100.0f32..=0.1) {
        prop_assert!(rescale_rate(1.0, measured).is_err());
    }
}
