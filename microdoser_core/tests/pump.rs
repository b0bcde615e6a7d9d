use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use microdoser_core::keys;
use microdoser_core::mocks::{FixedWallClock, MemoryStore, SpyActuator};
use microdoser_core::{
    CheckStatus, DoserError, PumpBuilder, PumpController, SkipReason, SlotOutcome,
};
use microdoser_traits::{PreferenceStore, WallTime};
use microdoser_traits::clock::test_clock::TestClock;
use rstest::rstest;

struct Rig {
    store: Rc<MemoryStore>,
    wall: Rc<FixedWallClock>,
    spy: SpyActuator,
    clock: TestClock,
}

impl Rig {
    fn new(h: u8, m: u8, doy: u16) -> Self {
        Self {
            store: Rc::new(MemoryStore::new()),
            wall: Rc::new(FixedWallClock::at(h, m, doy)),
            spy: SpyActuator::new(),
            clock: TestClock::new(),
        }
    }

    /// Pump "pump_a": 30 mL/day over 08:00, 14:00, 20:00 at 1 mL/s.
    fn builder(&self) -> PumpBuilder {
        PumpController::builder("pump_a")
            .with_calibration(1.0)
            .with_daily_dose_ml(30.0)
            .add_schedule(8, 0)
            .add_schedule(14, 0)
            .add_schedule(20, 0)
            .with_max_late_minutes(15)
            .with_actuator(self.spy.clone())
            .with_wall_clock(self.wall.clone())
            .with_store(self.store.clone())
            .with_clock(Box::new(self.clock.clone()))
    }

    fn pump(&self) -> PumpController {
        self.builder().build().unwrap()
    }
}

fn slots(status: &CheckStatus) -> &[SlotOutcome] {
    match status {
        CheckStatus::Checked(s) => s,
        other => panic!("expected Checked, got {other:?}"),
    }
}

#[test]
fn on_time_entry_doses_split_volume() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    assert!((pump.per_dose_ml() - 10.0).abs() < 1e-6);

    let status = pump.check_schedule();
    let s = slots(&status);
    assert_eq!(
        s[0],
        SlotOutcome::Dosed {
            duration: Duration::from_secs(10)
        }
    );
    assert_eq!(s[1], SlotOutcome::Pending);
    assert_eq!(s[2], SlotOutcome::Pending);
    assert_eq!(status.doses(), 1);

    assert_eq!(rig.clock.sleeps(), vec![Duration::from_secs(10)]);
    assert_eq!(rig.spy.starts(), 1);
    assert_eq!(rig.spy.stops(), 1);
    assert!(!rig.spy.is_on());
    assert!(pump.schedule()[0].dosed_today);

    let key = keys::dose_key("pump_a", 8, 0, 42);
    assert_eq!(rig.store.load(key), Some(keys::dosed_marker(&WallTime::new(8, 0, 42))));
}

#[test]
fn repeated_checks_in_the_same_minute_dose_once() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    for _ in 0..3 {
        pump.check_schedule();
    }
    assert_eq!(rig.spy.starts(), 1);
    let second = pump.check_schedule();
    assert_eq!(slots(&second)[0], SlotOutcome::AlreadyDosed);
}

#[test]
fn next_day_doses_again() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    pump.check_schedule();
    rig.wall.set(8, 0, 43);
    let status = pump.check_schedule();
    assert_eq!(status.doses(), 1);
    assert_eq!(rig.spy.starts(), 2);
}

/// `hour:minute` on `day_of_year`, `years` calendar years of 365 days later.
fn years_later(hour: u8, minute: u8, day_of_year: u16, years: u32) -> WallTime {
    let base = WallTime::new(hour, minute, day_of_year);
    WallTime {
        timestamp: base.timestamp + years * 365 * 86_400,
        ..base
    }
}

#[test]
fn same_date_next_year_doses_again() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    assert_eq!(pump.check_schedule().doses(), 1);

    // the dose key for day 42 is looked up again a year on
    rig.wall.set_time(years_later(8, 0, 42, 1));
    let status = pump.check_schedule();
    assert_eq!(
        slots(&status)[0],
        SlotOutcome::Dosed {
            duration: Duration::from_secs(10)
        }
    );
    assert_eq!(rig.spy.starts(), 2);

    let again = pump.check_schedule();
    assert_eq!(slots(&again)[0], SlotOutcome::AlreadyDosed);
    assert_eq!(rig.spy.starts(), 2);
}

#[test]
fn restart_does_not_repeat_a_dose() {
    let rig = Rig::new(8, 0, 42);
    {
        let mut pump = rig.pump();
        pump.check_schedule();
    }
    // fresh controller over the same store
    let mut pump = rig.pump();
    assert!(!pump.schedule()[0].dosed_today);
    let status = pump.check_schedule();
    assert_eq!(slots(&status)[0], SlotOutcome::AlreadyDosed);
    assert_eq!(rig.spy.starts(), 1);
}

#[test]
fn legacy_marker_counts_as_dosed() {
    let rig = Rig::new(8, 0, 42);
    rig.store
        .save(keys::dose_key("pump_a", 8, 0, 42), 1)
        .unwrap();
    let mut pump = rig.pump();
    let status = pump.check_schedule();
    assert_eq!(slots(&status)[0], SlotOutcome::AlreadyDosed);
    assert_eq!(rig.spy.starts(), 0);
    // the undated record is rewritten with today's day
    assert_eq!(
        rig.store.load(keys::dose_key("pump_a", 8, 0, 42)),
        Some(keys::dosed_marker(&WallTime::new(8, 0, 42)))
    );
}

#[test]
fn legacy_marker_expires_after_a_year() {
    let rig = Rig::new(8, 0, 42);
    rig.store
        .save(keys::dose_key("pump_a", 8, 0, 42), keys::LEGACY_DOSED)
        .unwrap();
    let mut pump = rig.pump();
    pump.check_schedule();
    assert_eq!(rig.spy.starts(), 0);

    rig.wall.set_time(years_later(8, 0, 42, 1));
    assert_eq!(pump.check_schedule().doses(), 1);
    assert_eq!(rig.spy.starts(), 1);
}

#[rstest]
#[case(8, 10, SlotOutcome::Recovered { late_min: 10, duration: Duration::from_secs(10) })]
#[case(8, 15, SlotOutcome::Recovered { late_min: 15, duration: Duration::from_secs(10) })]
#[case(8, 20, SlotOutcome::Missed { late_min: 20 })]
fn late_entries_recover_inside_window(
    #[case] h: u8,
    #[case] m: u8,
    #[case] expected: SlotOutcome,
) {
    let rig = Rig::new(h, m, 42);
    let mut pump = rig.pump();
    let status = pump.check_schedule();
    assert_eq!(slots(&status)[0], expected);
    assert_eq!(rig.spy.starts(), usize::from(expected.dosed()));
}

#[test]
fn missed_entry_is_not_recorded() {
    let rig = Rig::new(8, 20, 42);
    let mut pump = rig.pump();
    pump.check_schedule();
    assert_eq!(rig.store.load(keys::dose_key("pump_a", 8, 0, 42)), None);
    assert!(!pump.schedule()[0].dosed_today);
}

#[test]
fn zero_window_only_doses_on_the_minute() {
    let rig = Rig::new(8, 1, 42);
    let mut pump = rig.builder().with_max_late_minutes(0).build().unwrap();
    let status = pump.check_schedule();
    assert_eq!(slots(&status)[0], SlotOutcome::Pending);
    rig.wall.set(14, 0, 42);
    assert_eq!(pump.check_schedule().doses(), 1);
}

#[test]
fn unsynced_clock_skips_everything() {
    let rig = Rig::new(8, 0, 42);
    rig.wall.invalidate();
    let mut pump = rig.pump();
    let writes = rig.store.writes();
    assert_eq!(
        pump.check_schedule(),
        CheckStatus::Skipped(SkipReason::ClockInvalid)
    );
    assert_eq!(rig.spy.starts(), 0);
    assert_eq!(rig.store.writes(), writes);
}

#[test]
fn missing_wall_clock_is_treated_as_unsynced() {
    let store = Rc::new(MemoryStore::new());
    let mut pump = PumpController::builder("pump_b")
        .with_daily_dose_ml(5.0)
        .add_schedule(8, 0)
        .with_store(store)
        .build()
        .unwrap();
    assert_eq!(
        pump.check_schedule(),
        CheckStatus::Skipped(SkipReason::ClockInvalid)
    );
}

#[test]
fn disabled_pump_skips_and_resumes() {
    let rig = Rig::new(8, 0, 42);
    let switch = Rc::new(Cell::new(false));
    let mut pump = rig
        .builder()
        .with_enable_switch(switch.clone())
        .build()
        .unwrap();
    assert_eq!(
        pump.check_schedule(),
        CheckStatus::Skipped(SkipReason::Disabled)
    );
    switch.set(true);
    assert_eq!(pump.check_schedule().doses(), 1);
}

#[test]
fn missing_actuator_fails_without_recording() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.builder().with_boxed_actuator(None).build().unwrap();
    let status = pump.check_schedule();
    assert_eq!(
        slots(&status)[0],
        SlotOutcome::Failed(DoserError::NoActuator("pump_a".into()))
    );
    assert_eq!(rig.store.load(keys::dose_key("pump_a", 8, 0, 42)), None);
    assert!(rig.clock.sleeps().is_empty());
}

struct FailingOn;

impl microdoser_traits::Actuator for FailingOn {
    fn turn_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("relay stuck".into())
    }
    fn turn_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

struct FailingOff;

impl microdoser_traits::Actuator for FailingOff {
    fn turn_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn turn_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("relay welded".into())
    }
}

#[test]
fn output_that_never_started_is_retried_next_check() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.builder().with_actuator(FailingOn).build().unwrap();
    let status = pump.check_schedule();
    assert!(matches!(slots(&status)[0], SlotOutcome::Failed(_)));
    assert!(!pump.schedule()[0].dosed_today);
    assert!(rig.clock.sleeps().is_empty());
}

#[test]
fn output_that_ran_is_recorded_even_if_stop_fails() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.builder().with_actuator(FailingOff).build().unwrap();
    let status = pump.check_schedule();
    assert!(matches!(
        slots(&status)[0],
        SlotOutcome::Failed(DoserError::Hardware(_))
    ));
    assert!(pump.schedule()[0].dosed_today);
    assert_eq!(
        rig.store.load(keys::dose_key("pump_a", 8, 0, 42)),
        Some(keys::dosed_marker(&WallTime::new(8, 0, 42)))
    );
}

#[test]
fn prime_runs_ten_seconds_without_touching_records() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    let writes = rig.store.writes();
    assert_eq!(pump.prime().unwrap(), Duration::from_secs(10));
    assert_eq!(rig.clock.sleeps(), vec![Duration::from_secs(10)]);
    assert_eq!(rig.store.writes(), writes);
    // the scheduled entry is still due
    assert_eq!(pump.check_schedule().doses(), 1);
}

#[test]
fn prime_without_actuator_errors() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.builder().with_boxed_actuator(None).build().unwrap();
    assert_eq!(
        pump.prime(),
        Err(DoserError::NoActuator("pump_a".into()))
    );
}

#[test]
fn dose_now_does_not_record() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.pump();
    assert_eq!(pump.dose_now().unwrap(), Duration::from_secs(10));
    assert_eq!(rig.store.load(keys::dose_key("pump_a", 8, 0, 42)), None);
}

#[test]
fn dose_duration_follows_calibration() {
    let rig = Rig::new(14, 0, 42);
    let mut pump = rig.builder().with_calibration(2.0).build().unwrap();
    pump.check_schedule();
    assert_eq!(rig.clock.sleeps(), vec![Duration::from_secs(5)]);
}

#[test]
fn zero_daily_dose_pulses_for_zero_time() {
    let rig = Rig::new(8, 0, 42);
    let mut pump = rig.builder().with_daily_dose_ml(0.0).build().unwrap();
    let status = pump.check_schedule();
    assert_eq!(
        slots(&status)[0],
        SlotOutcome::Dosed {
            duration: Duration::ZERO
        }
    );
}
