use microdoser_config::{Backend, load_file, load_toml};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

const VALID: &str = r#"
[runtime]
check_interval_s = 30
store_path = "prefs.json"

[hardware]
backend = "sim"

[[pump]]
id = "pump_a"
index = 0
calibration_ml_per_sec = 1.5
daily_dose_ml = 30.0
max_late_minutes = 15
schedule = [{ hour = 8, minute = 0 }, [12, 30], "20:05"]

[[pump]]
id = "pump_b"
index = 1
daily_dose_ml = 5.0
enabled = false
schedule = ["07:00"]
"#;

#[test]
fn accepts_mixed_schedule_forms() {
    let cfg = load_toml(VALID).expect("parse TOML");
    cfg.validate().expect("valid config should pass");

    let a = cfg.pump("pump_a").expect("pump_a");
    let times: Vec<(u8, u8)> = a.schedule.iter().map(|s| (s.hour, s.minute)).collect();
    assert_eq!(times, vec![(8, 0), (12, 30), (20, 5)]);
    assert_eq!(a.max_late_minutes, 15);

    let b = cfg.pump("pump_b").expect("pump_b");
    assert_eq!(b.calibration_ml_per_sec, 1.0, "default calibration");
    assert_eq!(b.enabled, Some(false));
    assert_eq!(cfg.hardware.backend, Backend::Sim);
}

#[rstest]
#[case("schedule = []", "at least one entry")]
#[case("schedule = [[24, 0]]", "hour 24")]
#[case("schedule = [[8, 60]]", "minute 60")]
#[case("schedule = [[8, 0]]\ncalibration_ml_per_sec = 0.0", "calibration_ml_per_sec must be > 0")]
#[case("schedule = [[8, 0]]\nmax_late_minutes = 1440", "max_late_minutes")]
fn rejects_bad_pump_fields(#[case] extra: &str, #[case] needle: &str) {
    let toml = format!(
        r#"
[[pump]]
id = "p"
daily_dose_ml = 10.0
{extra}
"#
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error '{err}' should mention '{needle}'"
    );
}

#[test]
fn rejects_duplicate_ids() {
    let toml = r#"
[[pump]]
id = "p"
daily_dose_ml = 1.0
schedule = ["08:00"]

[[pump]]
id = "p"
daily_dose_ml = 1.0
schedule = ["09:00"]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("duplicate ids");
    assert!(format!("{err}").contains("more than once"));
}

#[test]
fn rejects_missing_pumps_and_bad_interval() {
    let cfg = load_toml("").expect("parse TOML");
    assert!(cfg.validate().is_err());

    let cfg = load_toml(
        r#"
[runtime]
check_interval_s = 0

[[pump]]
id = "p"
daily_dose_ml = 1.0
schedule = ["08:00"]
"#,
    )
    .expect("parse TOML");
    let err = cfg.validate().expect_err("zero interval");
    assert!(format!("{err}").contains("check_interval_s"));
}

#[test]
fn pcf8574_backend_requires_expander_pins() {
    let toml = r#"
[hardware]
backend = "pcf8574"

[[pump]]
id = "p"
daily_dose_ml = 1.0
i2c_pin = 9
schedule = ["08:00"]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("pin out of range");
    assert!(format!("{err}").contains("0..=7"));
}

#[test]
fn hub_selection_must_exist() {
    let toml = r#"
[hub]
selected = "ghost"

[[pump]]
id = "p"
daily_dose_ml = 1.0
schedule = ["08:00"]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn malformed_clock_string_fails_to_parse() {
    let toml = r#"
[[pump]]
id = "p"
daily_dose_ml = 1.0
schedule = ["eight"]
"#;
    assert!(load_toml(toml).is_err());
}

#[test]
fn load_file_parses_and_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, VALID).unwrap();
    let cfg = load_file(&path).expect("load");
    assert_eq!(cfg.pumps.len(), 2);

    let missing = dir.path().join("nope.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}
