#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = microdoser_config::load_toml(data) {
        if cfg.validate().is_ok() {
            for p in &cfg.pumps {
                assert!(!p.schedule.is_empty());
                assert!(p.schedule.iter().all(|s| s.hour <= 23 && s.minute <= 59));
                assert!(cfg.pump(&p.id).is_some());
            }
        }
    }
    let _ = microdoser_config::parse_hh_mm(data);
});
