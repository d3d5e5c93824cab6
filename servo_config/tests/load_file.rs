use std::io::Write;

use servo_config::load_file;

#[test]
fn load_file_parses_and_validates() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[control]\ntick_ms = 10\n[timeouts]\nsensor_ms = 5").unwrap();
    let cfg = load_file(f.path()).expect("valid file");
    assert_eq!(cfg.control.tick_ms, 10);
}

#[test]
fn load_file_reports_path_on_validation_failure() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[control]\ntick_ms = 0").unwrap();
    let err = load_file(f.path()).expect_err("invalid");
    let chain = format!("{err:#}");
    assert!(chain.contains("invalid config"));
    assert!(chain.contains("tick_ms"));
}

#[test]
fn load_file_missing_path_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_file(&dir.path().join("nope.toml")).expect_err("missing");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/servo_config.toml");
    let cfg = load_file(&path).expect("sample config");
    assert_eq!(cfg.power.groups.len(), 3);
    assert_eq!(cfg.feedback.servos.len(), 2);
    assert!(cfg.feedback.servos[1].inverted);
    assert_eq!(cfg.hardware.servo_pins[0], (5, 17));
}
