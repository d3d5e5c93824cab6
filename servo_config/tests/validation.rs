use rstest::rstest;
use servo_config::load_toml;

const BENCH: &str = r#"
[control]
tick_ms = 20
status_interval_ms = 90

[timeouts]
sensor_ms = 10

[power]
settle_ms = 50
groups = [
    { pin = 40, name = "IN1-leftArm" },
    { pin = 41, name = "IN2-rightArm" },
]

[feedback]
kp = 4.0

[[feedback.servo]]
channel = 5
sensor_channel = 0
deg_per_unit = 1.8

[hardware]
servo_pins = [[5, 17], { channel = 6, gpio = 27 }]
"#;

#[test]
fn empty_config_uses_defaults_and_validates() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should pass");
    assert_eq!(cfg.control.tick_ms, 20);
    assert_eq!(cfg.control.status_interval_ms, 90);
    assert_eq!(cfg.control.max_actuators, 20);
    assert_eq!(cfg.power.settle_ms, 50);
    assert!(cfg.power.active_low);
    assert_eq!(cfg.timeouts.sensor_ms, 10);
    assert!((cfg.feedback.kp - 4.0).abs() < f32::EPSILON);
    assert!((cfg.feedback.lag_factor - 1.05).abs() < f32::EPSILON);
}

#[test]
fn bench_config_parses_both_servo_pin_forms() {
    let cfg = load_toml(BENCH).expect("parse TOML");
    cfg.validate().expect("bench config should pass");
    assert_eq!(cfg.hardware.servo_pins, vec![(5, 17), (6, 27)]);
    assert_eq!(cfg.power.groups.len(), 2);
    assert_eq!(cfg.power.groups[1].name, "IN2-rightArm");
    assert_eq!(cfg.feedback.servos[0].sensor_channel, 0);
    assert!(!cfg.feedback.servos[0].inverted);
}

#[rstest]
#[case("[control]\ntick_ms = 0", "tick_ms must be in [1, 20]")]
#[case("[control]\ntick_ms = 25", "tick_ms must be in [1, 20]")]
#[case("[control]\nmax_actuators = 0", "max_actuators must be in [1, 64]")]
#[case("[timeouts]\nsensor_ms = 0", "sensor_ms must be >= 1")]
#[case("[timeouts]\nsensor_ms = 30", "must not exceed control.tick_ms")]
#[case(
    "[power]\ngroups = [{ pin = 40 }, { pin = 40 }]",
    "duplicate rail pin 40"
)]
#[case("[feedback]\nkp = -1.0", "gains must be finite")]
#[case("[feedback]\nlag_factor = 0.0", "lag_factor must be > 0")]
#[case(
    "[[feedback.servo]]\nchannel = 1\nsensor_channel = 0\ndeg_per_unit = 0.0",
    "deg_per_unit must be > 0"
)]
#[case(
    "[[feedback.servo]]\nchannel = 64\nsensor_channel = 0\ndeg_per_unit = 1.0",
    "exceeds 63"
)]
#[case(
    "[[feedback.servo]]\nchannel = 1\nsensor_channel = 9\ndeg_per_unit = 1.0",
    "sensor_channel must be in [0, 7]"
)]
#[case(
    "[hardware]\npulse_min_us = 2500\npulse_max_us = 500",
    "pulse_min_us must be <"
)]
#[case(
    "[power]\ngroups = [{ pin = 17 }]\n[hardware]\nservo_pins = [[0, 17]]",
    "is a power rail pin"
)]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} should contain {needle:?}");
}

#[test]
fn duplicate_feedback_sensor_channel_rejected() {
    let toml = r#"
[[feedback.servo]]
channel = 1
sensor_channel = 2
deg_per_unit = 1.0

[[feedback.servo]]
channel = 3
sensor_channel = 2
deg_per_unit = 1.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("shared sensor");
    assert!(format!("{err}").contains("sensor_channel 2 used twice"));
}

#[test]
fn unknown_field_types_fail_to_parse() {
    assert!(load_toml("[control]\ntick_ms = \"fast\"").is_err());
}
