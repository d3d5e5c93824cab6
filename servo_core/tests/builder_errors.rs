use rstest::rstest;
use servo_core::error::BuildError;
use servo_core::mocks::{NoopSensor, RecordingPins, RecordingServos};
use servo_core::{FeedbackProfile, LoopCfg, PidGains, PowerCfg, ServoBank, Timeouts};

fn profile(channel: u8) -> FeedbackProfile {
    FeedbackProfile {
        channel,
        sensor_channel: 0,
        deg_per_unit: 1.0,
        inverted: false,
        gains: PidGains::default(),
    }
}

#[rstest]
fn builder_missing_pins_yields_typed_build_error() {
    let err = ServoBank::builder()
        .with_servos(RecordingServos::new())
        .with_sensor(NoopSensor)
        // missing with_pins()
        .try_build()
        .expect_err("should fail with MissingPins");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingPins) => {}
        other => panic!("expected MissingPins, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_servos_yields_typed_build_error() {
    let err = ServoBank::builder()
        .with_sensor(NoopSensor)
        .with_pins(RecordingPins::new())
        .try_build()
        .expect_err("should fail with MissingServos");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingServos)
    ));
}

fn expect_invalid(
    b: servo_core::builder::ServoBankBuilder<
        servo_core::builder::Set,
        servo_core::builder::Set,
        servo_core::builder::Set,
    >,
    needle: &str,
) {
    let err = b.build().expect_err("config should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

fn base() -> servo_core::builder::ServoBankBuilder<
    servo_core::builder::Set,
    servo_core::builder::Set,
    servo_core::builder::Set,
> {
    ServoBank::builder()
        .with_servos(RecordingServos::new())
        .with_sensor(NoopSensor)
        .with_pins(RecordingPins::new())
}

#[test]
fn zero_tick_is_rejected() {
    expect_invalid(
        base().with_loop(LoopCfg {
            tick_ms: 0,
            ..LoopCfg::default()
        }),
        "tick_ms",
    );
}

#[rstest]
#[case(0)]
#[case(65)]
fn capacity_out_of_bounds_is_rejected(#[case] max_actuators: usize) {
    expect_invalid(
        base().with_loop(LoopCfg {
            max_actuators,
            ..LoopCfg::default()
        }),
        "max_actuators",
    );
}

#[test]
fn duplicate_rail_is_rejected() {
    expect_invalid(
        base().with_power(PowerCfg {
            settle_ms: 50,
            groups: vec![(40, "a".into()), (40, "b".into())],
        }),
        "duplicate power rail",
    );
}

#[test]
fn zero_sensor_timeout_is_rejected() {
    expect_invalid(base().with_timeouts(Timeouts { sensor_ms: 0 }), "sensor_ms");
}

#[test]
fn feedback_profiles_are_checked() {
    expect_invalid(
        base().with_feedback_servos([profile(3), profile(3)]),
        "duplicate feedback channel",
    );
    expect_invalid(base().with_feedback_servo(profile(70)), "exceeds 63");
    expect_invalid(
        base().with_feedback_servo(FeedbackProfile {
            deg_per_unit: 0.0,
            ..profile(1)
        }),
        "deg_per_unit",
    );
    expect_invalid(
        base().with_feedback_servo(FeedbackProfile {
            gains: PidGains {
                kp: f32::NAN,
                ..PidGains::default()
            },
            ..profile(1)
        }),
        "gains",
    );
}

#[test]
fn valid_build_registers_feedback_joints() {
    let bank = base()
        .with_feedback_servos([profile(2), profile(7)])
        .build()
        .unwrap();
    assert_eq!(bank.actuators().len(), 2);
    assert!(bank.actuators().iter().all(|a| a.is_feedback() && !a.is_assigned()));
}
