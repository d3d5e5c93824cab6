use servo_core::mocks::{RecordingPins, RecordingServos, ServoOp, NoopSensor};
use servo_core::{AssignSpec, Phase, PowerCfg, ServoBank, ServoError};
use servo_traits::clock::test_clock::TestClock;

struct Bench {
    bank: ServoBank,
    servos: RecordingServos,
    pins: RecordingPins,
    clock: TestClock,
}

fn bench() -> Bench {
    let servos = RecordingServos::new();
    let pins = RecordingPins::new();
    let clock = TestClock::new();
    let bank = ServoBank::builder()
        .with_servos(servos.clone())
        .with_sensor(NoopSensor)
        .with_pins(pins.clone())
        .with_power(PowerCfg {
            settle_ms: 50,
            groups: vec![(40, "IN1-leftArm".into()), (41, "IN2-rightArm".into())],
        })
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("bank");
    Bench {
        bank,
        servos,
        pins,
        clock,
    }
}

fn assign(b: &mut Bench, channel: u8, rail: u8, auto_release_ms: u64) {
    b.bank
        .assign(&AssignSpec {
            name: format!("s{channel}"),
            channel,
            min: 0,
            max: 180,
            auto_release_ms,
            inverted: false,
            initial_position: 90,
            rail,
        })
        .unwrap();
}

fn run_ticks(b: &mut Bench, n: usize) {
    for _ in 0..n {
        b.clock.advance_ms(20);
        b.bank.tick();
    }
}

fn switches(b: &Bench, pin: u8, on: bool) -> usize {
    b.pins
        .rail_switches()
        .iter()
        .filter(|&&(p, o)| p == pin && o == on)
        .count()
}

#[test]
fn rails_start_off() {
    let b = bench();
    assert_eq!(b.pins.rail_switches(), vec![(40, false), (41, false)]);
    assert_eq!(b.bank.rail_energized(40), Some(false));
    assert!(b.bank.is_quiescent());
}

#[test]
fn first_move_energizes_settles_and_redrives_group() {
    let mut b = bench();
    assign(&mut b, 1, 40, 0);
    assign(&mut b, 2, 40, 0);
    assign(&mut b, 3, 41, 0);
    b.servos.clear();

    let before = b.clock.elapsed_ms();
    b.bank.move_to(1, 120, 400).unwrap();
    assert_eq!(b.clock.elapsed_ms() - before, 50, "settle delay");
    assert_eq!(switches(&b, 40, true), 1);
    assert_eq!(switches(&b, 41, true), 0);

    // both members on rail 40 re-driven to their last position
    let ops = b.servos.ops();
    assert!(ops.contains(&ServoOp::Write(1, 90)));
    assert!(ops.contains(&ServoOp::Attach(1)));
    assert!(ops.contains(&ServoOp::Write(2, 90)));
    assert!(ops.contains(&ServoOp::Attach(2)));
    assert!(!ops.contains(&ServoOp::Attach(3)));
    assert_eq!(b.bank.actuator(2).unwrap().phase(), Phase::Idle);

    // second move on a live rail: no switch, no settle
    let before = b.clock.elapsed_ms();
    b.bank.move_to(2, 60, 400).unwrap();
    assert_eq!(b.clock.elapsed_ms(), before);
    assert_eq!(switches(&b, 40, true), 1);
}

#[test]
fn rail_drops_exactly_once_when_group_goes_idle() {
    let mut b = bench();
    assign(&mut b, 1, 40, 100);
    assign(&mut b, 2, 40, 300);
    b.bank.move_to(1, 100, 100).unwrap();
    b.bank.move_to(2, 100, 100).unwrap();

    // both arrive after 5 ticks; servo 1 releases after 100 ms, servo 2 after 300 ms
    run_ticks(&mut b, 12);
    assert_eq!(b.bank.actuator(1).unwrap().phase(), Phase::Released);
    assert!(b.bank.actuator(2).unwrap().in_flight());
    assert_eq!(b.bank.rail_energized(40), Some(true));

    run_ticks(&mut b, 20);
    assert_eq!(b.bank.rail_energized(40), Some(false));
    assert_eq!(switches(&b, 40, true), 1);
    // one off from start-up, one from the scheduler
    assert_eq!(switches(&b, 40, false), 2);

    run_ticks(&mut b, 5);
    assert_eq!(switches(&b, 40, false), 2);
    assert!(b.bank.is_quiescent());
}

#[test]
fn idle_member_is_released_when_rail_drops() {
    let mut b = bench();
    assign(&mut b, 1, 40, 0);
    assign(&mut b, 2, 40, 0);
    b.bank.move_to(1, 100, 100).unwrap();
    b.servos.clear();

    // servo 2 was powered up but never asked to move
    b.bank.stop(1).unwrap();
    run_ticks(&mut b, 1);
    let ops = b.servos.ops();
    assert!(ops.contains(&ServoOp::Detach(1)));
    assert!(ops.contains(&ServoOp::Detach(2)));
    assert_eq!(b.bank.actuator(2).unwrap().phase(), Phase::Released);
}

#[test]
fn hold_without_auto_release_keeps_rail_on() {
    let mut b = bench();
    assign(&mut b, 1, 41, 0);
    b.bank.move_to(1, 30, 60).unwrap();
    run_ticks(&mut b, 500);
    assert_eq!(b.bank.rail_energized(41), Some(true));
    assert!(matches!(
        b.bank.actuator(1).unwrap().phase(),
        Phase::Holding { .. }
    ));
}

#[test]
fn unknown_rail_moves_ungated() {
    let mut b = bench();
    assign(&mut b, 4, 99, 0);
    b.bank.move_to(4, 10, 40).unwrap();
    assert!(b.bank.actuator(4).unwrap().is_moving());
    assert_eq!(b.pins.rail_switches().len(), 2);
}

#[test]
fn raw_pins_refuse_rails() {
    let mut b = bench();
    assert_eq!(b.bank.set_pins(&[13, 40, 22], true), Err(ServoError::RailPin(40)));
    assert_eq!(b.pins.level(13), Some(true));
    assert_eq!(b.pins.level(22), Some(true));
    assert_eq!(b.pins.level(40), None);

    b.bank.set_pins(&[13], false).unwrap();
    assert_eq!(b.pins.level(13), Some(false));
}

#[test]
fn shutdown_drops_every_rail() {
    let mut b = bench();
    assign(&mut b, 1, 40, 0);
    assign(&mut b, 2, 41, 0);
    b.bank.move_to(1, 100, 1000).unwrap();
    b.bank.move_to(2, 100, 1000).unwrap();
    run_ticks(&mut b, 2);

    b.bank.shutdown();
    assert_eq!(b.bank.rail_energized(40), Some(false));
    assert_eq!(b.bank.rail_energized(41), Some(false));
    assert!(b.bank.is_quiescent());
    assert!(b.bank.actuators().iter().all(|a| a.phase() == Phase::Released));
}
