use proptest::prelude::*;
use servo_core::estimator::{AngleUnwrapper, Travel};
use servo_core::mocks::{NoopSensor, RecordingPins, RecordingServos};
use servo_core::util::{clamp_position, ramp_steps};
use servo_core::{AssignSpec, Phase, ServoBank};
use servo_traits::clock::test_clock::TestClock;

prop_compose! {
    // joint motion between two reads stays well under half a turn
    fn walk_strategy()(
        start in 0i32..360,
        deltas in prop::collection::vec(-90i32..=90, 1..200),
    ) -> (i32, Vec<i32>) {
        (start, deltas)
    }
}

proptest! {
    #[test]
    fn clamp_stays_in_range(pos in -1000.0f32..1000.0, a in 0u8..=180, b in 0u8..=180) {
        let (min, max) = (a.min(b), a.max(b));
        let p = clamp_position(pos, min, max);
        prop_assert!(p >= min && p <= max);
    }

    #[test]
    fn unwrapper_tracks_true_travel((start, deltas) in walk_strategy(), clockwise in any::<bool>()) {
        let travel = if clockwise { Travel::Clockwise } else { Travel::CounterClockwise };
        let mut u = AngleUnwrapper::new(start as u16, travel);
        let mut angle = start;
        for d in deltas {
            angle += d;
            let sample = angle.rem_euclid(360) as u16;
            let got = u.push(sample);
            let expected = if clockwise { start - angle } else { angle - start };
            prop_assert!((got - expected as f32).abs() < 1e-3, "got {} expected {}", got, expected);
        }
    }

    #[test]
    fn plain_move_lands_on_target_after_its_step_count(
        start in 0u8..=180,
        target in 0u8..=180,
        duration_ms in 0u64..2_000,
    ) {
        let servos = RecordingServos::new();
        let clock = TestClock::new();
        let mut bank = ServoBank::builder()
            .with_servos(servos.clone())
            .with_sensor(NoopSensor)
            .with_pins(RecordingPins::new())
            .with_clock(Box::new(clock.clone()))
            .build()
            .unwrap();
        bank.assign(&AssignSpec {
            name: "p".into(),
            channel: 0,
            min: 0,
            max: 180,
            auto_release_ms: 0,
            inverted: false,
            initial_position: start,
            rail: 0,
        }).unwrap();
        bank.move_to(0, target, duration_ms).unwrap();
        servos.clear();

        let steps = ramp_steps(duration_ms, 20).max(1);
        for _ in 0..steps {
            prop_assert!(bank.actuator(0).unwrap().is_moving() || start == target);
            clock.advance_ms(20);
            bank.tick();
        }
        let a = bank.actuator(0).unwrap();
        let holding = matches!(a.phase(), Phase::Holding { .. });
        prop_assert!(holding, "phase {:?}", a.phase());
        prop_assert_eq!(a.position(), target);

        let (lo, hi) = (start.min(target), start.max(target));
        for w in servos.writes(0) {
            prop_assert!(w >= lo && w <= hi);
        }
    }
}
