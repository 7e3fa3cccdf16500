use rovercontroller::controller::{
    next_velocity, reduce, steer_from_raw, ControlState, ControllerProfile, InputEvent,
    ProfileRegistry,
};

fn dualsense() -> ControllerProfile {
    *ProfileRegistry::builtin()
        .unwrap()
        .lookup("dualsense")
        .unwrap()
}

fn press(code: u16) -> InputEvent {
    InputEvent::Button { code, value: 1 }
}

fn release(code: u16) -> InputEvent {
    InputEvent::Button { code, value: 0 }
}

fn tick(state: &mut ControlState, max_speed: f64) {
    state.velocity = next_velocity(state, max_speed);
}

#[test]
fn accelerating_from_rest_reaches_and_holds_max_speed() {
    let max_speed = 0.3;
    let mut state = ControlState {
        accel_intent: 1,
        ..ControlState::default()
    };

    let mut previous = state.velocity;
    let mut reached_at = None;
    for n in 1..=50 {
        tick(&mut state, max_speed);

        // Integration with no decay while intent is held
        let expected = (previous + 0.01).min(max_speed);
        assert_eq!(state.velocity, expected, "tick {}", n);
        assert!(state.velocity >= previous);

        if reached_at.is_none() && state.velocity == max_speed {
            reached_at = Some(n);
        }
        previous = state.velocity;
    }

    let reached_at = reached_at.expect("never reached max speed");
    assert!((30..=31).contains(&reached_at), "reached at tick {}", reached_at);
    assert_eq!(state.velocity, max_speed);
}

#[test]
fn coasting_decays_strictly_until_it_snaps_to_zero() {
    let mut state = ControlState {
        velocity: 0.3,
        ..ControlState::default()
    };

    let mut ticks = 0;
    while state.velocity != 0.0 {
        let before = state.velocity.abs();
        tick(&mut state, 0.3);
        assert!(state.velocity.abs() < before);
        ticks += 1;
        assert!(ticks < 20, "decay did not converge");
    }

    // 0.3 * 0.6^n drops below 0.01 on the seventh tick
    assert_eq!(ticks, 7);
    for _ in 0..5 {
        tick(&mut state, 0.3);
        assert_eq!(state.velocity, 0.0);
    }
}

#[test]
fn reverse_coasting_converges_too() {
    let mut state = ControlState {
        velocity: -0.3,
        ..ControlState::default()
    };
    for _ in 0..10 {
        tick(&mut state, 0.3);
    }
    assert_eq!(state.velocity, 0.0);
}

#[test]
fn cruise_freezes_velocity_regardless_of_intent() {
    let profile = dualsense();
    let mut state = ControlState {
        velocity: 0.2,
        ..ControlState::default()
    };

    reduce(&profile, &mut state, &press(profile.cruise_code));
    reduce(&profile, &mut state, &release(profile.cruise_code));
    assert!(state.cruise_engaged);

    state.accel_intent = 5;
    for _ in 0..10 {
        tick(&mut state, 0.3);
        assert_eq!(state.velocity, 0.2);
    }
}

#[test]
fn brake_during_cruise_stops_on_next_tick() {
    let profile = dualsense();
    let mut state = ControlState::default();

    reduce(&profile, &mut state, &press(profile.forward_code));
    for _ in 0..15 {
        tick(&mut state, 0.3);
    }
    reduce(&profile, &mut state, &press(profile.cruise_code));
    tick(&mut state, 0.3);
    assert!(state.cruise_engaged);
    assert!(state.velocity > 0.0);

    reduce(&profile, &mut state, &press(profile.brake_code));
    tick(&mut state, 0.3);

    assert_eq!(state.velocity, 0.0);
    assert!(!state.cruise_engaged);
    assert!(state.emergency_stop);
}

#[test]
fn holding_the_brake_keeps_the_vehicle_still() {
    let profile = dualsense();
    let mut state = ControlState::default();

    reduce(&profile, &mut state, &press(profile.brake_code));
    reduce(&profile, &mut state, &press(profile.forward_code));
    for _ in 0..10 {
        tick(&mut state, 0.3);
        assert_eq!(state.velocity, 0.0);
    }

    // Releasing the brake lets the held intent integrate again
    reduce(&profile, &mut state, &release(profile.brake_code));
    tick(&mut state, 0.3);
    assert_eq!(state.velocity, 0.01);
}

#[test]
fn mixed_directional_presses_net_out() {
    let profile = dualsense();
    let mut state = ControlState::default();
    let events = [
        press(profile.forward_code),
        press(profile.backward_code),
        release(profile.forward_code),
        press(profile.forward_code),
        release(profile.backward_code),
        release(profile.forward_code),
    ];

    let expected = [1, 0, -1, 0, 1, 0];
    for (event, intent) in events.iter().zip(expected) {
        reduce(&profile, &mut state, event);
        assert_eq!(state.accel_intent, intent);
    }
}

#[test]
fn steering_covers_the_raw_axis_domain() {
    assert_eq!(steer_from_raw(0), -1.0);
    assert_eq!(steer_from_raw(128), 0.0);
    assert!((steer_from_raw(255) - 0.992).abs() < 0.001);

    for raw in 0..=255 {
        let steer = steer_from_raw(raw);
        assert!((-1.0..=1.0).contains(&steer));
        if raw > 0 {
            assert!(steer > steer_from_raw(raw - 1));
        }
    }
}
