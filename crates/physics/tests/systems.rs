use physics::{
    simulate, state_derivative, Acrobot, ControlledSystem, Pendulum, PhysicsError, SystemKind,
};
use proptest::prelude::*;

/// Conserved quantity of the unforced pendulum, `½θ̇² + (3g/2l)·cos θ`.
fn pendulum_energy(p: &Pendulum, state: &[f64]) -> f64 {
    0.5 * state[1] * state[1] + 3.0 * p.gravity / (2.0 * p.length) * state[0].cos()
}

#[test]
fn first_sample_is_initial_state() {
    let states = simulate(&Pendulum::default(), &[0.3, -0.2], 0.5, 0.05, 10, 4).unwrap();
    assert_eq!(states.len(), 10);
    assert_eq!(states[0], vec![0.3, -0.2]);
}

#[test]
fn unforced_pendulum_conserves_energy() {
    let p = Pendulum::default();
    let states = simulate(&p, &[2.0, 0.5], 0.0, 0.05, 200, 10).unwrap();
    let e0 = pendulum_energy(&p, &states[0]);
    for s in &states {
        assert!((pendulum_energy(&p, s) - e0).abs() < 1e-6);
    }
}

#[test]
fn acrobot_rests_when_hanging() {
    let acrobot = Acrobot::default();
    let states = simulate(&acrobot, &[0.0, 0.0, 0.0, 0.0], 0.0, 0.05, 50, 5).unwrap();
    for s in &states {
        assert!(s.iter().all(|v| v.abs() < 1e-12), "{s:?}");
    }
}

#[test]
fn acrobot_elbow_torque_moves_second_link() {
    let acrobot = Acrobot::default();
    let acc = acrobot.acceleration(&[0.0, 0.0], &[0.0, 0.0], 1.0);
    assert!(acc[1] > 0.0);
    assert!(acc[0] < 0.0, "reaction on the first link opposes the torque");
}

#[test]
fn derivative_layout_is_velocity_then_acceleration() {
    let system = SystemKind::Acrobot.build();
    let d = state_derivative(system.as_ref(), &[0.1, 0.2, 0.3, 0.4], 0.0);
    assert_eq!(d.len(), 4);
    assert_eq!(&d[..2], &[0.3, 0.4]);
}

#[test]
fn rejects_bad_arguments() {
    let p = Pendulum::default();
    assert_eq!(
        simulate(&p, &[0.0, 0.0, 0.0], 0.0, 0.1, 3, 1),
        Err(PhysicsError::StateDimension { expected: 2, got: 3 })
    );
    assert_eq!(simulate(&p, &[0.0, 0.0], 0.0, 0.1, 3, 0), Err(PhysicsError::NoSubsteps));
}

proptest! {
    #[test]
    fn substeps_refine_toward_the_same_solution(theta in -3.0f64..3.0, omega in -1.0f64..1.0) {
        let p = Pendulum::default();
        let coarse = simulate(&p, &[theta, omega], 0.0, 0.05, 20, 2).unwrap();
        let fine = simulate(&p, &[theta, omega], 0.0, 0.05, 20, 20).unwrap();
        for (a, b) in coarse.iter().zip(&fine) {
            prop_assert!((a[0] - b[0]).abs() < 1e-3);
        }
    }
}
