//! Fixed-step RK4 integration of a [`ControlledSystem`].

use crate::error::PhysicsError;
use crate::systems::ControlledSystem;

/// `d/dt [q, q̇] = [q̇, q̈]`
pub fn state_derivative(system: &dyn ControlledSystem, state: &[f64], u: f64) -> Vec<f64> {
    let n = system.num_angle();
    let (q, qdot) = state.split_at(n);
    let mut out = qdot.to_vec();
    out.extend(system.acceleration(q, qdot, u));
    out
}

fn offset(state: &[f64], k: &[f64], h: f64) -> Vec<f64> {
    state.iter().zip(k).map(|(s, d)| s + h * d).collect()
}

fn rk4_step(system: &dyn ControlledSystem, state: &[f64], u: f64, h: f64) -> Vec<f64> {
    let k1 = state_derivative(system, state, u);
    let k2 = state_derivative(system, &offset(state, &k1, 0.5 * h), u);
    let k3 = state_derivative(system, &offset(state, &k2, 0.5 * h), u);
    let k4 = state_derivative(system, &offset(state, &k3, h), u);
    (0..state.len())
        .map(|i| state[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
        .collect()
}

/// Simulates `system` under constant control `u`.
///
/// Returns `timesteps` states `[q, q̇]` spaced `dt` apart, the first being
/// `initial`. Each interval is covered by `substeps` RK4 steps.
///
/// # Errors
///
/// [`PhysicsError::StateDimension`] if `initial` has the wrong length and
/// [`PhysicsError::NoSubsteps`] for `substeps == 0`.
pub fn simulate(
    system: &dyn ControlledSystem,
    initial: &[f64],
    u: f64,
    dt: f64,
    timesteps: usize,
    substeps: usize,
) -> Result<Vec<Vec<f64>>, PhysicsError> {
    if initial.len() != system.state_dim() {
        return Err(PhysicsError::StateDimension {
            expected: system.state_dim(),
            got: initial.len(),
        });
    }
    if substeps == 0 {
        return Err(PhysicsError::NoSubsteps);
    }
    let h = dt / substeps as f64;
    let mut states = Vec::with_capacity(timesteps);
    let mut state = initial.to_vec();
    for _ in 0..timesteps {
        states.push(state.clone());
        for _ in 0..substeps {
            state = rk4_step(system, &state, u, h);
        }
    }
    Ok(states)
}
