//! Fixed-grid explicit ODE integration that stays on the tape.
//!
//! [`odeint`] takes one solver step per segment of the requested time grid and
//! returns the state at every grid point. Because each stage is built from
//! tensor ops, a loss on the returned states can be backpropagated to whatever
//! parameters the [`VectorField`] uses ([`GradientMode::Direct`]).
//! [`backprop_checkpointed`] produces the same gradients while only keeping one
//! segment on a tape at a time ([`GradientMode::Checkpointed`]).

use std::fmt;
use std::str::FromStr;

use crate::error::MlError;
use crate::graph::NoGrad;
use crate::recorder::Recorder;
use crate::tape::Tape;
use crate::tensor::{Tensor, TensorStore};

/// Right-hand side `dx/dt = f(t, x; u)` of an ODE with a constant control `u`.
pub trait VectorField {
    fn state_dim(&self) -> usize;

    fn derivative(
        &self,
        t: f32,
        state: &Tensor,
        control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Solver {
    Euler,
    Midpoint,
    /// Classic fourth-order Runge–Kutta.
    Rk4,
}

impl Solver {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Solver::Euler => "euler",
            Solver::Midpoint => "midpoint",
            Solver::Rk4 => "rk4",
        }
    }

    /// Vector-field evaluations per step.
    #[must_use]
    pub fn stages(self) -> usize {
        match self {
            Solver::Euler => 1,
            Solver::Midpoint => 2,
            Solver::Rk4 => 4,
        }
    }
}

impl FromStr for Solver {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euler" => Ok(Solver::Euler),
            "midpoint" => Ok(Solver::Midpoint),
            "rk4" => Ok(Solver::Rk4),
            other => Err(MlError::UnknownSolver(other.to_string())),
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How gradients are taken through a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GradientMode {
    /// Record the whole solve and backpropagate through it at once.
    #[default]
    Direct,
    /// Keep only grid states; re-record one segment at a time on the way back.
    Checkpointed,
}

impl FromStr for GradientMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(GradientMode::Direct),
            "checkpointed" => Ok(GradientMode::Checkpointed),
            other => Err(format!("gradient mode not recognized: {other}")),
        }
    }
}

fn check_grid(t: &[f32]) -> Result<(), MlError> {
    if t.is_empty() || !t.windows(2).all(|w| w[1] > w[0]) {
        return Err(MlError::InvalidTimeGrid);
    }
    Ok(())
}

/// `y + h·k`
fn axpy(
    y: &Tensor,
    k: &Tensor,
    h: f32,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Tensor {
    let hk = k.mul_scalar(h, recorder, tensors);
    y.add(&hk, recorder, tensors)
}

/// Advances `y` from `t0` to `t0 + dt` with a single step of `solver`.
#[allow(clippy::too_many_arguments)]
pub fn step<F: VectorField>(
    field: &F,
    solver: Solver,
    t0: f32,
    dt: f32,
    y: &Tensor,
    control: f32,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Tensor {
    match solver {
        Solver::Euler => {
            let k1 = field.derivative(t0, y, control, recorder, tensors);
            axpy(y, &k1, dt, recorder, tensors)
        }
        Solver::Midpoint => {
            let k1 = field.derivative(t0, y, control, recorder, tensors);
            let y_mid = axpy(y, &k1, 0.5 * dt, recorder, tensors);
            let k2 = field.derivative(t0 + 0.5 * dt, &y_mid, control, recorder, tensors);
            axpy(y, &k2, dt, recorder, tensors)
        }
        Solver::Rk4 => {
            let half = 0.5 * dt;
            let k1 = field.derivative(t0, y, control, recorder, tensors);
            let y2 = axpy(y, &k1, half, recorder, tensors);
            let k2 = field.derivative(t0 + half, &y2, control, recorder, tensors);
            let y3 = axpy(y, &k2, half, recorder, tensors);
            let k3 = field.derivative(t0 + half, &y3, control, recorder, tensors);
            let y4 = axpy(y, &k3, dt, recorder, tensors);
            let k4 = field.derivative(t0 + dt, &y4, control, recorder, tensors);

            let k23 = k2.add(&k3, recorder, tensors);
            let k23 = k23.mul_scalar(2.0, recorder, tensors);
            let sum = k1.add(&k23, recorder, tensors);
            let sum = sum.add(&k4, recorder, tensors);
            axpy(y, &sum, dt / 6.0, recorder, tensors)
        }
    }
}

/// Integrates `field` from `y0` over the grid `t`.
///
/// The result has one state per grid point and starts with `y0` itself.
///
/// # Errors
///
/// [`MlError::InvalidTimeGrid`] for an empty or non-increasing grid,
/// [`MlError::StateDimension`] if `y0` does not fit the field.
pub fn odeint<F: VectorField>(
    field: &F,
    y0: &Tensor,
    t: &[f32],
    control: f32,
    solver: Solver,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Result<Vec<Tensor>, MlError> {
    check_grid(t)?;
    if y0.len() != field.state_dim() {
        return Err(MlError::StateDimension { expected: field.state_dim(), got: y0.len() });
    }
    tracing::trace!(points = t.len(), %solver, "odeint");
    let mut out = Vec::with_capacity(t.len());
    out.push(y0.clone());
    for seg in t.windows(2) {
        let (t0, dt) = (seg[0], seg[1] - seg[0]);
        let next = step(field, solver, t0, dt, &out[out.len() - 1], control, recorder, tensors);
        out.push(next);
    }
    Ok(out)
}

/// [`odeint`] without recording, returning plain state vectors.
///
/// # Errors
///
/// See [`odeint`].
pub fn odeint_values<F: VectorField>(
    field: &F,
    y0: &[f32],
    t: &[f32],
    control: f32,
    solver: Solver,
) -> Result<Vec<Vec<f32>>, MlError> {
    let y0 = Tensor::from_vec(vec![y0.len()], y0.to_vec());
    let mut tensors = TensorStore::new();
    let states = odeint(field, &y0, t, control, solver, &mut NoGrad::new(), &mut tensors)?;
    Ok(states.into_iter().map(|s| s.data).collect())
}

/// Segment-wise backward pass through a solve produced by [`odeint_values`].
///
/// `states[k]` is the solution at `t[k]` and `output_grads[k]` the gradient of
/// the objective with respect to it. Segments are re-recorded from last to
/// first; after each segment's backward pass `on_segment` receives the store
/// so the caller can collect parameter gradients. Returns the gradient with
/// respect to the initial state.
///
/// # Errors
///
/// [`MlError::InvalidTimeGrid`] for a bad grid or mismatched lengths, plus any
/// error of the per-segment backward pass.
pub fn backprop_checkpointed<F: VectorField>(
    field: &F,
    states: &[Vec<f32>],
    t: &[f32],
    control: f32,
    solver: Solver,
    output_grads: &[Vec<f32>],
    mut on_segment: impl FnMut(&TensorStore),
) -> Result<Vec<f32>, MlError> {
    check_grid(t)?;
    if states.len() != t.len() || output_grads.len() != t.len() {
        return Err(MlError::InvalidTimeGrid);
    }
    let dim = field.state_dim();
    let mut adjoint = vec![0.0f32; dim];
    for k in (1..t.len()).rev() {
        for (a, g) in adjoint.iter_mut().zip(&output_grads[k]) {
            *a += g;
        }
        let mut tape = Tape::new();
        let mut tensors = TensorStore::new();
        let start = Tensor::from_vec(vec![dim], states[k - 1].clone()).with_grad();
        let (t0, dt) = (t[k - 1], t[k] - t[k - 1]);
        let end = step(field, solver, t0, dt, &start, control, &mut tape, &mut tensors);
        tape.backward_from(&end, adjoint, &mut tensors)?;
        on_segment(&tensors);
        adjoint = tensors
            .get(&start.id)
            .and_then(|s| s.grad.clone())
            .unwrap_or_else(|| vec![0.0; dim]);
    }
    for (a, g) in adjoint.iter_mut().zip(&output_grads[0]) {
        *a += g;
    }
    Ok(adjoint)
}
