//! # ml
//!
//! Small CPU autodiff stack for training neural vector fields.
//!
//! -   [`tensor`]: `f32` tensors whose ops are optionally recorded.
//! -   [`tape`]: reverse-mode differentiation over recorded [`graph::Node`]s.
//! -   [`nn`]: dense layers, MLPs with input Jacobians, and a PSD matrix network.
//! -   [`optim`]: Adam.
//! -   [`odeint`]: fixed-grid ODE solvers that backpropagate through the solve.

pub mod error;
pub mod graph;
pub mod loss;
pub mod nn;
pub mod nonlinearity;
pub mod odeint;
pub mod optim;
pub mod recorder;
pub mod tape;
pub mod tensor;

pub use error::MlError;
pub use graph::{EOp, Node, NoGrad};
pub use loss::{l2_loss, l2_loss_grad, l2_loss_value};
pub use nn::{angle_embedding, angle_tangents, Dense, GradAccumulator, Mlp, Module, Psd};
pub use nonlinearity::Nonlinearity;
pub use odeint::{backprop_checkpointed, odeint, odeint_values, GradientMode, Solver, VectorField};
pub use optim::Adam;
pub use recorder::Recorder;
pub use tape::Tape;
pub use tensor::{Tensor, TensorStore};
