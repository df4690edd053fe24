//! # symode: learned dynamics through a differentiable ODE solver
//!
//! ## Overview
//!
//! `symode` fits neural vector fields to trajectories of controlled
//! mechanical systems. The model is integrated with a fixed-step solver and
//! the loss on the integrated states is backpropagated through every solver
//! stage, so the networks are trained on trajectories rather than on
//! finite-difference derivatives.
//!
//! The most constrained model, [`model::ModelKind::Structured`], learns a
//! mass matrix, a potential and an input matrix and combines them through the
//! Euler–Lagrange equations; the other kinds are unstructured ablations.
//!
//! ## Crates
//!
//! -   **`symode`:** the crate you are viewing. Models, data arrangement,
//!     training loop, persistence and the `symode` binary.
//! -   **[`ml`]:** tensors, tape autodiff, networks, Adam and the
//!     differentiable integrator.
//! -   **[`physics`]:** ground-truth pendulum and acrobot simulators.
//!
//! ## Getting Started
//!
//! ```text
//! symode --structure --num-points 3 --total-steps 100 --verbose
//! ```
//!
//! writes `acrobot-hnn_ode-struct-rk4-p3.tar` and
//! `acrobot-hnn_ode-struct-rk4-p3-stats.pkl` to the current directory.

pub mod app;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod stats;
pub mod train;

pub use ml;
pub use physics;

pub use checkpoint::{artifact_paths, ArtifactPaths, Checkpoint};
pub use data::{arrange_data, get_dataset, Dataset, DatasetConfig, Trajectories};
pub use error::{ConfigError, DataError, PersistError, TrainError};
pub use model::{DynamicsModel, HiddenWidths, ModelConfig, ModelKind};
pub use stats::{EpochStats, Stats};
pub use train::{evaluate_trajectories, fit, TrainConfig, Trainer, TrajectoryReport};
