#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_precision_loss,
    clippy::many_single_char_names
)]
//! # Physics
//!
//! Ground-truth controlled mechanical systems used to generate training
//! trajectories.
//!
//! ## Key Components
//!
//! -   **Systems:** [`Pendulum`] and [`Acrobot`] implement
//!     [`ControlledSystem`], which maps generalized coordinates, velocities
//!     and a scalar control to generalized accelerations.
//! -   **Simulation:** [`simulate`] integrates a system with classic RK4 in
//!     `f64` and samples the state on a uniform grid.
//!
//! ## Usage
//!
//! ```rust
//! use physics::{simulate, Pendulum};
//!
//! let pendulum = Pendulum::default();
//! let states = simulate(&pendulum, &[0.5, 0.0], 0.0, 0.05, 20, 10).unwrap();
//! assert_eq!(states.len(), 20);
//! ```

pub mod error;
pub mod simulation;
pub mod systems;

pub use error::PhysicsError;
pub use simulation::{simulate, state_derivative};
pub use systems::{Acrobot, ControlledSystem, Pendulum, SystemKind};
