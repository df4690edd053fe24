//! Command-line options and their conversion into typed configurations.

use std::path::PathBuf;

use clap::Parser;
use ml::{GradientMode, Nonlinearity, Solver};
use physics::SystemKind;

use crate::data::DatasetConfig;
use crate::error::ConfigError;
use crate::model::{HiddenWidths, ModelConfig, ModelKind};
use crate::train::TrainConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "symode",
    about = "Train a learned vector field through a differentiable ODE solver"
)]
pub struct Args {
    /// Number of generalized coordinates
    #[arg(long, default_value_t = 2)]
    pub num_angle: usize,
    #[arg(long, default_value_t = 1e-4)]
    pub learn_rate: f32,
    /// Nonlinearity of the main network: tanh, relu, sigmoid, softplus, selu, elu or swish
    #[arg(long, default_value = "tanh")]
    pub nonlinearity: Nonlinearity,
    /// Number of training epochs after the first
    #[arg(long, default_value_t = 2000)]
    pub total_steps: usize,
    /// Epochs between progress lines
    #[arg(long, default_value_t = 200)]
    pub print_every: usize,
    /// Artifact name prefix; defaults to the system name
    #[arg(long)]
    pub name: Option<String>,
    /// Regress the derivative directly, with an unused mass network
    #[arg(long)]
    pub baseline: bool,
    /// Regress the derivative directly
    #[arg(long)]
    pub naive: bool,
    /// Use the structured Euler–Lagrange model
    #[arg(long)]
    pub structure: bool,
    /// Debug logging and per-epoch progress
    #[arg(long)]
    pub verbose: bool,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    #[arg(long, default_value = ".")]
    pub save_dir: PathBuf,
    /// Points per training window, including the initial state
    #[arg(long, default_value_t = 2)]
    pub num_points: usize,
    /// ODE solver: euler, midpoint or rk4
    #[arg(long, default_value = "rk4")]
    pub solver: Solver,
    /// Backpropagation through the solve: direct or checkpointed
    #[arg(long, default_value = "direct")]
    pub gradient: GradientMode,
    /// Ground-truth system: pendulum or acrobot
    #[arg(long, default_value = "acrobot")]
    pub system: SystemKind,
    /// Initial conditions per control value
    #[arg(long, default_value_t = 20)]
    pub samples: usize,
    #[arg(long, default_value_t = 20)]
    pub timesteps: usize,
    #[arg(long, default_value_t = 0.05)]
    pub dt: f32,
    /// Constant control values, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = [0.0, -1.0, 1.0, -2.0, 2.0]
    )]
    pub controls: Vec<f32>,
    /// Fraction of each control group held out for testing
    #[arg(long, default_value_t = 0.2)]
    pub test_split: f64,
}

/// Everything a run needs, validated.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub name: String,
    pub save_dir: PathBuf,
    pub model: ModelConfig,
    pub train: TrainConfig,
    pub dataset: DatasetConfig,
}

impl Args {
    /// # Errors
    ///
    /// Conflicting mode flags, or a coordinate count that does not match the
    /// chosen system.
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let kind = ModelKind::from_flags(self.baseline, self.naive, self.structure)?;
        if self.num_angle == 0 {
            return Err(ConfigError::NoCoordinates);
        }
        let expected = self.system.build().num_angle();
        if expected != self.num_angle {
            return Err(ConfigError::CoordinateMismatch {
                system: self.system.to_string(),
                expected,
                got: self.num_angle,
            });
        }

        Ok(RunConfig {
            name: self.name.unwrap_or_else(|| self.system.to_string()),
            save_dir: self.save_dir,
            model: ModelConfig {
                num_angle: self.num_angle,
                kind,
                nonlinearity: self.nonlinearity,
                hidden: HiddenWidths::default(),
                seed: self.seed,
            },
            train: TrainConfig {
                learn_rate: self.learn_rate,
                total_steps: self.total_steps,
                print_every: self.print_every,
                verbose: self.verbose,
                num_points: self.num_points,
                solver: self.solver,
                gradient: self.gradient,
                ..TrainConfig::default()
            },
            dataset: DatasetConfig {
                system: self.system,
                samples: self.samples,
                timesteps: self.timesteps,
                dt: self.dt,
                controls: self.controls,
                test_split: self.test_split,
                seed: self.seed,
            },
        })
    }
}
