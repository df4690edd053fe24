//! Dataset generation and arrangement into integration windows.

use std::f32::consts::PI;

use physics::{simulate, SystemKind};

use crate::error::DataError;

/// RK4 substeps per sample when generating ground truth.
pub const SIMULATION_SUBSTEPS: usize = 10;

/// An ensemble of equally long trajectories stored as `[trial, time, state_dim]`,
/// each simulated under one constant control value.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectories {
    data: Vec<f32>,
    controls: Vec<f32>,
    timesteps: usize,
    state_dim: usize,
}

impl Trajectories {
    /// # Errors
    ///
    /// [`DataError::DataLength`] unless `data` holds exactly
    /// `controls.len() * timesteps * state_dim` values.
    pub fn new(
        data: Vec<f32>,
        controls: Vec<f32>,
        timesteps: usize,
        state_dim: usize,
    ) -> Result<Self, DataError> {
        let expected = controls.len() * timesteps * state_dim;
        if data.len() != expected {
            return Err(DataError::DataLength { expected, got: data.len() });
        }
        Ok(Self { data, controls, timesteps, state_dim })
    }

    #[must_use]
    pub fn trials(&self) -> usize {
        self.controls.len()
    }

    #[must_use]
    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn control(&self, trial: usize) -> f32 {
        self.controls[trial]
    }

    #[must_use]
    pub fn controls(&self) -> &[f32] {
        &self.controls
    }

    /// All states of one trial, `[time, state_dim]`.
    #[must_use]
    pub fn trajectory(&self, trial: usize) -> &[f32] {
        let len = self.timesteps * self.state_dim;
        &self.data[trial * len..(trial + 1) * len]
    }

    #[must_use]
    pub fn state(&self, trial: usize, time: usize) -> &[f32] {
        let start = (trial * self.timesteps + time) * self.state_dim;
        &self.data[start..start + self.state_dim]
    }
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub system: SystemKind,
    /// Initial conditions per control value.
    pub samples: usize,
    pub timesteps: usize,
    pub dt: f32,
    /// One group of trajectories is simulated under each value.
    pub controls: Vec<f32>,
    /// Fraction of each control group held out for testing.
    pub test_split: f64,
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            system: SystemKind::Acrobot,
            samples: 20,
            timesteps: 20,
            dt: 0.05,
            controls: vec![0.0, -1.0, 1.0, -2.0, 2.0],
            test_split: 0.2,
            seed: 0,
        }
    }
}

/// Train/test trajectories on a shared time grid.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub x: Trajectories,
    pub test_x: Trajectories,
    pub t: Vec<f32>,
}

#[derive(Default)]
struct Split {
    data: Vec<f32>,
    controls: Vec<f32>,
}

impl Split {
    fn push(&mut self, trajectory: &[f32], u: f32) {
        self.data.extend_from_slice(trajectory);
        self.controls.push(u);
    }
}

/// Simulates `config.samples` random initial conditions under every control
/// value and splits each control group into train and test trajectories.
///
/// Angles are drawn uniformly from `[-π, π]`, velocities from `[-1, 1]`.
///
/// # Errors
///
/// [`DataError::TestSplit`] for a split outside `[0, 1)`,
/// [`DataError::EmptySplit`] if either side ends up without trajectories.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn get_dataset(config: &DatasetConfig) -> Result<Dataset, DataError> {
    if !(0.0..1.0).contains(&config.test_split) {
        return Err(DataError::TestSplit(config.test_split));
    }
    let system = config.system.build();
    let n = system.num_angle();
    let state_dim = system.state_dim();
    let mut rng = fastrand::Rng::with_seed(config.seed);
    let n_test = (config.samples as f64 * config.test_split).floor() as usize;

    let mut train = Split::default();
    let mut test = Split::default();
    for &u in &config.controls {
        let mut group = Vec::with_capacity(config.samples);
        for _ in 0..config.samples {
            let mut initial: Vec<f64> =
                (0..n).map(|_| f64::from(rng.f32() * 2.0 * PI - PI)).collect();
            initial.extend((0..n).map(|_| f64::from(rng.f32() * 2.0 - 1.0)));
            let states = simulate(
                system.as_ref(),
                &initial,
                f64::from(u),
                f64::from(config.dt),
                config.timesteps,
                SIMULATION_SUBSTEPS,
            )?;
            let flat: Vec<f32> = states.iter().flatten().map(|&v| v as f32).collect();
            group.push(flat);
        }
        rng.shuffle(&mut group);
        let (held_out, kept) = group.split_at(n_test);
        for trajectory in held_out {
            test.push(trajectory, u);
        }
        for trajectory in kept {
            train.push(trajectory, u);
        }
    }
    if train.controls.is_empty() {
        return Err(DataError::EmptySplit("train"));
    }
    if test.controls.is_empty() {
        return Err(DataError::EmptySplit("test"));
    }
    tracing::info!(
        system = %config.system,
        train = train.controls.len(),
        test = test.controls.len(),
        timesteps = config.timesteps,
        "dataset generated"
    );

    let t = (0..config.timesteps).map(|k| k as f32 * config.dt).collect();
    Ok(Dataset {
        x: Trajectories::new(train.data, train.controls, config.timesteps, state_dim)?,
        test_x: Trajectories::new(test.data, test.controls, config.timesteps, state_dim)?,
        t,
    })
}

/// Cuts every trajectory into windows of `num_points` consecutive states.
///
/// Entry `i` of the result batches, for every trial, the states
/// `i..i + num_points`; there are `T - P + 1` entries. The returned grid is
/// `t[..num_points]`.
///
/// # Errors
///
/// [`DataError::GridLength`] if `t` does not match the trajectories,
/// [`DataError::WindowLength`] unless `2 <= num_points <= T`.
pub fn arrange_data(
    trajectories: &Trajectories,
    t: &[f32],
    num_points: usize,
) -> Result<(Vec<Trajectories>, Vec<f32>), DataError> {
    let timesteps = trajectories.timesteps();
    if t.len() != timesteps {
        return Err(DataError::GridLength { expected: timesteps, got: t.len() });
    }
    if num_points < 2 || num_points > timesteps {
        return Err(DataError::WindowLength { num_points, timesteps });
    }
    let dim = trajectories.state_dim();
    let windows = (0..=timesteps - num_points)
        .map(|offset| {
            let mut data = Vec::with_capacity(trajectories.trials() * num_points * dim);
            for trial in 0..trajectories.trials() {
                let states = trajectories.trajectory(trial);
                data.extend_from_slice(&states[offset * dim..(offset + num_points) * dim]);
            }
            Trajectories::new(data, trajectories.controls().to_vec(), num_points, dim)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((windows, t[..num_points].to_vec()))
}
