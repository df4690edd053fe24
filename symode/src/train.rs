//! # Training loop
//!
//! Every epoch walks the train windows in order. For each window the model
//! integrates all trials of the window from their first state, the mean
//! squared error against the ground truth is backpropagated through the
//! solve, and Adam takes exactly one step. The test window with the same
//! index is then integrated forward only, for logging.
//!
//! After the last epoch [`fit`] integrates the full trajectories and reports
//! the per-trajectory mean Euclidean distance, which is the headline metric.

use std::time::Instant;

use ml::{
    backprop_checkpointed, l2_loss, l2_loss_grad, l2_loss_value, odeint, odeint_values, Adam,
    GradAccumulator, GradientMode, Module, Solver, Tape, Tensor, TensorStore, VectorField,
};

use crate::data::{arrange_data, Dataset, Trajectories};
use crate::error::TrainError;
use crate::model::DynamicsModel;
use crate::stats::{EpochStats, Stats};

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub learn_rate: f32,
    /// L2 penalty folded into the Adam gradient.
    pub weight_decay: f32,
    /// Epochs run are `0..=total_steps`.
    pub total_steps: usize,
    pub print_every: usize,
    pub verbose: bool,
    /// Window length `P`, including the initial state.
    pub num_points: usize,
    pub solver: Solver,
    pub gradient: GradientMode,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learn_rate: 1e-4,
            weight_decay: 5e-5,
            total_steps: 2000,
            print_every: 200,
            verbose: false,
            num_points: 2,
            solver: Solver::Rk4,
            gradient: GradientMode::Direct,
        }
    }
}

/// Timings and loss of one optimizer cycle.
#[derive(Clone, Copy, Debug)]
struct WindowOutcome {
    loss: f32,
    forward_time: f64,
    backward_time: f64,
    nfe: usize,
}

pub struct Trainer {
    model: DynamicsModel,
    optimizer: Adam,
    config: TrainConfig,
    train_windows: Vec<Trajectories>,
    test_windows: Vec<Trajectories>,
    t: Vec<f32>,
    stats: Stats,
}

impl Trainer {
    /// Arranges both trajectory sets into windows of `config.num_points`.
    ///
    /// # Errors
    ///
    /// [`TrainError::StateDimension`] if the data does not fit the model,
    /// [`TrainError::GridMismatch`] if train and test lengths differ, and any
    /// arrangement error.
    pub fn new(
        model: DynamicsModel,
        train: &Trajectories,
        test: &Trajectories,
        t: &[f32],
        config: TrainConfig,
    ) -> Result<Self, TrainError> {
        for set in [train, test] {
            if set.state_dim() != model.state_dim() {
                return Err(TrainError::StateDimension {
                    expected: model.state_dim(),
                    got: set.state_dim(),
                });
            }
        }
        if train.timesteps() != test.timesteps() {
            return Err(TrainError::GridMismatch);
        }
        let (train_windows, local_t) = arrange_data(train, t, config.num_points)?;
        let (test_windows, _) = arrange_data(test, t, config.num_points)?;
        let optimizer =
            Adam::new(&model.params(), config.learn_rate).with_weight_decay(config.weight_decay);
        Ok(Self {
            model,
            optimizer,
            config,
            train_windows,
            test_windows,
            t: local_t,
            stats: Stats::default(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &DynamicsModel {
        &self.model
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[must_use]
    pub fn windows(&self) -> usize {
        self.train_windows.len()
    }

    /// Optimizer steps taken so far.
    #[must_use]
    pub fn optimizer_steps(&self) -> usize {
        self.optimizer.steps()
    }

    #[must_use]
    pub fn into_parts(self) -> (DynamicsModel, Stats) {
        (self.model, self.stats)
    }

    /// Runs every epoch `0..=total_steps`.
    ///
    /// # Errors
    ///
    /// See [`run_epoch`](Self::run_epoch).
    pub fn train(&mut self) -> Result<(), TrainError> {
        for epoch in 0..=self.config.total_steps {
            let epoch_stats = self.run_epoch(epoch)?;
            if self.config.verbose && epoch % self.config.print_every.max(1) == 0 {
                tracing::info!(
                    "step {epoch}, train_loss {:.4e}, test_loss {:.4e}",
                    epoch_stats.train_loss,
                    epoch_stats.test_loss
                );
            }
        }
        Ok(())
    }

    /// One optimizer step per train window, each followed by a forward pass
    /// on the matching test window. The epoch is appended to the stats.
    ///
    /// # Errors
    ///
    /// [`TrainError::NonFiniteLoss`] as soon as a window loss is NaN or
    /// infinite, and any solver error.
    pub fn run_epoch(&mut self, epoch: usize) -> Result<EpochStats, TrainError> {
        let mut train_loss = 0.0;
        let mut test_loss = 0.0;
        let mut last = WindowOutcome { loss: 0.0, forward_time: 0.0, backward_time: 0.0, nfe: 0 };

        for i in 0..self.train_windows.len() {
            let outcome = self.train_window(i, epoch)?;
            train_loss += outcome.loss;
            last = outcome;

            if let Some(window) = self.test_windows.get(i) {
                let loss = window_loss(&self.model, window, &self.t, self.config.solver)?;
                if !loss.is_finite() {
                    return Err(TrainError::NonFiniteLoss { epoch, window: i });
                }
                test_loss += loss;
            }
        }

        let epoch_stats = EpochStats {
            train_loss,
            test_loss,
            forward_time: last.forward_time,
            backward_time: last.backward_time,
            nfe: last.nfe,
        };
        self.stats.push_epoch(epoch_stats);
        Ok(epoch_stats)
    }

    fn train_window(&mut self, index: usize, epoch: usize) -> Result<WindowOutcome, TrainError> {
        let window = &self.train_windows[index];
        let solver = self.config.solver;
        let target = window.data();
        self.model.reset_nfe();
        let mut acc = GradAccumulator::new(&self.model.params());

        let (loss, forward_time, backward_time) = match self.config.gradient {
            GradientMode::Direct => {
                let start = Instant::now();
                let mut tape = Tape::new();
                let mut tensors = TensorStore::new();
                let mut predicted = Vec::with_capacity(window.trials() * self.t.len());
                for trial in 0..window.trials() {
                    let start = window.state(trial, 0).to_vec();
                    let y0 = Tensor::from_vec(vec![window.state_dim()], start);
                    let states = odeint(
                        &self.model,
                        &y0,
                        &self.t,
                        window.control(trial),
                        solver,
                        &mut tape,
                        &mut tensors,
                    )?;
                    predicted.extend(states);
                }
                let pred = Tensor::concat_all(&predicted, &mut tape, &mut tensors);
                let target = Tensor::from_vec(vec![target.len()], target.to_vec());
                let loss = l2_loss(&pred, &target, &mut tape, &mut tensors);
                let forward_time = start.elapsed().as_secs_f64();
                if !loss.data[0].is_finite() {
                    return Err(TrainError::NonFiniteLoss { epoch, window: index });
                }

                let start = Instant::now();
                tape.backward(&loss, &mut tensors)?;
                acc.absorb(&tensors);
                (loss.data[0], forward_time, start.elapsed().as_secs_f64())
            }
            GradientMode::Checkpointed => {
                let start = Instant::now();
                let mut trials = Vec::with_capacity(window.trials());
                for trial in 0..window.trials() {
                    trials.push(odeint_values(
                        &self.model,
                        window.state(trial, 0),
                        &self.t,
                        window.control(trial),
                        solver,
                    )?);
                }
                let pred: Vec<f32> = trials.iter().flatten().flatten().copied().collect();
                let loss = l2_loss_value(&pred, target);
                let forward_time = start.elapsed().as_secs_f64();
                if !loss.is_finite() {
                    return Err(TrainError::NonFiniteLoss { epoch, window: index });
                }

                let start = Instant::now();
                let grad = l2_loss_grad(&pred, target);
                let dim = window.state_dim();
                let per_trial = self.t.len() * dim;
                for (trial, states) in trials.iter().enumerate() {
                    let span = trial * per_trial..(trial + 1) * per_trial;
                    let output_grads: Vec<Vec<f32>> = grad[span]
                        .chunks(dim)
                        .map(<[f32]>::to_vec)
                        .collect();
                    backprop_checkpointed(
                        &self.model,
                        states,
                        &self.t,
                        window.control(trial),
                        solver,
                        &output_grads,
                        |store| acc.absorb(store),
                    )?;
                }
                (loss, forward_time, start.elapsed().as_secs_f64())
            }
        };

        let nfe = self.model.nfe();
        acc.apply(&mut self.model.params_mut());
        self.optimizer.step(&mut self.model.params_mut());
        tracing::debug!(epoch, window = index, loss, nfe, "window step");
        Ok(WindowOutcome { loss, forward_time, backward_time, nfe })
    }
}

/// Forward-only mean squared error of a window.
fn window_loss(
    model: &DynamicsModel,
    window: &Trajectories,
    t: &[f32],
    solver: Solver,
) -> Result<f32, TrainError> {
    let mut pred = Vec::with_capacity(window.data().len());
    for trial in 0..window.trials() {
        let (y0, u) = (window.state(trial, 0), window.control(trial));
        let states = odeint_values(model, y0, t, u, solver)?;
        pred.extend(states.into_iter().flatten());
    }
    Ok(l2_loss_value(&pred, window.data()))
}

/// Distance between predicted and true full trajectories.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryReport {
    /// Mean over timesteps of the Euclidean state error, one entry per trajectory.
    pub per_trajectory: Vec<f32>,
    pub mean: f32,
    /// Sample standard deviation of `per_trajectory`; zero for fewer than two.
    pub std: f32,
}

/// Integrates every trajectory from its first state over the whole grid.
///
/// # Errors
///
/// Any solver error, or [`TrainError::StateDimension`] for mismatched data.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate_trajectories(
    model: &DynamicsModel,
    trajectories: &Trajectories,
    t: &[f32],
    solver: Solver,
) -> Result<TrajectoryReport, TrainError> {
    if trajectories.state_dim() != model.state_dim() {
        return Err(TrainError::StateDimension {
            expected: model.state_dim(),
            got: trajectories.state_dim(),
        });
    }
    let dim = trajectories.state_dim();
    let mut per_trajectory = Vec::with_capacity(trajectories.trials());
    for trial in 0..trajectories.trials() {
        let (y0, u) = (trajectories.state(trial, 0), trajectories.control(trial));
        let predicted = odeint_values(model, y0, t, u, solver)?;
        let truth = trajectories.trajectory(trial).chunks(dim);
        let total: f32 = predicted
            .iter()
            .zip(truth)
            .map(|(p, y)| p.iter().zip(y).map(|(a, b)| (a - b).powi(2)).sum::<f32>().sqrt())
            .sum();
        per_trajectory.push(total / predicted.len() as f32);
    }

    let n = per_trajectory.len() as f32;
    let mean = per_trajectory.iter().sum::<f32>() / n;
    let std = if per_trajectory.len() < 2 {
        0.0
    } else {
        (per_trajectory.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / (n - 1.0)).sqrt()
    };
    Ok(TrajectoryReport { per_trajectory, mean, std })
}

/// Trains `model` on the windows of `dataset`, then evaluates it on the full
/// train and test trajectories.
///
/// # Errors
///
/// Any error of [`Trainer::new`], [`Trainer::train`] or
/// [`evaluate_trajectories`].
pub fn fit(
    model: DynamicsModel,
    dataset: &Dataset,
    config: TrainConfig,
) -> Result<(DynamicsModel, Stats), TrainError> {
    let solver = config.solver;
    if config.verbose {
        tracing::info!(
            "Training {} ODE model with num of points = {}:",
            model.kind(),
            config.num_points
        );
    }
    let mut trainer = Trainer::new(model, &dataset.x, &dataset.test_x, &dataset.t, config)?;
    trainer.train()?;
    let (model, mut stats) = trainer.into_parts();

    let train = evaluate_trajectories(&model, &dataset.x, &dataset.t, solver)?;
    let test = evaluate_trajectories(&model, &dataset.test_x, &dataset.t, solver)?;
    tracing::info!(
        "Final trajectory train loss {:.4e} +/- {:.4e}, test loss {:.4e} +/- {:.4e}",
        train.mean,
        train.std,
        test.mean,
        test.std
    );
    stats.traj_train_loss = train.per_trajectory;
    stats.traj_test_loss = test.per_trajectory;
    Ok((model, stats))
}
