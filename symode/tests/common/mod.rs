#![allow(dead_code)]

use ml::Module;
use physics::{simulate, SystemKind};
use symode::{DynamicsModel, HiddenWidths, ModelConfig, ModelKind, Trajectories};

pub fn small_model(kind: ModelKind, num_angle: usize, seed: u64) -> DynamicsModel {
    let config = ModelConfig {
        num_angle,
        kind,
        hidden: HiddenWidths::uniform(12),
        seed,
        ..ModelConfig::default()
    };
    DynamicsModel::new(&config).unwrap()
}

/// Pulls the learned mass matrix towards the identity so the dynamics stay
/// well conditioned: the factor keeps a small position dependence around `L = I`.
pub fn condition_mass(model: &mut DynamicsModel) {
    let n = model.num_angle();
    let last = model
        .named_params()
        .iter()
        .filter(|(name, _)| name.starts_with("mass."))
        .map(|(name, _)| name.clone())
        .last()
        .unwrap();
    let last_layer = last.trim_end_matches(".b").to_string();
    let names: Vec<String> = model.named_params().into_iter().map(|(name, _)| name).collect();
    for (name, p) in names.iter().zip(model.params_mut()) {
        if *name == format!("{last_layer}.w") {
            for w in &mut p.data {
                *w *= 0.3;
            }
        } else if *name == format!("{last_layer}.b") {
            for (i, b) in p.data.iter_mut().enumerate() {
                *b = if i < n { 1.0 } else { 0.0 };
            }
        }
    }
}

/// Ground-truth trajectories of `system` with one trial per initial state.
pub fn simulated(
    system: SystemKind,
    initials: &[Vec<f64>],
    u: f32,
    dt: f32,
    timesteps: usize,
) -> Trajectories {
    let sys = system.build();
    let mut data = Vec::new();
    for initial in initials {
        let states =
            simulate(sys.as_ref(), initial, f64::from(u), f64::from(dt), timesteps, 10).unwrap();
        data.extend(states.iter().flatten().map(|&v| v as f32));
    }
    Trajectories::new(data, vec![u; initials.len()], timesteps, sys.state_dim()).unwrap()
}

pub fn grid(points: usize, dt: f32) -> Vec<f32> {
    (0..points).map(|k| k as f32 * dt).collect()
}
