mod common;

use std::path::Path;

use common::small_model;
use ml::{NoGrad, Solver, Tensor, TensorStore, VectorField};
use symode::{artifact_paths, Checkpoint, EpochStats, ModelKind, PersistError, Stats};

#[test]
fn stats_round_trip_exactly() {
    let mut stats = Stats::default();
    for (i, loss) in [0.1f32, 1e-7, 3.402_823_5e38, 123.456].into_iter().enumerate() {
        stats.push_epoch(EpochStats {
            train_loss: loss,
            test_loss: loss / 3.0,
            forward_time: 0.001 * i as f64,
            backward_time: 1.0 / 3.0,
            nfe: i * 4,
        });
    }
    stats.traj_train_loss = vec![0.25, 0.3];
    stats.traj_test_loss = vec![1.0 / 7.0];

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run-stats.pkl");
    stats.save(&path).unwrap();
    assert_eq!(Stats::load(&path).unwrap(), stats);
}

#[test]
fn artifact_names_encode_the_configuration() {
    let dir = Path::new("/tmp/runs");
    let cases = [
        (ModelKind::Naive, "pend-naive_ode-rk4-p2"),
        (ModelKind::Baseline, "pend-baseline_ode-rk4-p2"),
        (ModelKind::Hamiltonian, "pend-hnn_ode-rk4-p2"),
        (ModelKind::Structured, "pend-hnn_ode-struct-rk4-p2"),
    ];
    for (kind, stem) in cases {
        let paths = artifact_paths(dir, "pend", kind, Solver::Rk4, 2);
        assert_eq!(paths.model, dir.join(format!("{stem}.tar")));
        assert_eq!(paths.stats, dir.join(format!("{stem}-stats.pkl")));
    }
    let paths = artifact_paths(dir, "acro", ModelKind::Structured, Solver::Midpoint, 5);
    assert_eq!(paths.model, dir.join("acro-hnn_ode-struct-midpoint-p5.tar"));
}

fn derivative(model: &symode::DynamicsModel) -> Vec<f32> {
    let x = Tensor::from_vec(vec![4], vec![0.3, -0.1, 0.2, 0.5]);
    model.derivative(0.0, &x, 1.0, &mut NoGrad::new(), &mut TensorStore::new()).data
}

#[test]
fn checkpoint_restores_parameters() {
    let trained = small_model(ModelKind::Structured, 2, 1);
    let mut fresh = small_model(ModelKind::Structured, 2, 2);
    assert_ne!(derivative(&trained), derivative(&fresh));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.tar");
    Checkpoint::from_model(&trained).save(&path).unwrap();
    Checkpoint::load(&path).unwrap().restore(&mut fresh).unwrap();
    assert_eq!(derivative(&trained), derivative(&fresh));
}

#[test]
fn checkpoint_layout_must_match() {
    let structured = Checkpoint::from_model(&small_model(ModelKind::Structured, 2, 1));
    let mut naive = small_model(ModelKind::Naive, 2, 1);
    assert!(matches!(structured.restore(&mut naive), Err(PersistError::KindMismatch { .. })));

    let mut truncated = structured.clone();
    truncated.parameters.pop();
    let mut target = small_model(ModelKind::Structured, 2, 3);
    assert!(matches!(truncated.restore(&mut target), Err(PersistError::ParameterCount { .. })));

    let mut reshaped = structured.clone();
    reshaped.parameters[0].shape.reverse();
    reshaped.parameters[0].shape.push(1);
    assert!(matches!(reshaped.restore(&mut target), Err(PersistError::ParameterShape { .. })));
}

#[test]
fn loading_garbage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken-stats.pkl");
    std::fs::write(&path, b"not json").unwrap();
    assert!(matches!(Stats::load(&path), Err(PersistError::Json(_))));
    assert!(matches!(Stats::load(&dir.path().join("missing")), Err(PersistError::Io(_))));
}
