//! # Application entry
//!
//! [`run`] drives one complete experiment: generate the dataset, allocate
//! the model, train it, evaluate full trajectories and write the model and
//! stats artifacts to the save directory.

use anyhow::{Context, Result};
use ml::Module;
use tracing::Level;

use crate::checkpoint::{artifact_paths, Checkpoint};
use crate::config::Args;
use crate::data::get_dataset;
use crate::model::DynamicsModel;
use crate::train::fit;

/// Runs the experiment described by `args`.
///
/// # Errors
///
/// Returns configuration, data, training and persistence errors. Flag
/// conflicts are reported before anything is allocated.
pub fn run(args: Args) -> Result<()> {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    let config = args.into_config()?;
    let dataset = get_dataset(&config.dataset)?;

    let model = DynamicsModel::new(&config.model)?;
    tracing::info!("model contains {} parameters", model.num_params());

    let (model, stats) = fit(model, &dataset, config.train.clone())?;

    std::fs::create_dir_all(&config.save_dir)
        .with_context(|| format!("creating {}", config.save_dir.display()))?;
    let paths = artifact_paths(
        &config.save_dir,
        &config.name,
        config.model.kind,
        config.train.solver,
        config.train.num_points,
    );
    Checkpoint::from_model(&model).save(&paths.model)?;
    stats.save(&paths.stats)?;
    tracing::info!(
        model = %paths.model.display(),
        stats = %paths.stats.display(),
        "artifacts saved"
    );
    Ok(())
}
