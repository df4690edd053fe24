use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;

/// Per-epoch training metrics plus the final per-trajectory distances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub train_loss: Vec<f32>,
    pub test_loss: Vec<f32>,
    /// Seconds spent in the forward solve of the epoch's last window.
    pub forward_time: Vec<f64>,
    pub backward_time: Vec<f64>,
    pub nfe: Vec<usize>,
    #[serde(default)]
    pub traj_train_loss: Vec<f32>,
    #[serde(default)]
    pub traj_test_loss: Vec<f32>,
}

/// One epoch's entry in [`Stats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    pub train_loss: f32,
    pub test_loss: f32,
    pub forward_time: f64,
    pub backward_time: f64,
    pub nfe: usize,
}

impl Stats {
    pub fn push_epoch(&mut self, epoch: EpochStats) {
        self.train_loss.push(epoch.train_loss);
        self.test_loss.push(epoch.test_loss);
        self.forward_time.push(epoch.forward_time);
        self.backward_time.push(epoch.backward_time);
        self.nfe.push(epoch.nfe);
    }

    #[must_use]
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    /// Writes the record as JSON.
    ///
    /// # Errors
    ///
    /// Any I/O or serialization failure.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Any I/O or deserialization failure.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
