//! Artifact naming and model checkpoints.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ml::{Module, Solver};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::model::{DynamicsModel, ModelKind};

/// Where a run stores its model and its stats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub stats: PathBuf,
}

/// `{name}{label}{struct}-{solver}-p{num_points}.tar` and the matching `-stats.pkl`.
///
/// Both files hold JSON; the extensions only keep the names recognizable to
/// downstream tooling.
#[must_use]
pub fn artifact_paths(
    save_dir: &Path,
    name: &str,
    kind: ModelKind,
    solver: Solver,
    num_points: usize,
) -> ArtifactPaths {
    let stem = format!("{name}{}{}-{solver}-p{num_points}", kind.label(), kind.struct_suffix());
    ArtifactPaths {
        model: save_dir.join(format!("{stem}.tar")),
        stats: save_dir.join(format!("{stem}-stats.pkl")),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedParameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Parameter values of a [`DynamicsModel`], keyed by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub kind: String,
    pub num_angle: usize,
    pub parameters: Vec<NamedParameter>,
}

impl Checkpoint {
    #[must_use]
    pub fn from_model(model: &DynamicsModel) -> Self {
        let parameters = model
            .named_params()
            .into_iter()
            .map(|(name, p)| NamedParameter { name, shape: p.shape.clone(), data: p.data.clone() })
            .collect();
        Self { kind: model.kind().name().to_string(), num_angle: model.num_angle(), parameters }
    }

    /// Copies the stored values into `model`, which must have the same layout.
    ///
    /// # Errors
    ///
    /// [`PersistError::KindMismatch`], [`PersistError::ParameterCount`] or
    /// [`PersistError::ParameterShape`] if the layouts differ. Nothing is
    /// written in that case.
    pub fn restore(&self, model: &mut DynamicsModel) -> Result<(), PersistError> {
        let expected_kind = format!("{}/{}", model.kind().name(), model.num_angle());
        let found_kind = format!("{}/{}", self.kind, self.num_angle);
        if expected_kind != found_kind {
            return Err(PersistError::KindMismatch { expected: expected_kind, found: found_kind });
        }
        let named = model.named_params();
        if named.len() != self.parameters.len() {
            return Err(PersistError::ParameterCount {
                expected: named.len(),
                got: self.parameters.len(),
            });
        }
        for ((name, p), stored) in named.iter().zip(&self.parameters) {
            let same_layout = p.shape == stored.shape && p.data.len() == stored.data.len();
            if *name != stored.name || !same_layout {
                return Err(PersistError::ParameterShape {
                    name: name.clone(),
                    expected: p.shape.clone(),
                    got: stored.shape.clone(),
                });
            }
        }
        for (p, stored) in model.params_mut().into_iter().zip(&self.parameters) {
            p.data.copy_from_slice(&stored.data);
            p.grad = None;
        }
        Ok(())
    }

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
