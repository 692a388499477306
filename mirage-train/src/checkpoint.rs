//! Single-artifact checkpointing.
//!
//! A checkpoint bundles the model parameter record, the optimizer state
//! record, and the step counter into one record, serialized through the
//! framework's binary file recorder at full precision. Each save writes the
//! step-stamped snapshot and the rolling latest artifact independently.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::record::{
    BinFileRecorder, FullPrecisionSettings, PrecisionSettings, Record, Recorder, RecorderError,
};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur while saving or restoring checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(PathBuf),
    #[error("checkpoint serialization failed: {0}")]
    Record(#[from] RecorderError),
}

/// One checkpoint: model parameters, optimizer state, and the step they
/// were captured at.
pub struct CheckpointRecord<B: Backend, MR, OR> {
    model: MR,
    optimizer: OR,
    step: usize,
    marker: PhantomData<B>,
}

impl<B: Backend, MR, OR> CheckpointRecord<B, MR, OR> {
    pub fn new(model: MR, optimizer: OR, step: usize) -> Self {
        Self {
            model,
            optimizer,
            step,
            marker: PhantomData,
        }
    }

    /// The step the checkpoint was captured at.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Split into `(model record, optimizer record, step)`.
    pub fn into_parts(self) -> (MR, OR, usize) {
        (self.model, self.optimizer, self.step)
    }
}

/// Serialized form of a checkpoint.
#[derive(Serialize, Deserialize, Clone)]
pub struct CheckpointItem<MI, OI> {
    model: MI,
    optimizer: OI,
    step: usize,
}

impl<B, MR, OR> Record<B> for CheckpointRecord<B, MR, OR>
where
    B: Backend,
    MR: Record<B>,
    OR: Record<B>,
{
    type Item<S: PrecisionSettings> = CheckpointItem<MR::Item<S>, OR::Item<S>>;

    fn into_item<S: PrecisionSettings>(self) -> Self::Item<S> {
        CheckpointItem {
            model: self.model.into_item::<S>(),
            optimizer: self.optimizer.into_item::<S>(),
            step: self.step,
        }
    }

    fn from_item<S: PrecisionSettings>(item: Self::Item<S>, device: &B::Device) -> Self {
        Self {
            model: MR::from_item::<S>(item.model, device),
            optimizer: OR::from_item::<S>(item.optimizer, device),
            step: item.step,
            marker: PhantomData,
        }
    }
}

/// Path stem of the rolling latest checkpoint under a log directory.
///
/// The recorder owns the file extension; see [`artifact_path`].
pub fn latest_path(log_dir: &Path) -> PathBuf {
    log_dir.join("model")
}

/// Path stem of the snapshot for a given step.
pub fn step_path(log_dir: &Path, step: usize) -> PathBuf {
    log_dir.join(format!("model_{step}"))
}

/// The file the recorder actually writes for a checkpoint path stem.
pub fn artifact_path(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

/// Serialize `{model, optimizer, step}` as one artifact at `path`.
pub fn save<B, MR, OR>(
    model: MR,
    optimizer: OR,
    step: usize,
    path: &Path,
) -> Result<(), CheckpointError>
where
    B: Backend,
    MR: Record<B>,
    OR: Record<B>,
{
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    recorder.record(
        CheckpointRecord::<B, MR, OR>::new(model, optimizer, step),
        path.to_path_buf(),
    )?;
    debug!(path = %artifact_path(path).display(), step, "checkpoint written");
    Ok(())
}

/// Restore a checkpoint written by [`save`].
pub fn load<B, MR, OR>(
    path: &Path,
    device: &B::Device,
) -> Result<CheckpointRecord<B, MR, OR>, CheckpointError>
where
    B: Backend,
    MR: Record<B>,
    OR: Record<B>,
{
    let artifact = artifact_path(path);
    if !artifact.exists() {
        return Err(CheckpointError::NotFound(artifact));
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    Ok(recorder.load(path.to_path_buf(), device)?)
}
