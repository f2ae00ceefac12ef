//! Checkpoint save/load utilities
//!
//! Each network is written on its own as `{step}_net_{label}.pth`, with a
//! `{step}_meta.json` file describing the training state next to the pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tch::nn::VarStore;

use crate::error::{Error, Result};
use crate::model::ModelBundle;
use crate::training::LossHistory;

/// Which network a checkpoint holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkLabel {
    /// Generator
    G,
    /// Discriminator
    D,
}

impl fmt::Display for NetworkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkLabel::G => write!(f, "G"),
            NetworkLabel::D => write!(f, "D"),
        }
    }
}

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Global step the checkpoint was taken at
    pub step: u64,
    /// Epoch the step belongs to
    pub epoch: usize,
    /// Latest value of every loss series
    pub losses: BTreeMap<String, f64>,
    /// Generator variant
    pub model: String,
    /// Timestamp of checkpoint
    pub timestamp: String,
}

/// Path of a network checkpoint: `{dir}/{step}_net_{label}.pth`
pub fn checkpoint_path(dir: impl AsRef<Path>, label: NetworkLabel, step: u64) -> PathBuf {
    dir.as_ref().join(format!("{}_net_{}.pth", step, label))
}

fn meta_path(dir: impl AsRef<Path>, step: u64) -> PathBuf {
    dir.as_ref().join(format!("{}_meta.json", step))
}

/// Save one network's parameters
pub fn save_network(
    vs: &VarStore,
    label: NetworkLabel,
    step: u64,
    dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir.as_ref())?;
    let path = checkpoint_path(dir, label, step);
    vs.save(&path)?;
    Ok(path)
}

/// Restore one network's parameters
///
/// A missing file is reported as [`Error::CheckpointNotFound`].
pub fn load_network(
    vs: &mut VarStore,
    label: NetworkLabel,
    step: u64,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let path = checkpoint_path(dir, label, step);
    if !path.is_file() {
        return Err(Error::CheckpointNotFound { path });
    }
    vs.load(&path)?;
    tracing::info!("Loaded {} from step {}", label, step);
    Ok(())
}

/// Save both networks plus metadata for the given step
///
/// # Returns
///
/// Path of the metadata file
pub fn save_checkpoint(
    bundle: &ModelBundle,
    history: &LossHistory,
    step: u64,
    epoch: usize,
    dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    save_network(&bundle.gen_vs, NetworkLabel::G, step, dir)?;
    save_network(&bundle.disc_vs, NetworkLabel::D, step, dir)?;

    let meta = CheckpointMeta {
        step,
        epoch,
        losses: history.latest(),
        model: bundle.kind().name().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let path = meta_path(dir, step);
    std::fs::write(&path, serde_json::to_string_pretty(&meta)?)?;

    tracing::info!("Saved checkpoint for step {} to {}", step, dir.display());
    Ok(path)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta(dir: impl AsRef<Path>, step: u64) -> Result<CheckpointMeta> {
    let content = std::fs::read_to_string(meta_path(dir, step))?;
    let meta: CheckpointMeta = serde_json::from_str(&content)?;
    Ok(meta)
}
