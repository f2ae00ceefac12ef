//! Visuals written to a directory
//!
//! Image grids land in `{dir}/{step}_{window}.png` and the loss series in
//! `{dir}/loss_history.csv`, rewritten on every update.

use std::path::{Path, PathBuf};
use tch::Tensor;

use super::{make_grid, VisualSink};
use crate::error::{Error, Result};
use crate::training::LossHistory;

/// Directory sink
#[derive(Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
}

impl ImageDirSink {
    /// Create the sink, making the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl VisualSink for ImageDirSink {
    fn name(&self) -> &'static str {
        "images"
    }

    fn images(&mut self, window: &str, images: &Tensor, step: u64) -> Result<()> {
        let nrow = (images.size()[0] as f64).sqrt().ceil() as i64;
        let grid = make_grid(images, nrow, 2)?;
        let path = self.dir.join(format!("{}_{}.png", step, window));
        grid.save(&path).map_err(|e| Error::image(&path, e))
    }

    fn losses(&mut self, history: &LossHistory, _step: u64) -> Result<()> {
        history.save_csv(self.dir.join("loss_history.csv"))
    }
}
