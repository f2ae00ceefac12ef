//! Configuration management
//!
//! Provides unified configuration for the whole training pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::ColorSpace;
use crate::model::{FeatureLayer, GeneratorKind};
use crate::training::AdversarialLoss;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Loss weights
    pub loss: LossConfig,
    /// Training configuration
    pub training: TrainingSection,
    /// Dashboard configuration
    pub display: DisplayConfig,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root folder holding `train` and `val`
    pub data_path: String,
    /// Side of the square crops fed to the networks
    pub image_size: u32,
    /// Lower bound for the random resize of the shorter side
    pub resize_min: u32,
    /// Upper bound for the random resize of the shorter side
    pub resize_max: u32,
    /// Smallest texture patch side
    pub patch_size_min: u32,
    /// Largest texture patch side
    pub patch_size_max: u32,
    /// Number of texture patches pasted into each input
    pub num_input_texture_patch: usize,
    /// Batch size
    pub batch_size: usize,
    /// Colour space of tensors: "lab" or "rgb"
    pub color_space: ColorSpace,
    /// Batches decoded ahead of the training loop
    pub prefetch: usize,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Generator variant name
    pub model: String,
    /// Adversarial loss variant: "lsgan" or "dcgan"
    pub gan: String,
    /// Generator base filters
    pub ngf: i64,
    /// Discriminator base filters
    pub ndf: i64,
    /// Step label of the generator checkpoint to resume from
    pub load: Option<u64>,
    /// Step label of the discriminator checkpoint to resume from
    pub load_d: Option<u64>,
    /// Directory holding checkpoints to resume from
    pub load_dir: String,
    /// Pretrained VGG19 weights
    pub feature_weights: Option<String>,
    /// Content layer name, e.g. "relu4_2"
    pub content_layers: String,
    /// Comma separated style layer names
    pub style_layers: String,
}

/// Weights of the generator loss terms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Adversarial term
    pub discriminator_weight: f64,
    /// Pixel term on the L channel
    pub pixel_weight_l: f64,
    /// Pixel term on the AB channels
    pub pixel_weight_ab: f64,
    /// Pixel weight used for both pixel terms in rgb mode
    pub pixel_weight_rgb: f64,
    /// Feature (perceptual) term
    pub feature_weight: f64,
    /// Style (Gram) term
    pub style_weight: f64,
}

/// Training-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Number of epochs
    pub num_epoch: usize,
    /// Generator learning rate
    pub learning_rate: f64,
    /// Discriminator learning rate
    pub learning_rate_d: f64,
    /// Save checkpoints every N steps
    pub save_every: u64,
    /// Push visuals every N steps
    pub visualize_every: u64,
    /// Checkpoint directory
    pub save_dir: String,
    /// Device: "cpu", "cuda" or "cuda:N"
    pub device: String,
    /// Seed for torch and data RNGs
    pub seed: Option<u64>,
    /// Stop with an error when a loss turns NaN or infinite
    pub abort_on_non_finite: bool,
}

/// Where visuals go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Visdom dashboard
    Visdom,
    /// PNG and CSV files on disk
    Images,
    /// Discard
    None,
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Sink kind
    pub sink: SinkKind,
    /// Visdom server address
    pub server: String,
    /// Visdom server port
    pub port: u16,
    /// Visdom environment
    pub env: String,
    /// Output directory of the image sink
    pub image_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_path: "data".to_string(),
            image_size: 128,
            resize_min: 128,
            resize_max: 160,
            patch_size_min: 20,
            patch_size_max: 40,
            num_input_texture_patch: 1,
            batch_size: 32,
            color_space: ColorSpace::Lab,
            prefetch: 2,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "scribbler".to_string(),
            gan: "lsgan".to_string(),
            ngf: 32,
            ndf: 32,
            load: None,
            load_d: None,
            load_dir: "checkpoints".to_string(),
            feature_weights: None,
            content_layers: "relu4_2".to_string(),
            style_layers: "relu3_2, relu4_2".to_string(),
        }
    }
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            discriminator_weight: 1.0,
            pixel_weight_l: 1.0,
            pixel_weight_ab: 1.0,
            pixel_weight_rgb: 1.0,
            feature_weight: 1.0,
            style_weight: 1.0,
        }
    }
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            num_epoch: 100,
            learning_rate: 1e-4,
            learning_rate_d: 1e-4,
            save_every: 1000,
            visualize_every: 10,
            save_dir: "checkpoints".to_string(),
            device: "cpu".to_string(),
            seed: None,
            abort_on_non_finite: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Visdom,
            server: "http://localhost".to_string(),
            port: 8097,
            env: "main".to_string(),
            image_dir: "visuals".to_string(),
        }
    }
}

impl LossConfig {
    /// Pixel weights `(l, ab)` actually applied in the given colour space
    pub fn pixel_weights(&self, color_space: ColorSpace) -> (f64, f64) {
        match color_space {
            ColorSpace::Lab => (self.pixel_weight_l, self.pixel_weight_ab),
            ColorSpace::Rgb => (self.pixel_weight_rgb, self.pixel_weight_rgb),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from a file, picking the format by extension
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        if path.ends_with(".toml") {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        let name = self.training.device.to_lowercase();
        let index = match name.as_str() {
            "cuda" | "gpu" => Some(0),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse::<usize>().ok()),
        };

        match index {
            Some(idx) if tch::Cuda::is_available() => tch::Device::Cuda(idx),
            Some(_) => {
                tracing::warn!("CUDA requested but not available, falling back to CPU");
                tch::Device::Cpu
            }
            None => tch::Device::Cpu,
        }
    }

    /// Generator variant, falling back to Scribbler on unknown names
    pub fn generator_kind(&self) -> GeneratorKind {
        GeneratorKind::resolve(&self.model.model)
    }

    /// Adversarial loss variant, falling back to least squares on unknown names
    pub fn adversarial_loss(&self) -> AdversarialLoss {
        AdversarialLoss::resolve(&self.model.gan)
    }

    /// Parsed content layers
    pub fn content_layers(&self) -> crate::Result<Vec<FeatureLayer>> {
        FeatureLayer::parse_list(&self.model.content_layers)
    }

    /// Parsed style layers
    pub fn style_layers(&self) -> crate::Result<Vec<FeatureLayer>> {
        FeatureLayer::parse_list(&self.model.style_layers)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let data = &self.data;
        if data.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        if data.image_size < 16 {
            anyhow::bail!("Image size must be at least 16");
        }
        let kind = self.generator_kind();
        let multiple = kind.size_multiple(data.image_size as i64);
        if data.image_size as i64 % multiple != 0 {
            anyhow::bail!(
                "Image size {} must be a multiple of {} for the {} generator",
                data.image_size,
                multiple,
                kind
            );
        }
        if data.resize_min < data.image_size {
            anyhow::bail!("resize_min must be >= image_size");
        }
        if data.resize_max < data.resize_min {
            anyhow::bail!("resize_max must be >= resize_min");
        }
        if data.patch_size_min == 0
            || data.patch_size_max < data.patch_size_min
            || data.patch_size_max > data.image_size
        {
            anyhow::bail!("Texture patch sizes must satisfy 0 < min <= max <= image_size");
        }
        if self.model.ngf <= 0 || self.model.ndf <= 0 {
            anyhow::bail!("Filter counts must be > 0");
        }
        if self.training.num_epoch == 0 {
            anyhow::bail!("Number of epochs must be > 0");
        }
        if self.training.save_every == 0 || self.training.visualize_every == 0 {
            anyhow::bail!("save_every and visualize_every must be > 0");
        }
        if self.content_layers()?.is_empty() || self.style_layers()?.is_empty() {
            anyhow::bail!("At least one content and one style layer are required");
        }
        Ok(())
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        let config = Config::default();
        if path.ends_with(".toml") {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}
