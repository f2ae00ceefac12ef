//! Generator networks
//!
//! Every variant maps the 5-channel input stack (sketch, texture patch,
//! segment) to a 3-channel image in `[-1, 1]`.

use std::fmt;
use tch::{nn, nn::ModuleT, Tensor};

use super::pix2pix::{unet_depth, UnetGenerator};
use super::scribbler::Scribbler;
use super::scribbler_dilate::ScribblerDilate128;
use super::texturegan::TextureGan;

/// Generator variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Residual encoder/decoder
    Scribbler,
    /// Residual encoder/decoder with skip connections
    TextureGan,
    /// U-Net
    Pix2Pix,
    /// Scribbler with a dilated bottleneck
    ScribblerDilate128,
}

impl GeneratorKind {
    /// Look up a variant by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "scribbler" => Some(GeneratorKind::Scribbler),
            "texturegan" => Some(GeneratorKind::TextureGan),
            "pix2pix" => Some(GeneratorKind::Pix2Pix),
            "scribbler_dilate_128" => Some(GeneratorKind::ScribblerDilate128),
            _ => None,
        }
    }

    /// Like [`GeneratorKind::from_name`], falling back to Scribbler with a warning
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            tracing::warn!("Model `{}` not supported, using Scribbler", name);
            GeneratorKind::Scribbler
        })
    }

    /// Configuration name
    pub fn name(self) -> &'static str {
        match self {
            GeneratorKind::Scribbler => "scribbler",
            GeneratorKind::TextureGan => "texturegan",
            GeneratorKind::Pix2Pix => "pix2pix",
            GeneratorKind::ScribblerDilate128 => "scribbler_dilate_128",
        }
    }

    /// Factor the image side must be a multiple of for the output to match
    /// the input size
    pub fn size_multiple(self, image_size: i64) -> i64 {
        match self {
            GeneratorKind::Scribbler | GeneratorKind::TextureGan => 8,
            GeneratorKind::ScribblerDilate128 => 4,
            GeneratorKind::Pix2Pix => 1 << unet_depth(image_size),
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of input channels
    pub input_nc: i64,
    /// Number of output channels
    pub output_nc: i64,
    /// Base number of filters
    pub ngf: i64,
    /// Side of the square inputs; sets the U-Net depth
    pub image_size: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_nc: 5,
            output_nc: 3,
            ngf: 32,
            image_size: 128,
        }
    }
}

#[derive(Debug)]
enum Network {
    Scribbler(Scribbler),
    TextureGan(TextureGan),
    Pix2Pix(UnetGenerator),
    ScribblerDilate128(ScribblerDilate128),
}

/// Generator network
#[derive(Debug)]
pub struct Generator {
    kind: GeneratorKind,
    config: GeneratorConfig,
    net: Network,
}

impl Generator {
    /// Create a generator of the given variant
    pub fn new(vs: &nn::Path, kind: GeneratorKind, config: GeneratorConfig) -> Self {
        let (i, o, f) = (config.input_nc, config.output_nc, config.ngf);
        let net = match kind {
            GeneratorKind::Scribbler => Network::Scribbler(Scribbler::new(vs, i, o, f)),
            GeneratorKind::TextureGan => Network::TextureGan(TextureGan::new(vs, i, o, f)),
            GeneratorKind::Pix2Pix => {
                Network::Pix2Pix(UnetGenerator::new(vs, i, o, f, config.image_size))
            }
            GeneratorKind::ScribblerDilate128 => {
                Network::ScribblerDilate128(ScribblerDilate128::new(vs, i, o, f))
            }
        };

        Self { kind, config, net }
    }

    /// Synthesise images from an input stack
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, input_nc, height, width)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, output_nc, height, width)
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        match &self.net {
            Network::Scribbler(net) => net.forward_t(input, train),
            Network::TextureGan(net) => net.forward_t(input, train),
            Network::Pix2Pix(net) => net.forward_t(input, train),
            Network::ScribblerDilate128(net) => net.forward_t(input, train),
        }
    }

    /// Generate samples (inference mode)
    pub fn generate(&self, input: &Tensor) -> Tensor {
        tch::no_grad(|| self.forward_t(input, false))
    }

    /// Variant of this generator
    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}
