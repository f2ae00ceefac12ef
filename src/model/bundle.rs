//! Everything a training step mutates, owned in one place
//!
//! The bundle holds both networks with their var stores and optimizers, the
//! shared feature network, the criterions and the adversarial labels.

use std::rc::Rc;
use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::features::{FeatureExtractor, Vgg19Features};
use super::generator::{Generator, GeneratorConfig, GeneratorKind};
use super::init::init_weights;
use crate::data::ColorSpace;
use crate::error::Result;
use crate::training::{Criterions, Labels};
use crate::utils::{load_network, Config, NetworkLabel};

/// Channels of the generator input stack: sketch, texture patch, segment
pub const INPUT_NC: i64 = 5;
/// Channels of the generator output
pub const OUTPUT_NC: i64 = 3;

/// Adam betas shared by both optimizers
const BETA1: f64 = 0.5;
const BETA2: f64 = 0.999;

/// Channels of a network-range image that the discriminator and the
/// feature network see: L only for lab, everything for rgb
pub fn visible_channels(xs: &Tensor, color_space: ColorSpace) -> Tensor {
    match color_space {
        ColorSpace::Lab => xs.narrow(1, 0, 1),
        ColorSpace::Rgb => xs.shallow_clone(),
    }
}

/// Build the configured generator, either freshly initialised or restored
/// from `{load}_net_G.pth` under `load_dir`
pub fn build_generator(config: &Config, device: Device) -> Result<(VarStore, Generator)> {
    let kind = config.generator_kind();
    let mut vs = VarStore::new(device);
    let generator = Generator::new(
        &vs.root(),
        kind,
        GeneratorConfig {
            input_nc: INPUT_NC,
            output_nc: OUTPUT_NC,
            ngf: config.model.ngf,
            image_size: config.data.image_size as i64,
        },
    );

    match config.model.load {
        Some(step) => load_network(&mut vs, NetworkLabel::G, step, &config.model.load_dir)?,
        None => init_weights(&vs),
    }

    Ok((vs, generator))
}

/// Networks, optimizers and criterions of a training run
pub struct ModelBundle {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Generator optimizer
    pub gen_opt: nn::Optimizer,
    /// Discriminator optimizer
    pub disc_opt: nn::Optimizer,
    /// Adversarial and L1 criterions
    pub criterions: Criterions,
    /// Real/fake targets of the adversarial criterion
    pub labels: Labels,
    /// Content activations for the feature loss
    pub content: FeatureExtractor,
    /// Style activations for the Gram loss
    pub style: FeatureExtractor,
    /// Colour space of every image tensor
    pub color_space: ColorSpace,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl ModelBundle {
    /// Build every network and optimizer for a configuration
    ///
    /// Networks are restored when `load` / `load_d` are set; a missing
    /// checkpoint fails here, before any training step.
    pub fn new(config: &Config, device: Device) -> Result<Self> {
        let color_space = config.data.color_space;
        let (gen_vs, generator) = build_generator(config, device)?;

        let mut disc_vs = VarStore::new(device);
        let discriminator = Discriminator::new(
            &disc_vs.root(),
            DiscriminatorConfig {
                input_nc: color_space.discriminator_channels(),
                ndf: config.model.ndf,
            },
        );
        match config.model.load_d {
            Some(step) => load_network(&mut disc_vs, NetworkLabel::D, step, &config.model.load_dir)?,
            None => init_weights(&disc_vs),
        }

        let content_layers = config.content_layers()?;
        let style_layers = config.style_layers()?;
        let all_layers: Vec<_> = content_layers.iter().chain(&style_layers).copied().collect();
        let mut features = Vgg19Features::new(device, &all_layers);
        match &config.model.feature_weights {
            Some(path) => features.load_pretrained(path)?,
            None => tracing::warn!(
                "No feature network weights configured, feature and style losses use an untrained VGG19"
            ),
        }
        let features = Rc::new(features);

        let gen_opt = nn::adam(BETA1, BETA2, 0.0).build(&gen_vs, config.training.learning_rate)?;
        let disc_opt = nn::adam(BETA1, BETA2, 0.0).build(&disc_vs, config.training.learning_rate_d)?;

        tracing::info!(
            "Built {} generator ({} tensors) and discriminator ({} tensors) on {:?}",
            generator.kind(),
            gen_vs.variables().len(),
            disc_vs.variables().len(),
            device
        );

        Ok(Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            gen_opt,
            disc_opt,
            criterions: Criterions::new(config.adversarial_loss()),
            labels: Labels::default(),
            content: FeatureExtractor::new(Rc::clone(&features), content_layers),
            style: FeatureExtractor::new(features, style_layers),
            color_space,
            device,
        })
    }

    /// Generator variant
    pub fn kind(&self) -> GeneratorKind {
        self.generator.kind()
    }

    /// Run the generator in eval mode without recording gradients
    pub fn generate(&self, input: &Tensor) -> Tensor {
        self.generator.generate(&input.to_device(self.device))
    }

    /// Channels of an image the discriminator and feature network see
    pub fn visible(&self, xs: &Tensor) -> Tensor {
        visible_channels(xs, self.color_space)
    }
}
