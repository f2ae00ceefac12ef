//! Neural network models
//!
//! This module provides:
//! - Four generator variants behind [`Generator`]
//! - PatchGAN [`Discriminator`]
//! - VGG19 feature extraction for the perceptual and style losses
//! - [`ModelBundle`] owning networks, optimizers and criterions

mod blocks;
mod bundle;
mod discriminator;
mod features;
mod generator;
mod init;
mod pix2pix;
mod scribbler;
mod scribbler_dilate;
mod texturegan;

pub use bundle::{build_generator, visible_channels, ModelBundle, INPUT_NC, OUTPUT_NC};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use features::{gram_matrix, vgg_input, FeatureExtractor, FeatureLayer, Vgg19Features};
pub use generator::{Generator, GeneratorConfig, GeneratorKind};
pub use init::init_weights;
