//! # TextureGAN
//!
//! Conditional GAN training for texture-guided image synthesis: a generator
//! turns a sketch, a texture patch and a segmentation mask into a textured
//! image, judged by a patch discriminator.
//!
//! ## Modules
//!
//! - `data`: Paired image folders, transforms and batch loading
//! - `model`: Generator variants, discriminator and VGG19 features
//! - `training`: Training loop, loss functions and loss history
//! - `visual`: Visdom and image directory sinks
//! - `utils`: Configuration, checkpoints and logging

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;
pub mod visual;

pub use data::{Batch, ColorSpace, DataLoader, ImageFolder, TransformPipeline};
pub use error::{Error, Result};
pub use model::{Discriminator, Generator, GeneratorKind, ModelBundle};
pub use training::{AdversarialLoss, LossHistory, Trainer};
pub use utils::{save_checkpoint, Config};
