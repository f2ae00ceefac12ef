//! Training module for the conditional GAN
//!
//! This module provides:
//! - Training loop with separated discriminator and generator phases
//! - Adversarial and L1 criterions
//! - Loss history

mod history;
mod losses;
mod trainer;

pub use history::{LossHistory, StepLosses, SERIES};
pub use losses::{AdversarialLoss, Criterions, L1Loss, Labels};
pub use trainer::{
    discriminator_phase, generator_loss_terms, generator_phase, load_display_batch, phase_barrier,
    train_step, GeneratorTerms, LossWeights, Trainer,
};
