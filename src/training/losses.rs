//! Loss functions for conditional GAN training
//!
//! The adversarial criterion is either least squares (LSGAN) or binary
//! cross entropy on raw discriminator scores (DCGAN). The pixel, feature and
//! style terms are plain L1 distances.

use std::fmt;
use tch::{Reduction, Tensor};

/// Adversarial loss flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdversarialLoss {
    /// Mean squared error against the label
    LeastSquares,
    /// Binary cross entropy with logits against the label
    BinaryCrossEntropy,
}

impl AdversarialLoss {
    /// Look up a flavour by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "lsgan" => Some(AdversarialLoss::LeastSquares),
            "dcgan" => Some(AdversarialLoss::BinaryCrossEntropy),
            _ => None,
        }
    }

    /// Like [`AdversarialLoss::from_name`], defaulting to least squares with a warning
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            tracing::warn!("Undefined GAN type `{}`, defaulting to LSGAN", name);
            AdversarialLoss::LeastSquares
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AdversarialLoss::LeastSquares => "lsgan",
            AdversarialLoss::BinaryCrossEntropy => "dcgan",
        }
    }

    /// Loss of raw scores against a constant label
    ///
    /// # Arguments
    ///
    /// * `scores` - Discriminator output (no sigmoid applied)
    /// * `label` - Target value broadcast to every score, e.g. 1.0 for real
    ///
    /// # Returns
    ///
    /// Scalar loss tensor
    pub fn forward(self, scores: &Tensor, label: f64) -> Tensor {
        let targets = Tensor::full_like(scores, label);
        match self {
            AdversarialLoss::LeastSquares => scores.mse_loss(&targets, Reduction::Mean),
            AdversarialLoss::BinaryCrossEntropy => scores.binary_cross_entropy_with_logits::<Tensor>(
                &targets,
                None,
                None,
                Reduction::Mean,
            ),
        }
    }
}

impl fmt::Display for AdversarialLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Loss;

impl L1Loss {
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        input.l1_loss(target, Reduction::Mean)
    }
}

/// Every criterion used by a training step
#[derive(Debug, Clone, Copy)]
pub struct Criterions {
    pub gan: AdversarialLoss,
    pub pixel_l: L1Loss,
    pub pixel_ab: L1Loss,
    pub style: L1Loss,
    pub feature: L1Loss,
}

impl Criterions {
    pub fn new(gan: AdversarialLoss) -> Self {
        Self {
            gan,
            pixel_l: L1Loss,
            pixel_ab: L1Loss,
            style: L1Loss,
            feature: L1Loss,
        }
    }
}

/// Target values of the adversarial criterion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Labels {
    pub real: f64,
    pub fake: f64,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            real: 1.0,
            fake: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_least_squares() {
        let scores = Tensor::from_slice(&[1.0f32, 0.0, 0.5, 0.5]);
        let loss = AdversarialLoss::LeastSquares.forward(&scores, 1.0);
        let expected = (0.0 + 1.0 + 0.25 + 0.25) / 4.0;
        assert!((loss.double_value(&[]) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_binary_cross_entropy_on_logits() {
        let scores = Tensor::zeros([2, 1, 3, 3], (Kind::Float, Device::Cpu));
        let loss = AdversarialLoss::BinaryCrossEntropy.forward(&scores, 0.0);
        assert!((loss.double_value(&[]) - std::f64::consts::LN_2).abs() < 1e-5);

        let confident = Tensor::full([4], 10.0, (Kind::Float, Device::Cpu));
        let loss = AdversarialLoss::BinaryCrossEntropy.forward(&confident, 1.0);
        assert!(loss.double_value(&[]) < 1e-3);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(AdversarialLoss::resolve("dcgan"), AdversarialLoss::BinaryCrossEntropy);
        assert_eq!(AdversarialLoss::resolve("LSGAN"), AdversarialLoss::LeastSquares);
        assert_eq!(AdversarialLoss::resolve("wgan"), AdversarialLoss::LeastSquares);
    }

    #[test]
    fn test_l1() {
        let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
        let b = Tensor::from_slice(&[1.0f32, 0.0, 6.0]);
        let loss = L1Loss.forward(&a, &b);
        assert!((loss.double_value(&[]) - 5.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_labels_default() {
        let labels = Labels::default();
        assert_eq!(labels.real, 1.0);
        assert_eq!(labels.fake, 0.0);
    }
}
