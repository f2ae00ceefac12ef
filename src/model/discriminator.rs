//! PatchGAN discriminator
//!
//! Scores overlapping image patches as real or generated.
//! Architecture uses strided 2D convolutions to downsample and extract features.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::blocks::leaky_relu;

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Number of input channels (1 for the L channel, 3 for rgb)
    pub input_nc: i64,
    /// Base number of filters
    pub ndf: i64,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            input_nc: 1,
            ndf: 32,
        }
    }
}

/// Discriminator network
///
/// Architecture:
/// 1. 4x4 stride-2 convolution with LeakyReLU
/// 2. Two stride-2 and one stride-1 convolution with BatchNorm and LeakyReLU
/// 3. Final 4x4 convolution to one score per patch
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
    conv3: nn::Conv2D,
    bn3: nn::BatchNorm,
    conv4: nn::Conv2D,
    bn4: nn::BatchNorm,
    conv5: nn::Conv2D,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let ndf = config.ndf;

        let down = nn::ConvConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        };
        let flat = nn::ConvConfig {
            stride: 1,
            padding: 1,
            ..Default::default()
        };

        let conv1 = nn::conv2d(vs / "conv1", config.input_nc, ndf, 4, down);
        let conv2 = nn::conv2d(vs / "conv2", ndf, ndf * 2, 4, down);
        let bn2 = nn::batch_norm2d(vs / "bn2", ndf * 2, Default::default());
        let conv3 = nn::conv2d(vs / "conv3", ndf * 2, ndf * 4, 4, down);
        let bn3 = nn::batch_norm2d(vs / "bn3", ndf * 4, Default::default());
        let conv4 = nn::conv2d(vs / "conv4", ndf * 4, ndf * 8, 4, flat);
        let bn4 = nn::batch_norm2d(vs / "bn4", ndf * 8, Default::default());
        let conv5 = nn::conv2d(vs / "conv5", ndf * 8, 1, 4, flat);

        Self {
            config,
            conv1,
            conv2,
            bn2,
            conv3,
            bn3,
            conv4,
            bn4,
            conv5,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, input_nc, height, width)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Patch scores of shape (batch_size, 1, h', w'), raw (no sigmoid)
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = leaky_relu(&self.conv1.forward(input));

        let x = self.bn2.forward_t(&self.conv2.forward(&x), train);
        let x = leaky_relu(&x);

        let x = self.bn3.forward_t(&self.conv3.forward(&x), train);
        let x = leaky_relu(&x);

        let x = self.bn4.forward_t(&self.conv4.forward(&x), train);
        let x = leaky_relu(&x);

        self.conv5.forward(&x)
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Discriminator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_discriminator_patch_scores() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), DiscriminatorConfig::default());

        let input = Tensor::randn([4, 1, 32, 32], (Kind::Float, Device::Cpu));
        let output = disc.forward_t(&input, true);

        assert_eq!(output.size(), vec![4, 1, 2, 2]);
    }

    #[test]
    fn test_discriminator_rgb_input() {
        let vs = VarStore::new(Device::Cpu);
        let config = DiscriminatorConfig { input_nc: 3, ndf: 8 };
        let disc = Discriminator::new(&vs.root(), config);

        let input = Tensor::randn([2, 3, 64, 64], (Kind::Float, Device::Cpu));
        let output = disc.forward_t(&input, false);

        assert_eq!(output.size(), vec![2, 1, 6, 6]);
        assert_eq!(disc.config().input_nc, 3);
    }
}
