//! Pix2Pix U-Net generator
//!
//! Stride-2 4x4 convolutions halve the resolution down to the bottleneck and
//! transposed convolutions bring it back, concatenating the mirrored encoder
//! output at every level. The depth follows the number of times the image
//! side can be halved, capped at eight levels.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::blocks::leaky_relu;

const MAX_DEPTH: u32 = 8;

#[derive(Debug)]
struct Down {
    conv: nn::Conv2D,
    bn: Option<nn::BatchNorm>,
    activate: bool,
}

impl ModuleT for Down {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let xs = if self.activate {
            leaky_relu(xs)
        } else {
            xs.shallow_clone()
        };
        let ys = self.conv.forward(&xs);
        match &self.bn {
            Some(bn) => bn.forward_t(&ys, train),
            None => ys,
        }
    }
}

#[derive(Debug)]
struct Up {
    conv: nn::ConvTranspose2D,
    bn: Option<nn::BatchNorm>,
}

impl ModuleT for Up {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = self.conv.forward(&xs.relu());
        match &self.bn {
            Some(bn) => bn.forward_t(&ys, train),
            None => ys.tanh(),
        }
    }
}

#[derive(Debug)]
pub struct UnetGenerator {
    down: Vec<Down>,
    /// Ordered from the bottleneck outwards
    up: Vec<Up>,
}

/// Number of U-Net levels for a given image side
pub fn unet_depth(image_size: i64) -> u32 {
    (image_size.max(1) as u64).trailing_zeros().clamp(2, MAX_DEPTH)
}

impl UnetGenerator {
    pub fn new(p: &nn::Path, input_nc: i64, output_nc: i64, ngf: i64, image_size: i64) -> Self {
        let depth = unet_depth(image_size) as usize;
        let channels = |level: usize| ngf * (1 << level.min(3));
        let down_cfg = nn::ConvConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        let up_cfg = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };

        let down = (0..depth)
            .map(|level| {
                let path = p / format!("down_{}", level);
                let c_in = if level == 0 { input_nc } else { channels(level - 1) };
                let c_out = channels(level);
                let outermost = level == 0;
                let innermost = level + 1 == depth;
                Down {
                    conv: nn::conv2d(&path / "conv", c_in, c_out, 4, down_cfg),
                    bn: (!outermost && !innermost)
                        .then(|| nn::batch_norm2d(&path / "bn", c_out, Default::default())),
                    activate: !outermost,
                }
            })
            .collect();

        let up = (0..depth)
            .rev()
            .map(|level| {
                let path = p / format!("up_{}", level);
                let innermost = level + 1 == depth;
                let c_in = if innermost {
                    channels(level)
                } else {
                    channels(level) * 2
                };
                if level == 0 {
                    let cfg = nn::ConvTransposeConfig {
                        bias: true,
                        ..up_cfg
                    };
                    Up {
                        conv: nn::conv_transpose2d(&path / "conv", c_in, output_nc, 4, cfg),
                        bn: None,
                    }
                } else {
                    let c_out = channels(level - 1);
                    Up {
                        conv: nn::conv_transpose2d(&path / "conv", c_in, c_out, 4, up_cfg),
                        bn: Some(nn::batch_norm2d(&path / "bn", c_out, Default::default())),
                    }
                }
            })
            .collect();

        Self { down, up }
    }
}

impl ModuleT for UnetGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut skips: Vec<Tensor> = Vec::with_capacity(self.down.len());
        let mut ys = xs.shallow_clone();
        for layer in &self.down {
            ys = layer.forward_t(&ys, train);
            skips.push(ys.shallow_clone());
        }

        // The bottleneck output feeds the first up layer directly.
        skips.pop();
        for layer in &self.up {
            ys = layer.forward_t(&ys, train);
            if let Some(skip) = skips.pop() {
                ys = Tensor::cat(&[&ys, &skip], 1);
            }
        }
        ys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unet_depth() {
        assert_eq!(unet_depth(32), 5);
        assert_eq!(unet_depth(128), 7);
        assert_eq!(unet_depth(256), 8);
        assert_eq!(unet_depth(512), 8);
        assert_eq!(unet_depth(48), 4);
    }
}
