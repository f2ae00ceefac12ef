//! Building blocks shared by the generator variants

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// 2D convolution with explicit stride, padding and dilation
pub fn conv(
    p: nn::Path,
    c_in: i64,
    c_out: i64,
    ksize: i64,
    stride: i64,
    padding: i64,
    dilation: i64,
) -> nn::Conv2D {
    let cfg = nn::ConvConfig {
        stride,
        padding,
        dilation,
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, ksize, cfg)
}

/// Leaky ReLU with a 0.2 negative slope
pub fn leaky_relu(xs: &Tensor) -> Tensor {
    xs.maximum(&(xs * 0.2))
}

/// Convolution, batch norm, ReLU
#[derive(Debug)]
pub struct ConvBnRelu {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
}

impl ConvBnRelu {
    /// 3x3 block; `stride` 2 halves the resolution
    pub fn new(p: &nn::Path, c_in: i64, c_out: i64, stride: i64) -> Self {
        Self {
            conv: conv(p / "conv", c_in, c_out, 3, stride, 1, 1),
            bn: nn::batch_norm2d(p / "bn", c_out, Default::default()),
        }
    }
}

impl ModuleT for ConvBnRelu {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.bn.forward_t(&self.conv.forward(xs), train).relu()
    }
}

/// Two 3x3 convolutions with batch norm around an identity skip
#[derive(Debug)]
pub struct ResidualBlock {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
}

impl ResidualBlock {
    /// Plain residual block
    pub fn new(p: &nn::Path, channels: i64) -> Self {
        Self::dilated(p, channels, 1)
    }

    /// Residual block whose convolutions use the given dilation
    pub fn dilated(p: &nn::Path, channels: i64, dilation: i64) -> Self {
        Self {
            conv1: conv(p / "conv1", channels, channels, 3, 1, dilation, dilation),
            bn1: nn::batch_norm2d(p / "bn1", channels, Default::default()),
            conv2: conv(p / "conv2", channels, channels, 3, 1, dilation, dilation),
            bn2: nn::batch_norm2d(p / "bn2", channels, Default::default()),
        }
    }
}

impl ModuleT for ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = self.bn1.forward_t(&self.conv1.forward(xs), train).relu();
        let ys = self.bn2.forward_t(&self.conv2.forward(&ys), train);
        ys + xs
    }
}

/// Nearest-neighbour x2 upsampling followed by a 3x3 convolution
#[derive(Debug)]
pub struct UpsamplingBlock {
    conv: nn::Conv2D,
}

impl UpsamplingBlock {
    pub fn new(p: &nn::Path, c_in: i64, c_out: i64) -> Self {
        Self {
            conv: conv(p / "conv", c_in, c_out, 3, 1, 1, 1),
        }
    }
}

impl Module for UpsamplingBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let size = xs.size();
        let (h, w) = (size[2], size[3]);
        let up = xs.upsample_nearest2d([h * 2, w * 2], None::<f64>, None::<f64>);
        self.conv.forward(&up)
    }
}

/// Upsampling block, batch norm, ReLU
pub fn up_bn_relu(p: &nn::Path, c_in: i64, c_out: i64) -> nn::SequentialT {
    nn::seq_t()
        .add(UpsamplingBlock::new(&(p / "up"), c_in, c_out))
        .add(nn::batch_norm2d(p / "bn", c_out, Default::default()))
        .add_fn(|xs| xs.relu())
}
