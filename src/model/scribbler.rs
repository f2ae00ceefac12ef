//! Scribbler generator
//!
//! Encoder with three stride-2 stages, eight residual blocks at the
//! bottleneck, and an upsampling decoder back to full resolution.

use tch::{nn, nn::ModuleT, Tensor};

use super::blocks::{conv, up_bn_relu, ConvBnRelu, ResidualBlock};

#[derive(Debug)]
pub struct Scribbler {
    seq: nn::SequentialT,
}

impl Scribbler {
    pub fn new(p: &nn::Path, input_nc: i64, output_nc: i64, ngf: i64) -> Self {
        let seq = nn::seq_t()
            .add(ConvBnRelu::new(&(p / "enc_1"), input_nc, ngf, 1))
            .add(ResidualBlock::new(&(p / "res_1"), ngf))
            .add(ConvBnRelu::new(&(p / "enc_2"), ngf, ngf * 2, 2))
            .add(ResidualBlock::new(&(p / "res_2"), ngf * 2))
            .add(ConvBnRelu::new(&(p / "enc_3"), ngf * 2, ngf * 4, 2))
            .add(ResidualBlock::new(&(p / "res_3"), ngf * 4))
            .add(ConvBnRelu::new(&(p / "enc_4"), ngf * 4, ngf * 8, 2))
            .add(ResidualBlock::new(&(p / "res_4"), ngf * 8))
            .add(ResidualBlock::new(&(p / "res_5"), ngf * 8))
            .add(ResidualBlock::new(&(p / "res_6"), ngf * 8))
            .add(ResidualBlock::new(&(p / "res_7"), ngf * 8))
            .add(ResidualBlock::new(&(p / "res_8"), ngf * 8))
            .add(up_bn_relu(&(p / "dec_1"), ngf * 8, ngf * 4))
            .add(ResidualBlock::new(&(p / "res_9"), ngf * 4))
            .add(ResidualBlock::new(&(p / "res_10"), ngf * 4))
            .add(up_bn_relu(&(p / "dec_2"), ngf * 4, ngf * 2))
            .add(ResidualBlock::new(&(p / "res_11"), ngf * 2))
            .add(up_bn_relu(&(p / "dec_3"), ngf * 2, ngf))
            .add(ResidualBlock::new(&(p / "res_12"), ngf))
            .add(conv(p / "out", ngf, output_nc, 3, 1, 1, 1))
            .add_fn(|xs| xs.tanh());

        Self { seq }
    }
}

impl ModuleT for Scribbler {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.seq.forward_t(xs, train)
    }
}
