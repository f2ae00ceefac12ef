//! TextureGAN generator
//!
//! Residual encoder/decoder with skip connections: each decoder stage
//! upsamples, concatenates the encoder features of the same resolution and
//! fuses them with a convolution plus a residual block. Input sides must be
//! divisible by 8.

use tch::{nn, nn::ModuleT, Tensor};

use super::blocks::{conv, up_bn_relu, ConvBnRelu, ResidualBlock};

#[derive(Debug)]
pub struct TextureGan {
    enc_1: nn::SequentialT,
    enc_2: nn::SequentialT,
    enc_3: nn::SequentialT,
    enc_4: nn::SequentialT,
    up_3: nn::SequentialT,
    fuse_3: nn::SequentialT,
    up_2: nn::SequentialT,
    fuse_2: nn::SequentialT,
    up_1: nn::SequentialT,
    fuse_1: nn::SequentialT,
    out: nn::Conv2D,
}

fn encoder(p: &nn::Path, c_in: i64, c_out: i64, stride: i64, res_blocks: usize) -> nn::SequentialT {
    let mut seq = nn::seq_t().add(ConvBnRelu::new(&(p / "conv"), c_in, c_out, stride));
    for i in 0..res_blocks {
        seq = seq.add(ResidualBlock::new(&(p / format!("res_{}", i + 1)), c_out));
    }
    seq
}

fn fuse(p: &nn::Path, c_in: i64, c_out: i64) -> nn::SequentialT {
    nn::seq_t()
        .add(ConvBnRelu::new(&(p / "conv"), c_in, c_out, 1))
        .add(ResidualBlock::new(&(p / "res"), c_out))
}

impl TextureGan {
    pub fn new(p: &nn::Path, input_nc: i64, output_nc: i64, ngf: i64) -> Self {
        Self {
            enc_1: encoder(&(p / "enc_1"), input_nc, ngf, 1, 1),
            enc_2: encoder(&(p / "enc_2"), ngf, ngf * 2, 2, 1),
            enc_3: encoder(&(p / "enc_3"), ngf * 2, ngf * 4, 2, 1),
            enc_4: encoder(&(p / "enc_4"), ngf * 4, ngf * 8, 2, 3),
            up_3: up_bn_relu(&(p / "up_3"), ngf * 8, ngf * 4),
            fuse_3: fuse(&(p / "fuse_3"), ngf * 8, ngf * 4),
            up_2: up_bn_relu(&(p / "up_2"), ngf * 4, ngf * 2),
            fuse_2: fuse(&(p / "fuse_2"), ngf * 4, ngf * 2),
            up_1: up_bn_relu(&(p / "up_1"), ngf * 2, ngf),
            fuse_1: fuse(&(p / "fuse_1"), ngf * 2, ngf),
            out: conv(p / "out", ngf, output_nc, 3, 1, 1, 1),
        }
    }
}

impl ModuleT for TextureGan {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let e1 = self.enc_1.forward_t(xs, train);
        let e2 = self.enc_2.forward_t(&e1, train);
        let e3 = self.enc_3.forward_t(&e2, train);
        let e4 = self.enc_4.forward_t(&e3, train);

        let d3 = self.up_3.forward_t(&e4, train);
        let d3 = self.fuse_3.forward_t(&Tensor::cat(&[&d3, &e3], 1), train);
        let d2 = self.up_2.forward_t(&d3, train);
        let d2 = self.fuse_2.forward_t(&Tensor::cat(&[&d2, &e2], 1), train);
        let d1 = self.up_1.forward_t(&d2, train);
        let d1 = self.fuse_1.forward_t(&Tensor::cat(&[&d1, &e1], 1), train);

        self.out.forward_t(&d1, train).tanh()
    }
}
