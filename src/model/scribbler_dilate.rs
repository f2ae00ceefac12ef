//! Scribbler variant with a dilated bottleneck, tuned for 128px inputs
//!
//! Only two downsampling stages; the receptive field is grown with dilated
//! residual blocks instead.

use tch::{nn, nn::ModuleT, Tensor};

use super::blocks::{conv, up_bn_relu, ConvBnRelu, ResidualBlock};

const DILATIONS: [i64; 4] = [2, 4, 8, 16];

#[derive(Debug)]
pub struct ScribblerDilate128 {
    seq: nn::SequentialT,
}

impl ScribblerDilate128 {
    pub fn new(p: &nn::Path, input_nc: i64, output_nc: i64, ngf: i64) -> Self {
        let mut seq = nn::seq_t()
            .add(ConvBnRelu::new(&(p / "enc_1"), input_nc, ngf, 1))
            .add(ConvBnRelu::new(&(p / "enc_2"), ngf, ngf * 2, 2))
            .add(ConvBnRelu::new(&(p / "enc_3"), ngf * 2, ngf * 4, 2));

        for (i, dilation) in DILATIONS.iter().enumerate() {
            seq = seq.add(ResidualBlock::dilated(
                &(p / format!("dil_{}", i + 1)),
                ngf * 4,
                *dilation,
            ));
        }

        let seq = seq
            .add(ResidualBlock::new(&(p / "res_1"), ngf * 4))
            .add(ResidualBlock::new(&(p / "res_2"), ngf * 4))
            .add(up_bn_relu(&(p / "dec_1"), ngf * 4, ngf * 2))
            .add(ResidualBlock::new(&(p / "res_3"), ngf * 2))
            .add(up_bn_relu(&(p / "dec_2"), ngf * 2, ngf))
            .add(ResidualBlock::new(&(p / "res_4"), ngf))
            .add(conv(p / "out", ngf, output_nc, 3, 1, 1, 1))
            .add_fn(|xs| xs.tanh());

        Self { seq }
    }
}

impl ModuleT for ScribblerDilate128 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.seq.forward_t(xs, train)
    }
}
