//! VGG19 feature extraction for the perceptual and style losses
//!
//! The convolutional stack follows the torchvision `features` layout,
//! including its variable names (`features.{index}.weight`), so converted
//! pretrained weights load as they are. The stack is frozen: gradients flow
//! through it to the generator but never into its weights.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tch::{nn, nn::Module, nn::VarStore, Device, Tensor};

use crate::error::{Error, Result};

/// Named activations and their index in the `features` stack
const NAMED_LAYERS: [(&str, usize); 11] = [
    ("relu1_1", 1),
    ("relu1_2", 3),
    ("relu2_1", 6),
    ("relu2_2", 8),
    ("relu3_1", 11),
    ("relu3_2", 13),
    ("relu3_4", 17),
    ("relu4_1", 20),
    ("relu4_2", 22),
    ("relu4_4", 26),
    ("relu5_1", 29),
];

/// Output channels per convolution, `None` for max pooling
const VGG19_CFG: [Option<i64>; 21] = [
    Some(64),
    Some(64),
    None,
    Some(128),
    Some(128),
    None,
    Some(256),
    Some(256),
    Some(256),
    Some(256),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
    Some(512),
    Some(512),
    Some(512),
    Some(512),
    None,
];

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A named activation of the feature network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureLayer {
    name: &'static str,
    index: usize,
}

impl FeatureLayer {
    /// Look up a layer by name, e.g. `relu4_2`
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        NAMED_LAYERS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, index)| Self { name, index })
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))
    }

    /// Parse a comma separated list of layer names
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Index in the `features` stack
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for FeatureLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug)]
enum Layer {
    Conv(nn::Conv2D),
    Relu,
    MaxPool,
}

/// The VGG19 `features` stack, built only as deep as needed
#[derive(Debug)]
pub struct Vgg19Features {
    vs: VarStore,
    layers: Vec<Layer>,
}

impl Vgg19Features {
    /// Build the stack up to and including the deepest of `layers`
    pub fn new(device: Device, layers: &[FeatureLayer]) -> Self {
        let depth = layers.iter().map(|l| l.index + 1).max().unwrap_or(0);
        let mut vs = VarStore::new(device);
        let root = vs.root() / "features";

        let mut stack = Vec::with_capacity(depth);
        let mut c_in = 3;
        for cfg in VGG19_CFG {
            if stack.len() >= depth {
                break;
            }
            match cfg {
                Some(c_out) => {
                    let conv_cfg = nn::ConvConfig {
                        padding: 1,
                        ..Default::default()
                    };
                    let conv = nn::conv2d(&root / stack.len(), c_in, c_out, 3, conv_cfg);
                    stack.push(Layer::Conv(conv));
                    stack.push(Layer::Relu);
                    c_in = c_out;
                }
                None => stack.push(Layer::MaxPool),
            }
        }
        stack.truncate(depth);

        vs.freeze();
        Self { vs, layers: stack }
    }

    /// Load converted torchvision weights
    ///
    /// Entries for layers deeper than the built stack are ignored.
    pub fn load_pretrained(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::CheckpointNotFound {
                path: path.to_path_buf(),
            });
        }
        self.vs.load(path)?;
        self.vs.freeze();
        tracing::info!("Loaded feature network weights from {}", path.display());
        Ok(())
    }

    /// Var store holding the (frozen) weights
    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }

    /// Number of layers built
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Activations at the given indices, in request order
    pub fn forward_layers(&self, xs: &Tensor, indices: &[usize]) -> Vec<Tensor> {
        let deepest = match indices.iter().max() {
            Some(&d) => d,
            None => return Vec::new(),
        };

        let mut found: HashMap<usize, Tensor> = HashMap::new();
        let mut ys = xs.shallow_clone();
        for (idx, layer) in self.layers.iter().enumerate().take(deepest + 1) {
            ys = match layer {
                Layer::Conv(conv) => conv.forward(&ys),
                Layer::Relu => ys.relu(),
                Layer::MaxPool => ys.max_pool2d_default(2),
            };
            if indices.contains(&idx) {
                found.insert(idx, ys.shallow_clone());
            }
        }

        indices
            .iter()
            .filter_map(|idx| found.get(idx).map(|t| t.shallow_clone()))
            .collect()
    }
}

/// A view of a shared feature network restricted to some layers
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    net: Rc<Vgg19Features>,
    layers: Vec<FeatureLayer>,
}

impl FeatureExtractor {
    pub fn new(net: Rc<Vgg19Features>, layers: Vec<FeatureLayer>) -> Self {
        Self { net, layers }
    }

    /// Activations of every configured layer, in configuration order
    pub fn forward(&self, xs: &Tensor) -> Vec<Tensor> {
        let indices: Vec<usize> = self.layers.iter().map(|l| l.index).collect();
        self.net.forward_layers(xs, &indices)
    }

    pub fn layers(&self) -> &[FeatureLayer] {
        &self.layers
    }
}

/// Map network-range tensors to ImageNet-normalised VGG input
///
/// Single-channel inputs are repeated to three channels.
pub fn vgg_input(xs: &Tensor) -> Tensor {
    let xs = if xs.size()[1] == 1 {
        xs.repeat([1, 3, 1, 1])
    } else {
        xs.shallow_clone()
    };
    let device = xs.device();
    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([1, 3, 1, 1]).to_device(device);
    let std = Tensor::from_slice(&IMAGENET_STD).view([1, 3, 1, 1]).to_device(device);

    ((xs + 1.0) / 2.0 - mean) / std
}

/// Gram matrix `F Fᵀ / (C H W)` of a `[B, C, H, W]` activation
pub fn gram_matrix(xs: &Tensor) -> Tensor {
    let size = xs.size();
    let (b, c, h, w) = (size[0], size[1], size[2], size[3]);
    let features = xs.view([b, c, h * w]);
    features.bmm(&features.transpose(1, 2)) / ((c * h * w) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn layers(list: &str) -> Vec<FeatureLayer> {
        FeatureLayer::parse_list(list).unwrap()
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(FeatureLayer::parse("relu4_2").unwrap().index(), 22);
        assert_eq!(layers("relu3_2, relu2_2").iter().map(|l| l.index()).collect::<Vec<_>>(), vec![13, 8]);
        assert!(matches!(
            FeatureLayer::parse("relu9_9"),
            Err(Error::UnknownLayer(_))
        ));
    }

    #[test]
    fn test_network_depth() {
        let net = Vgg19Features::new(Device::Cpu, &layers("relu2_2, relu1_1"));
        assert_eq!(net.depth(), 9);
        assert!(net.var_store().variables().contains_key("features.7.weight"));
        assert!(!net.var_store().variables().contains_key("features.10.weight"));
    }

    #[test]
    fn test_extractor_order_and_shapes() {
        let net = Rc::new(Vgg19Features::new(Device::Cpu, &layers("relu2_2, relu1_2")));
        let extractor = FeatureExtractor::new(net, layers("relu2_2, relu1_2"));

        let xs = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));
        let out = extractor.forward(&vgg_input(&xs));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].size(), vec![2, 128, 8, 8]);
        assert_eq!(out[1].size(), vec![2, 64, 16, 16]);
    }

    #[test]
    fn test_weights_frozen() {
        let net = Rc::new(Vgg19Features::new(Device::Cpu, &layers("relu1_2")));
        assert!(net
            .var_store()
            .trainable_variables()
            .iter()
            .all(|v| !v.requires_grad()));

        let xs = Tensor::randn([1, 1, 8, 8], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let extractor = FeatureExtractor::new(Rc::clone(&net), layers("relu1_2"));
        let out = extractor.forward(&vgg_input(&xs));
        out[0].sum(Kind::Float).backward();

        assert!(xs.grad().defined());
        for (_, var) in net.var_store().variables() {
            assert!(!var.grad().defined());
        }
    }

    #[test]
    fn test_gram_matrix() {
        let xs = Tensor::randn([2, 4, 5, 5], (Kind::Float, Device::Cpu));
        let gram = gram_matrix(&xs);

        assert_eq!(gram.size(), vec![2, 4, 4]);
        assert!(gram.allclose(&gram.transpose(1, 2), 1e-5, 1e-6, false));
    }
}
