//! Colour-space conversions
//!
//! sRGB <-> CIE Lab (D65 white point) and the normalisation used for
//! network tensors: `L / 50 - 1` and `ab / 110`, which puts every channel
//! roughly in `[-1, 1]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tch::Tensor;

/// Colour space of the tensors seen by the networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Lightness plus two chroma channels
    Lab,
    /// Red, green, blue
    Rgb,
}

impl ColorSpace {
    /// Channels the discriminator sees: L only for lab, all three for rgb
    pub fn discriminator_channels(self) -> i64 {
        match self {
            ColorSpace::Lab => 1,
            ColorSpace::Rgb => 3,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Lab => write!(f, "lab"),
            ColorSpace::Rgb => write!(f, "rgb"),
        }
    }
}

impl FromStr for ColorSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lab" => Ok(ColorSpace::Lab),
            "rgb" => Ok(ColorSpace::Rgb),
            other => Err(format!("unknown color space `{}` (expected lab or rgb)", other)),
        }
    }
}

const XN: f32 = 0.950_47;
const YN: f32 = 1.0;
const ZN: f32 = 1.088_83;
const DELTA: f32 = 6.0 / 29.0;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn f_forward(t: f32) -> f32 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn f_inverse(t: f32) -> f32 {
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// Convert one sRGB pixel in `[0, 1]` to CIE Lab
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = 0.412_453 * r + 0.357_580 * g + 0.180_423 * b;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = 0.019_334 * r + 0.119_193 * g + 0.950_227 * b;

    let fx = f_forward(x / XN);
    let fy = f_forward(y / YN);
    let fz = f_forward(z / ZN);

    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert one CIE Lab pixel back to sRGB in `[0, 1]`
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let x = XN * f_inverse(fx);
    let y = YN * f_inverse(fy);
    let z = ZN * f_inverse(fz);

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b)]
}

/// Lab pixel to network range
pub fn normalize_lab(lab: [f32; 3]) -> [f32; 3] {
    [lab[0] / 50.0 - 1.0, lab[1] / 110.0, lab[2] / 110.0]
}

/// Network-range Lab pixel back to CIE Lab
pub fn denormalize_lab(lab: [f32; 3]) -> [f32; 3] {
    [(lab[0] + 1.0) * 50.0, lab[1] * 110.0, lab[2] * 110.0]
}

/// Convert a normalised Lab batch `[N, 3, H, W]` to RGB in `[0, 1]`
///
/// Runs on the CPU; the result stays on the CPU.
pub fn lab_tensor_to_rgb(lab: &Tensor) -> crate::Result<Tensor> {
    let lab = lab.to_device(tch::Device::Cpu).to_kind(tch::Kind::Float);
    let size = lab.size();
    let (n, h, w) = (size[0], size[2], size[3]);
    let plane = (h * w) as usize;

    let values = Vec::<f32>::try_from(&lab.contiguous().view([-1]))?;
    let mut out = vec![0f32; values.len()];

    for img in 0..n as usize {
        let base = img * 3 * plane;
        for p in 0..plane {
            let pixel = denormalize_lab([
                values[base + p],
                values[base + plane + p],
                values[base + 2 * plane + p],
            ]);
            let rgb = lab_to_rgb(pixel);
            out[base + p] = rgb[0];
            out[base + plane + p] = rgb[1];
            out[base + 2 * plane + p] = rgb[2];
        }
    }

    Ok(Tensor::from_slice(&out).view([n, 3, h, w]))
}

/// Map network-range tensors of either colour space to RGB in `[0, 1]`
///
/// Single-channel inputs are treated as L (lab) or grey (rgb) and repeated.
pub fn to_display_rgb(xs: &Tensor, color_space: ColorSpace) -> crate::Result<Tensor> {
    let channels = xs.size()[1];
    match (color_space, channels) {
        (ColorSpace::Lab, 3) => lab_tensor_to_rgb(xs),
        (ColorSpace::Lab, _) => {
            let l = xs.narrow(1, 0, 1).to_device(tch::Device::Cpu);
            Ok(((l + 1.0) / 2.0).clamp(0.0, 1.0).repeat([1, 3, 1, 1]))
        }
        (ColorSpace::Rgb, 3) => Ok(((xs.to_device(tch::Device::Cpu) + 1.0) / 2.0).clamp(0.0, 1.0)),
        (ColorSpace::Rgb, _) => {
            let g = xs.narrow(1, 0, 1).to_device(tch::Device::Cpu);
            Ok(((g + 1.0) / 2.0).clamp(0.0, 1.0).repeat([1, 3, 1, 1]))
        }
    }
}
