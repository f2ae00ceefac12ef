//! Transform pipeline applied to raw samples before batching
//!
//! The order is fixed: random-sized crop, random horizontal flip,
//! colour-space conversion, tensor conversion. The target, sketch and
//! segment of a sample share one crop and one flip so they stay aligned;
//! the texture image is cropped and flipped on its own.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Pixel, RgbImage};
use rand::Rng;
use std::path::{Path, PathBuf};
use tch::Tensor;

use super::color::{normalize_lab, rgb_to_lab, ColorSpace};
use crate::error::{Error, Result};

/// A decoded sample before any transform
#[derive(Debug, Clone)]
pub struct RawSample {
    /// Target image
    pub image: RgbImage,
    /// Sketch drawn over the target
    pub sketch: RgbImage,
    /// Foreground segment
    pub segment: GrayImage,
    /// Texture source
    pub texture: RgbImage,
    /// Target path, used in error reports
    pub path: PathBuf,
}

/// Colour tensors of one image
#[derive(Debug)]
pub enum ColorTensor {
    /// `l` is `[1, H, W]`, `ab` is `[2, H, W]`
    Lab { l: Tensor, ab: Tensor },
    /// `[3, H, W]`
    Rgb(Tensor),
}

impl ColorTensor {
    /// Total channel count
    pub fn channels(&self) -> i64 {
        match self {
            ColorTensor::Lab { l, ab } => l.size()[0] + ab.size()[0],
            ColorTensor::Rgb(t) => t.size()[0],
        }
    }

    /// All channels stacked into one `[3, H, W]` tensor
    pub fn stacked(&self) -> Tensor {
        match self {
            ColorTensor::Lab { l, ab } => Tensor::cat(&[l, ab], 0),
            ColorTensor::Rgb(t) => t.shallow_clone(),
        }
    }

    /// Lightness (lab) or luminance (rgb) as `[1, H, W]`
    pub fn luminance(&self) -> Tensor {
        match self {
            ColorTensor::Lab { l, .. } => l.shallow_clone(),
            ColorTensor::Rgb(t) => {
                let weights = Tensor::from_slice(&[0.299f32, 0.587, 0.114]).view([3, 1, 1]);
                (t * weights).sum_dim_intlist([0i64].as_slice(), true, tch::Kind::Float)
            }
        }
    }
}

/// A sample after the full pipeline
#[derive(Debug)]
pub struct TransformedSample {
    /// Target image
    pub image: ColorTensor,
    /// Sketch, `[1, H, W]`
    pub sketch: Tensor,
    /// Binary mask, `[1, H, W]`
    pub segment: Tensor,
    /// Texture image
    pub texture: ColorTensor,
}

/// Resolved placement of one crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropParams {
    /// Width after resizing
    pub scaled_width: u32,
    /// Height after resizing
    pub scaled_height: u32,
    /// Left edge of the window
    pub x: u32,
    /// Top edge of the window
    pub y: u32,
}

/// Resize the shorter side to a random length, then cut a square window
#[derive(Debug, Clone, Copy)]
pub struct RandomSizedCrop {
    /// Output side
    pub size: u32,
    /// Lower bound of the resized shorter side
    pub resize_min: u32,
    /// Upper bound of the resized shorter side
    pub resize_max: u32,
}

impl RandomSizedCrop {
    /// Create a new crop; `resize_min` is raised to `size` when smaller
    pub fn new(size: u32, resize_min: u32, resize_max: u32) -> Self {
        let resize_min = resize_min.max(size);
        Self {
            size,
            resize_min,
            resize_max: resize_max.max(resize_min),
        }
    }

    /// Draw crop parameters for an image of the given size
    pub fn params<R: Rng + ?Sized>(
        &self,
        width: u32,
        height: u32,
        path: &Path,
        rng: &mut R,
    ) -> Result<CropParams> {
        let shorter = width.min(height);
        if shorter < self.resize_min {
            return Err(Error::ImageTooSmall {
                path: path.to_path_buf(),
                width,
                height,
                min: self.resize_min,
            });
        }

        let target = rng.gen_range(self.resize_min..=self.resize_max);
        let scale = target as f64 / shorter as f64;
        let scaled_width = ((width as f64 * scale).round() as u32).max(self.size);
        let scaled_height = ((height as f64 * scale).round() as u32).max(self.size);

        Ok(CropParams {
            scaled_width,
            scaled_height,
            x: rng.gen_range(0..=scaled_width - self.size),
            y: rng.gen_range(0..=scaled_height - self.size),
        })
    }

    /// Apply drawn parameters to an image
    pub fn apply<P>(
        &self,
        img: &ImageBuffer<P, Vec<P::Subpixel>>,
        params: CropParams,
        filter: FilterType,
    ) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        let resized = imageops::resize(img, params.scaled_width, params.scaled_height, filter);
        imageops::crop_imm(&resized, params.x, params.y, self.size, self.size).to_image()
    }
}

/// Mirror left to right with probability `p`
#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
    /// Flip probability
    pub p: f64,
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self { p: 0.5 }
    }
}

impl RandomHorizontalFlip {
    /// Draw whether to flip
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.p)
    }

    /// Apply a drawn decision
    pub fn apply<P>(
        &self,
        img: ImageBuffer<P, Vec<P::Subpixel>>,
        flip: bool,
    ) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        if flip {
            imageops::flip_horizontal(&img)
        } else {
            img
        }
    }
}

/// Planar float channels of one image after colour conversion
#[derive(Debug, Clone)]
pub struct ColorPlanes {
    /// Channel-major values
    pub values: Vec<f32>,
    /// Number of channels
    pub channels: usize,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Convert an RGB image into planar network-range values
pub fn convert_color(img: &RgbImage, color_space: ColorSpace) -> ColorPlanes {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut values = vec![0f32; plane * 3];

    for (i, px) in img.pixels().enumerate() {
        let rgb = [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        ];
        let out = match color_space {
            ColorSpace::Lab => normalize_lab(rgb_to_lab(rgb)),
            ColorSpace::Rgb => [rgb[0] * 2.0 - 1.0, rgb[1] * 2.0 - 1.0, rgb[2] * 2.0 - 1.0],
        };
        values[i] = out[0];
        values[plane + i] = out[1];
        values[2 * plane + i] = out[2];
    }

    ColorPlanes {
        values,
        channels: 3,
        width,
        height,
    }
}

/// Binary mask planes from a grey image
pub fn convert_mask(img: &GrayImage) -> ColorPlanes {
    let (width, height) = img.dimensions();
    let values = img
        .pixels()
        .map(|px| if px[0] as f32 / 255.0 > 0.5 { 1.0 } else { 0.0 })
        .collect();
    ColorPlanes {
        values,
        channels: 1,
        width,
        height,
    }
}

/// Planes to a `[C, H, W]` tensor
pub fn planes_to_tensor(planes: &ColorPlanes) -> Tensor {
    Tensor::from_slice(&planes.values).view([
        planes.channels as i64,
        planes.height as i64,
        planes.width as i64,
    ])
}

/// Planes to colour tensors, splitting L from AB in lab mode
pub fn planes_to_color_tensor(planes: &ColorPlanes, color_space: ColorSpace) -> ColorTensor {
    let t = planes_to_tensor(planes);
    match color_space {
        ColorSpace::Lab => ColorTensor::Lab {
            l: t.narrow(0, 0, 1),
            ab: t.narrow(0, 1, 2),
        },
        ColorSpace::Rgb => ColorTensor::Rgb(t),
    }
}

/// The composed pipeline
#[derive(Debug, Clone, Copy)]
pub struct TransformPipeline {
    /// First stage
    pub crop: RandomSizedCrop,
    /// Second stage
    pub flip: RandomHorizontalFlip,
    /// Third stage
    pub color_space: ColorSpace,
}

impl TransformPipeline {
    /// Create a pipeline for the given sizes and colour space
    pub fn new(image_size: u32, resize_min: u32, resize_max: u32, color_space: ColorSpace) -> Self {
        Self {
            crop: RandomSizedCrop::new(image_size, resize_min, resize_max),
            flip: RandomHorizontalFlip::default(),
            color_space,
        }
    }

    /// Output side length
    pub fn image_size(&self) -> u32 {
        self.crop.size
    }

    /// Run every stage over a raw sample
    pub fn apply<R: Rng + ?Sized>(&self, raw: &RawSample, rng: &mut R) -> Result<TransformedSample> {
        let (width, height) = raw.image.dimensions();
        for (w, h) in [raw.sketch.dimensions(), raw.segment.dimensions()] {
            if (w, h) != (width, height) {
                return Err(Error::Config(format!(
                    "paired images of {} differ in size: {}x{} vs {}x{}",
                    raw.path.display(),
                    width,
                    height,
                    w,
                    h
                )));
            }
        }

        // Crop
        let params = self.crop.params(width, height, &raw.path, rng)?;
        let image = self.crop.apply(&raw.image, params, FilterType::Triangle);
        let sketch = self.crop.apply(&raw.sketch, params, FilterType::Triangle);
        let segment = self.crop.apply(&raw.segment, params, FilterType::Nearest);

        let (tw, th) = raw.texture.dimensions();
        let texture_params = self.crop.params(tw, th, &raw.path, rng)?;
        let texture = self.crop.apply(&raw.texture, texture_params, FilterType::Triangle);

        // Flip
        let flip = self.flip.draw(rng);
        let image = self.flip.apply(image, flip);
        let sketch = self.flip.apply(sketch, flip);
        let segment = self.flip.apply(segment, flip);
        let texture_flip = self.flip.draw(rng);
        let texture = self.flip.apply(texture, texture_flip);

        // Colour space
        let image = convert_color(&image, self.color_space);
        let sketch = convert_color(&sketch, self.color_space);
        let segment = convert_mask(&segment);
        let texture = convert_color(&texture, self.color_space);

        // Tensors
        let sketch = planes_to_color_tensor(&sketch, self.color_space).luminance();
        Ok(TransformedSample {
            image: planes_to_color_tensor(&image, self.color_space),
            sketch,
            segment: planes_to_tensor(&segment),
            texture: planes_to_color_tensor(&texture, self.color_space),
        })
    }
}
