//! Data module for loading paired training images
//!
//! This module provides:
//! - Colour-space conversion (sRGB and CIE Lab)
//! - The transform pipeline (crop, flip, colour space, tensors)
//! - The image folder dataset and input-stack assembly
//! - DataLoader for batching with background prefetch

mod color;
mod dataset;
mod loader;
mod transforms;

pub use color::{
    denormalize_lab, lab_tensor_to_rgb, lab_to_rgb, normalize_lab, rgb_to_lab, to_display_rgb,
    ColorSpace,
};
pub use dataset::{
    assemble, Example, ImageFolder, PatchConfig, IMAGE_DIR, SEGMENT_DIR, SKETCH_DIR, TEXTURE_DIR,
};
pub use loader::{Batch, BatchIter, DataLoader};
pub use transforms::{
    ColorTensor, CropParams, RandomHorizontalFlip, RandomSizedCrop, RawSample, TransformPipeline,
    TransformedSample,
};
