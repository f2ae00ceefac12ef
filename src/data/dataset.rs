//! Image folder dataset
//!
//! Layout: `{root}/{split}/{img,skg,seg,txt}/<name>`, where the same file
//! name appears in each of the four folders.

use image::{GrayImage, RgbImage};
use rand::Rng;
use std::path::{Path, PathBuf};
use tch::{Kind, Tensor};

use super::transforms::{RawSample, TransformPipeline, TransformedSample};
use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "webp", "tiff"];

/// Folder names of the four paired images
pub const IMAGE_DIR: &str = "img";
pub const SKETCH_DIR: &str = "skg";
pub const SEGMENT_DIR: &str = "seg";
pub const TEXTURE_DIR: &str = "txt";

/// Sizes of the texture patches pasted into the input stack
#[derive(Debug, Clone, Copy)]
pub struct PatchConfig {
    /// Smallest patch side
    pub min_size: u32,
    /// Largest patch side
    pub max_size: u32,
    /// Patches per sample
    pub count: usize,
}

/// One training example, ready to be stacked into a batch
#[derive(Debug)]
pub struct Example {
    /// `[5, H, W]`: sketch, texture patch (3 channels), segment
    pub input: Tensor,
    /// `[3, H, W]`
    pub target: Tensor,
    /// `[3, H, W]`
    pub texture: Tensor,
    /// `[1, H, W]`
    pub segment: Tensor,
}

/// Dataset over one split of an image folder
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    split: String,
    names: Vec<String>,
    pipeline: TransformPipeline,
    patch: PatchConfig,
}

impl ImageFolder {
    /// Index a split
    ///
    /// Fails when the split is empty or a target lacks one of its paired files.
    pub fn new(
        split: &str,
        root: impl AsRef<Path>,
        pipeline: TransformPipeline,
        patch: PatchConfig,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let split_dir = root.join(split);
        let image_dir = split_dir.join(IMAGE_DIR);

        let mut names: Vec<String> = std::fs::read_dir(&image_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|name| is_image_file(name))
            .collect();
        names.sort();

        if names.is_empty() {
            return Err(Error::EmptyDataset {
                split: split.to_string(),
                root,
            });
        }

        for name in &names {
            for dir in [SKETCH_DIR, SEGMENT_DIR, TEXTURE_DIR] {
                let path = split_dir.join(dir).join(name);
                if !path.is_file() {
                    return Err(Error::MissingCounterpart { path });
                }
            }
        }

        tracing::info!(
            "Indexed {} samples in {}",
            names.len(),
            split_dir.display()
        );

        Ok(Self {
            root,
            split: split.to_string(),
            names,
            pipeline,
            patch,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the split has no samples
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Split name
    pub fn split(&self) -> &str {
        &self.split
    }

    /// Pipeline used by this dataset
    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    fn path(&self, dir: &str, index: usize) -> PathBuf {
        self.root.join(&self.split).join(dir).join(&self.names[index])
    }

    /// Decode one sample
    pub fn load_raw(&self, index: usize) -> Result<RawSample> {
        Ok(RawSample {
            image: open_rgb(&self.path(IMAGE_DIR, index))?,
            sketch: open_rgb(&self.path(SKETCH_DIR, index))?,
            segment: open_gray(&self.path(SEGMENT_DIR, index))?,
            texture: open_rgb(&self.path(TEXTURE_DIR, index))?,
            path: self.path(IMAGE_DIR, index),
        })
    }

    /// Decode, transform and assemble one example
    pub fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Example> {
        let raw = self.load_raw(index)?;
        let sample = self.pipeline.apply(&raw, rng)?;
        Ok(assemble(sample, self.patch, rng))
    }
}

fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .map_err(|e| Error::image(path, e))?
        .to_rgb8())
}

fn open_gray(path: &Path) -> Result<GrayImage> {
    Ok(image::open(path)
        .map_err(|e| Error::image(path, e))?
        .to_luma8())
}

/// Build the generator input for a transformed sample
///
/// Texture patches are cut from the texture image at random locations and
/// pasted at the same locations of an otherwise empty canvas.
pub fn assemble<R: Rng + ?Sized>(
    sample: TransformedSample,
    patch: PatchConfig,
    rng: &mut R,
) -> Example {
    let texture = sample.texture.stacked();
    let size = texture.size();
    let (height, width) = (size[1], size[2]);

    let canvas = Tensor::zeros([3, height, width], (Kind::Float, texture.device()));
    let max_side = (patch.max_size as i64).min(height).min(width);
    let min_side = (patch.min_size as i64).clamp(1, max_side);

    for _ in 0..patch.count {
        let side = rng.gen_range(min_side..=max_side);
        let y = rng.gen_range(0..=height - side);
        let x = rng.gen_range(0..=width - side);

        let source = texture.narrow(1, y, side).narrow(2, x, side);
        let mut dest = canvas.narrow(1, y, side).narrow(2, x, side);
        dest.copy_(&source);
    }

    let input = Tensor::cat(&[&sample.sketch, &canvas, &sample.segment], 0);

    Example {
        input,
        target: sample.image.stacked(),
        texture,
        segment: sample.segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColorSpace;
    use image::{Luma, Rgb};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn write_split(root: &Path, split: &str, count: usize, size: u32) {
        for dir in [IMAGE_DIR, SKETCH_DIR, SEGMENT_DIR, TEXTURE_DIR] {
            std::fs::create_dir_all(root.join(split).join(dir)).unwrap();
        }
        for i in 0..count {
            let name = format!("{:03}.png", i);
            let img = RgbImage::from_fn(size, size, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, 90]));
            img.save(root.join(split).join(IMAGE_DIR).join(&name)).unwrap();
            img.save(root.join(split).join(TEXTURE_DIR).join(&name)).unwrap();
            RgbImage::from_pixel(size, size, Rgb([255, 255, 255]))
                .save(root.join(split).join(SKETCH_DIR).join(&name))
                .unwrap();
            GrayImage::from_pixel(size, size, Luma([255]))
                .save(root.join(split).join(SEGMENT_DIR).join(&name))
                .unwrap();
        }
    }

    fn patch() -> PatchConfig {
        PatchConfig {
            min_size: 8,
            max_size: 16,
            count: 1,
        }
    }

    #[test]
    fn test_image_folder_example_shapes() {
        let dir = tempdir().unwrap();
        write_split(dir.path(), "train", 3, 36);

        let pipeline = TransformPipeline::new(32, 32, 36, ColorSpace::Lab);
        let dataset = ImageFolder::new("train", dir.path(), pipeline, patch()).unwrap();
        assert_eq!(dataset.len(), 3);

        let mut rng = StdRng::seed_from_u64(0);
        let example = dataset.get(1, &mut rng).unwrap();
        assert_eq!(example.input.size(), vec![5, 32, 32]);
        assert_eq!(example.target.size(), vec![3, 32, 32]);
        assert_eq!(example.texture.size(), vec![3, 32, 32]);
        assert_eq!(example.segment.size(), vec![1, 32, 32]);
    }

    #[test]
    fn test_patch_is_pasted() {
        let dir = tempdir().unwrap();
        write_split(dir.path(), "train", 1, 32);

        let pipeline = TransformPipeline::new(32, 32, 32, ColorSpace::Rgb);
        let dataset = ImageFolder::new("train", dir.path(), pipeline, patch()).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let example = dataset.get(0, &mut rng).unwrap();

        let canvas = example.input.narrow(0, 1, 3);
        let nonzero = canvas.ne(0.0).sum(Kind::Int64).int64_value(&[]);
        assert!(nonzero >= 3 * 8 * 8 - 3 * 16);
        assert!(nonzero <= 3 * 16 * 16);
    }

    #[test]
    fn test_empty_split() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("val").join(IMAGE_DIR)).unwrap();

        let pipeline = TransformPipeline::new(32, 32, 32, ColorSpace::Lab);
        let err = ImageFolder::new("val", dir.path(), pipeline, patch()).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset { .. }));
    }

    #[test]
    fn test_missing_counterpart() {
        let dir = tempdir().unwrap();
        write_split(dir.path(), "train", 2, 32);
        std::fs::remove_file(dir.path().join("train").join(SEGMENT_DIR).join("001.png")).unwrap();

        let pipeline = TransformPipeline::new(32, 32, 32, ColorSpace::Lab);
        let err = ImageFolder::new("train", dir.path(), pipeline, patch()).unwrap_err();
        assert!(matches!(err, Error::MissingCounterpart { .. }));
    }

    #[test]
    fn test_undecodable_image_fails() {
        let dir = tempdir().unwrap();
        write_split(dir.path(), "train", 1, 32);
        std::fs::write(dir.path().join("train").join(IMAGE_DIR).join("000.png"), b"not a png").unwrap();

        let pipeline = TransformPipeline::new(32, 32, 32, ColorSpace::Lab);
        let dataset = ImageFolder::new("train", dir.path(), pipeline, patch()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = dataset.get(0, &mut rng).unwrap_err();
        assert!(matches!(err, Error::Image { .. }));
    }
}
