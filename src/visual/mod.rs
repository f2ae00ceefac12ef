//! Visualisation sinks
//!
//! Training pushes image grids and loss curves to a sink every few steps.
//! Sinks are write-only; their failures are reported to the caller, which
//! logs them and carries on.

mod image_dir;
mod visdom;

pub use image_dir::ImageDirSink;
pub use visdom::VisdomSink;

use image::{ImageEncoder, RgbImage};
use tch::{Device, Kind, Tensor};

use crate::error::{Error, Result};
use crate::training::LossHistory;
use crate::utils::{DisplayConfig, SinkKind};

/// Destination of training visuals
pub trait VisualSink {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Show a batch of RGB images in `[0, 1]`, shape `[N, 3, H, W]`
    fn images(&mut self, window: &str, images: &Tensor, step: u64) -> Result<()>;

    /// Show every loss series
    fn losses(&mut self, history: &LossHistory, step: u64) -> Result<()>;
}

/// Sink that drops everything
#[derive(Debug, Default)]
pub struct NullSink;

impl VisualSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn images(&mut self, _window: &str, _images: &Tensor, _step: u64) -> Result<()> {
        Ok(())
    }

    fn losses(&mut self, _history: &LossHistory, _step: u64) -> Result<()> {
        Ok(())
    }
}

/// Build the sink selected in the display configuration
pub fn make_sink(display: &DisplayConfig) -> Result<Box<dyn VisualSink>> {
    let sink: Box<dyn VisualSink> = match display.sink {
        SinkKind::Visdom => Box::new(VisdomSink::new(&display.server, display.port, &display.env)?),
        SinkKind::Images => Box::new(ImageDirSink::new(&display.image_dir)?),
        SinkKind::None => Box::new(NullSink),
    };
    tracing::info!("Visualising to {}", sink.name());
    Ok(sink)
}

/// Tile a batch `[N, 3, H, W]` into one image, `nrow` tiles per row
pub fn make_grid(images: &Tensor, nrow: i64, padding: i64) -> Result<RgbImage> {
    let images = images.to_device(Device::Cpu).to_kind(Kind::Float);
    let size = images.size();
    if size.len() != 4 || size[1] != 3 {
        return Err(Error::Sink(format!("expected [N, 3, H, W] images, got {:?}", size)));
    }
    let (n, h, w) = (size[0], size[2], size[3]);
    let ncol = nrow.clamp(1, n.max(1));
    let nrows = (n + ncol - 1) / ncol;

    let grid_h = nrows * (h + padding) + padding;
    let grid_w = ncol * (w + padding) + padding;
    let grid = Tensor::zeros([3, grid_h, grid_w], (Kind::Float, Device::Cpu));

    for i in 0..n {
        let y = (i / ncol) * (h + padding) + padding;
        let x = (i % ncol) * (w + padding) + padding;
        let mut tile = grid.narrow(1, y, h).narrow(2, x, w);
        tile.copy_(&images.get(i));
    }

    let bytes = (grid.clamp(0.0, 1.0) * 255.0)
        .round()
        .to_kind(Kind::Uint8)
        .permute([1, 2, 0])
        .contiguous()
        .view([-1]);
    let raw = Vec::<u8>::try_from(&bytes)?;

    RgbImage::from_raw(grid_w as u32, grid_h as u32, raw)
        .ok_or_else(|| Error::Sink("grid buffer has the wrong size".to_string()))
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Sink(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_grid_layout() {
        let images = Tensor::ones([5, 3, 4, 4], (Kind::Float, Device::Cpu));
        let grid = make_grid(&images, 2, 1).unwrap();

        // 2 columns, 3 rows of 4px tiles with 1px padding
        assert_eq!(grid.dimensions(), (11, 16));
        assert_eq!(grid.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(grid.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_make_grid_rejects_single_channel() {
        let images = Tensor::ones([2, 1, 4, 4], (Kind::Float, Device::Cpu));
        assert!(matches!(make_grid(&images, 2, 1), Err(Error::Sink(_))));
    }

    #[test]
    fn test_encode_png_signature() {
        let image = RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_null_sink() {
        let mut sink = NullSink;
        let images = Tensor::zeros([1, 3, 2, 2], (Kind::Float, Device::Cpu));
        assert!(sink.images("x", &images, 1).is_ok());
        assert!(sink.losses(&LossHistory::new(), 1).is_ok());
    }
}
