//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

use texturegan::data::{IMAGE_DIR, SEGMENT_DIR, SKETCH_DIR, TEXTURE_DIR};
use texturegan::utils::SinkKind;
use texturegan::Config;

/// Write `count` paired 40x40 samples into `{root}/{split}`
pub fn write_split(root: &Path, split: &str, count: usize) {
    for dir in [IMAGE_DIR, SKETCH_DIR, SEGMENT_DIR, TEXTURE_DIR] {
        std::fs::create_dir_all(root.join(split).join(dir)).unwrap();
    }
    for i in 0..count {
        let name = format!("sample_{:02}.png", i);
        let split_dir = root.join(split);
        let shade = (i * 25) as u8;

        RgbImage::from_fn(40, 40, |x, y| Rgb([shade, (x * 6) as u8, (y * 6) as u8]))
            .save(split_dir.join(IMAGE_DIR).join(&name))
            .unwrap();
        RgbImage::from_fn(40, 40, |x, _| {
            if x % 10 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
        .save(split_dir.join(SKETCH_DIR).join(&name))
        .unwrap();
        GrayImage::from_fn(40, 40, |_, y| Luma([if y < 20 { 255 } else { 0 }]))
            .save(split_dir.join(SEGMENT_DIR).join(&name))
            .unwrap();
        RgbImage::from_fn(40, 40, |x, y| Rgb([((x + y) * 3) as u8, 120, shade]))
            .save(split_dir.join(TEXTURE_DIR).join(&name))
            .unwrap();
    }
}

/// Small, fast configuration over a dataset written by [`write_split`]
pub fn small_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.data.data_path = root.join("data").to_string_lossy().to_string();
    config.data.image_size = 32;
    config.data.resize_min = 32;
    config.data.resize_max = 40;
    config.data.patch_size_min = 4;
    config.data.patch_size_max = 8;
    config.data.batch_size = 4;
    config.model.ngf = 4;
    config.model.ndf = 4;
    config.model.content_layers = "relu2_2".to_string();
    config.model.style_layers = "relu1_2, relu2_1".to_string();
    config.model.load_dir = root.join("checkpoints").to_string_lossy().to_string();
    config.training.num_epoch = 1;
    config.training.save_dir = root.join("checkpoints").to_string_lossy().to_string();
    config.training.seed = Some(7);
    config.display.sink = SinkKind::None;
    config.display.image_dir = root.join("visuals").to_string_lossy().to_string();
    config
}

/// Dataset with 8 training and 4 validation samples
pub fn setup(root: &Path) -> Config {
    write_split(&root.join("data"), "train", 8);
    write_split(&root.join("data"), "val", 4);
    small_config(root)
}

/// Log sink collecting formatted tracing output in memory
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
