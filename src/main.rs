//! TextureGAN training CLI
//!
//! Main entry point providing CLI interface for:
//! - Training the generator and discriminator
//! - Rendering a restored generator over validation samples
//! - Writing a default configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::info;

use texturegan::{
    data::{to_display_rgb, ColorSpace, DataLoader, ImageFolder, PatchConfig, TransformPipeline},
    model::{build_generator, ModelBundle},
    training::{load_display_batch, Trainer},
    utils::{ensure_config_exists, setup_logging, Config, SinkKind},
    visual::{make_grid, make_sink},
};

/// Texture-guided image synthesis with a conditional GAN
#[derive(Parser)]
#[command(name = "texturegan")]
#[command(version = "0.1.0")]
#[command(about = "Train a sketch, texture and segment conditioned image generator")]
struct Cli {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the generator and discriminator
    Train(TrainArgs),

    /// Run a restored generator over validation samples and save a PNG grid
    Generate {
        /// Step label of the generator checkpoint
        #[arg(short, long)]
        load: u64,

        /// Directory holding the checkpoint
        #[arg(long)]
        load_dir: Option<String>,

        /// Number of samples
        #[arg(short, long, default_value = "16")]
        num_samples: usize,

        /// Output PNG path
        #[arg(short, long, default_value = "generated.png")]
        output: String,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.json")]
        output: String,
    },
}

/// Overrides applied on top of the configuration file
#[derive(clap::Args)]
struct TrainArgs {
    /// Generator variant: scribbler, texturegan, pix2pix, scribbler_dilate_128
    #[arg(long)]
    model: Option<String>,

    /// Colour space: lab or rgb
    #[arg(long)]
    color_space: Option<ColorSpace>,

    /// Adversarial loss: lsgan or dcgan
    #[arg(long)]
    gan: Option<String>,

    /// Number of epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Dataset root holding train/ and val/
    #[arg(short, long)]
    data_path: Option<String>,

    /// Resume the generator from this step
    #[arg(long)]
    load: Option<u64>,

    /// Resume the discriminator from this step
    #[arg(long)]
    load_d: Option<u64>,

    /// Visdom port
    #[arg(long)]
    display_port: Option<u16>,

    /// Visual sink: visdom, images or none
    #[arg(long)]
    sink: Option<String>,

    /// Device: cpu, cuda or cuda:N
    #[arg(long)]
    device: Option<String>,
}

impl TrainArgs {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(model) = self.model {
            config.model.model = model;
        }
        if let Some(color_space) = self.color_space {
            config.data.color_space = color_space;
        }
        if let Some(gan) = self.gan {
            config.model.gan = gan;
        }
        if let Some(epochs) = self.epochs {
            config.training.num_epoch = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.data.batch_size = batch_size;
        }
        if let Some(data_path) = self.data_path {
            config.data.data_path = data_path;
        }
        if self.load.is_some() {
            config.model.load = self.load;
        }
        if self.load_d.is_some() {
            config.model.load_d = self.load_d;
        }
        if let Some(port) = self.display_port {
            config.display.port = port;
        }
        if let Some(sink) = self.sink {
            config.display.sink = serde_json::from_value(serde_json::Value::String(sink.clone()))
                .with_context(|| format!("unknown sink `{}`", sink))?;
        }
        if let Some(device) = self.device {
            config.training.device = device;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity);

    match cli.command {
        Commands::Train(args) => {
            let mut config = load_config(&cli.config)?;
            args.apply(&mut config)?;
            train_model(config)?;
        }
        Commands::Generate {
            load,
            load_dir,
            num_samples,
            output,
        } => {
            let mut config = load_config(&cli.config)?;
            config.model.load = Some(load);
            if let Some(dir) = load_dir {
                config.model.load_dir = dir;
            }
            generate_samples(&config, num_samples, &output)?;
        }
        Commands::Init { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("reading {}", path))
    } else {
        info!("Config file {} not found, using defaults", path);
        Ok(Config::default())
    }
}

fn dataset(config: &Config, split: &str) -> Result<ImageFolder> {
    let data = &config.data;
    let pipeline = TransformPipeline::new(
        data.image_size,
        data.resize_min,
        data.resize_max,
        data.color_space,
    );
    let patch = PatchConfig {
        min_size: data.patch_size_min,
        max_size: data.patch_size_max,
        count: data.num_input_texture_patch,
    };
    Ok(ImageFolder::new(split, &data.data_path, pipeline, patch)?)
}

/// Train the conditional GAN
fn train_model(config: Config) -> Result<()> {
    config.validate()?;

    if let Some(seed) = config.training.seed {
        tch::manual_seed(seed as i64);
    }

    let device = config.get_device();
    info!("Using device: {:?}", device);

    let train = dataset(&config, "train")?;
    let mut loader = DataLoader::new(train, config.data.batch_size, true, false)
        .with_prefetch(config.data.prefetch);
    if let Some(seed) = config.training.seed {
        loader = loader.with_seed(seed);
    }

    let val = dataset(&config, "val")?;
    let display = load_display_batch(val, config.data.batch_size, config.training.seed)?;

    let mut bundle = ModelBundle::new(&config, device)?;
    info!(
        "Model: {}, GAN: {}, colour space: {}",
        bundle.kind(),
        bundle.criterions.gan,
        bundle.color_space
    );

    let sink = make_sink(&config.display)?;
    let mut trainer = Trainer::new(config, sink);
    trainer.set_display_batch(display);

    let history = trainer.train(&mut bundle, &mut loader)?;
    let latest = history.latest();
    info!(
        "Training complete. Final G: {:.4}, D: {:.4}",
        latest.get("g").copied().unwrap_or(0.0),
        latest.get("d").copied().unwrap_or(0.0)
    );

    Ok(())
}

/// Render a restored generator over validation samples
fn generate_samples(config: &Config, num_samples: usize, output_path: &str) -> Result<()> {
    let device = config.get_device();
    let (_vs, generator) = build_generator(config, device)?;
    info!(
        "Loaded {} generator from step {}",
        generator.kind(),
        config.model.load.unwrap_or_default()
    );

    let val = dataset(config, "val")?;
    let batch = load_display_batch(val, num_samples.max(1), config.training.seed)?;
    let output = generator.generate(&batch.input.to_device(device));

    let images = to_display_rgb(&output, config.data.color_space)?;
    let nrow = (images.size()[0] as f64).sqrt().ceil() as i64;
    let grid = make_grid(&images, nrow, 2)?;

    if let Some(parent) = Path::new(output_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    grid.save(output_path)?;
    info!("Saved {} samples to {}", images.size()[0], output_path);

    Ok(())
}

/// Write a default configuration, keeping an existing file untouched
fn init_config(output_path: &str) -> Result<()> {
    let existed = Path::new(output_path).exists();
    let config = ensure_config_exists(output_path)?;

    if existed {
        info!("Configuration {} already exists, left unchanged", output_path);
    } else {
        info!("Created default configuration at {}", output_path);
    }
    if config.display.sink == SinkKind::Visdom {
        info!(
            "Visuals go to Visdom at {}:{}",
            config.display.server, config.display.port
        );
    }
    Ok(())
}
