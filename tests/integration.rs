//! Integration tests for TextureGAN training

mod common;

use tch::{Device, Kind, Tensor};
use tempfile::tempdir;

use texturegan::data::{DataLoader, ImageFolder, PatchConfig, TransformPipeline};
use texturegan::model::{GeneratorKind, ModelBundle, INPUT_NC};
use texturegan::training::{load_display_batch, SERIES};
use texturegan::utils::{checkpoint_path, load_checkpoint_meta, save_network, NetworkLabel, SinkKind};
use texturegan::visual::{make_sink, NullSink};
use texturegan::{Config, Error, Trainer};

fn loader(config: &Config, split: &str) -> DataLoader {
    loader_with(config, split, false)
}

fn loader_with(config: &Config, split: &str, drop_last: bool) -> DataLoader {
    let data = &config.data;
    let pipeline = TransformPipeline::new(data.image_size, data.resize_min, data.resize_max, data.color_space);
    let patch = PatchConfig {
        min_size: data.patch_size_min,
        max_size: data.patch_size_max,
        count: data.num_input_texture_patch,
    };
    let dataset = ImageFolder::new(split, &data.data_path, pipeline, patch).unwrap();
    DataLoader::new(dataset, data.batch_size, true, drop_last).with_seed(config.training.seed.unwrap())
}

#[test]
fn test_one_epoch_records_every_series() {
    let dir = tempdir().unwrap();
    let config = common::setup(dir.path());
    assert!(config.validate().is_ok());

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    assert_eq!(train.num_batches(), 2);

    let mut trainer = Trainer::new(config, Box::new(NullSink));
    let history = trainer.train(&mut bundle, &mut train).unwrap();

    let names: Vec<&str> = history.series_names().collect();
    assert_eq!(names.len(), 7);
    for name in SERIES {
        let values = history.get(name).unwrap();
        assert_eq!(values.len(), 2, "series {}", name);
        assert!(values.iter().all(|v| v.is_finite()), "series {}", name);
    }
    assert_eq!(trainer.global_step(), 2);
    assert!(dir.path().join("checkpoints").join("loss_history.csv").is_file());
}

#[test]
fn test_unknown_model_trains_as_scribbler() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.model.model = "foobar".to_string();

    let logs = common::CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let mut bundle =
        tracing::subscriber::with_default(subscriber, || ModelBundle::new(&config, Device::Cpu)).unwrap();
    assert_eq!(bundle.kind(), GeneratorKind::Scribbler);

    let output = logs.contents();
    assert!(
        output.lines().any(|line| line.contains("WARN") && line.contains("foobar")),
        "no fallback warning in: {}",
        output
    );

    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config, Box::new(NullSink));
    assert!(trainer.train(&mut bundle, &mut train).is_ok());
}

#[test]
fn test_resume_from_missing_checkpoint() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.model.load = Some(5);

    let err = ModelBundle::new(&config, Device::Cpu).err().unwrap();
    match err {
        Error::CheckpointNotFound { path } => {
            assert_eq!(path, checkpoint_path(&config.model.load_dir, NetworkLabel::G, 5));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_checkpoint_roundtrip_is_bit_identical() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());

    let bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    save_network(&bundle.gen_vs, NetworkLabel::G, 12, &config.model.load_dir).unwrap();
    save_network(&bundle.disc_vs, NetworkLabel::D, 12, &config.model.load_dir).unwrap();

    config.model.load = Some(12);
    config.model.load_d = Some(12);
    let restored = ModelBundle::new(&config, Device::Cpu).unwrap();

    let input = Tensor::randn([3, INPUT_NC, 32, 32], (Kind::Float, Device::Cpu));
    assert!(bundle.generate(&input).equal(&restored.generate(&input)));

    let target = Tensor::randn([3, 1, 32, 32], (Kind::Float, Device::Cpu));
    let before = tch::no_grad(|| bundle.discriminator.forward_t(&target, false));
    let after = tch::no_grad(|| restored.discriminator.forward_t(&target, false));
    assert!(before.equal(&after));
}

#[test]
fn test_periodic_checkpoints_and_visuals() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.training.save_every = 2;
    config.training.visualize_every = 1;
    config.display.sink = SinkKind::Images;

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let val = loader(&config, "val").dataset().clone();
    let display = load_display_batch(val, 4, Some(1)).unwrap();
    assert_eq!(display.size(), 4);

    let sink = make_sink(&config.display).unwrap();
    let mut trainer = Trainer::new(config.clone(), sink);
    trainer.set_display_batch(display);
    trainer.train(&mut bundle, &mut train).unwrap();

    let save_dir = std::path::Path::new(&config.training.save_dir);
    assert!(checkpoint_path(save_dir, NetworkLabel::G, 2).is_file());
    assert!(checkpoint_path(save_dir, NetworkLabel::D, 2).is_file());
    let meta = load_checkpoint_meta(save_dir, 2).unwrap();
    assert_eq!(meta.step, 2);
    assert_eq!(meta.model, "scribbler");
    assert_eq!(meta.losses.len(), 7);

    let visuals = std::path::Path::new(&config.display.image_dir);
    assert!(visuals.join("1_output.png").is_file());
    assert!(visuals.join("2_target.png").is_file());
    assert!(visuals.join("loss_history.csv").is_file());
}

#[test]
fn test_resume_continues_step_labels() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());

    let bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    save_network(&bundle.gen_vs, NetworkLabel::G, 4, &config.model.load_dir).unwrap();

    config.model.load = Some(4);
    config.training.save_every = 6;
    let mut resumed = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config.clone(), Box::new(NullSink));
    trainer.train(&mut resumed, &mut train).unwrap();

    assert_eq!(trainer.global_step(), 6);
    assert!(checkpoint_path(&config.training.save_dir, NetworkLabel::G, 6).is_file());
}

#[test]
fn test_non_finite_loss_aborts_when_requested() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.loss.style_weight = f64::NAN;
    config.training.abort_on_non_finite = true;

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config, Box::new(NullSink));

    match trainer.train(&mut bundle, &mut train) {
        Err(Error::NonFiniteLoss { series, step, .. }) => {
            assert_eq!(series, "g");
            assert_eq!(step, 1);
        }
        other => panic!("expected a non-finite loss error, got {:?}", other.map(|h| h.len())),
    }
}

#[test]
fn test_non_finite_loss_only_warns_by_default() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.loss.style_weight = f64::NAN;

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config, Box::new(NullSink));

    let history = trainer.train(&mut bundle, &mut train).unwrap();
    assert!(history.get("g").unwrap()[0].is_nan());
}

#[test]
fn test_rgb_training_step() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.data.color_space = texturegan::ColorSpace::Rgb;
    config.model.model = "texturegan".to_string();
    config.model.gan = "dcgan".to_string();

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config, Box::new(NullSink));

    let history = trainer.train(&mut bundle, &mut train).unwrap();
    assert_eq!(history.len(), 2);
}

#[test]
fn test_split_smaller_than_batch_keeps_partial_batch() {
    let dir = tempdir().unwrap();
    common::write_split(&dir.path().join("data"), "train", 3);
    let config = common::small_config(dir.path());
    assert_eq!(config.data.batch_size, 4);

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    assert_eq!(train.num_batches(), 1);

    let mut trainer = Trainer::new(config, Box::new(NullSink));
    let history = trainer.train(&mut bundle, &mut train).unwrap();
    assert_eq!(history.get("g").unwrap().len(), 1);
    assert_eq!(trainer.global_step(), 1);
}

#[test]
fn test_training_without_batches_fails() {
    let dir = tempdir().unwrap();
    common::write_split(&dir.path().join("data"), "train", 3);
    let config = common::small_config(dir.path());

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader_with(&config, "train", true);
    assert_eq!(train.num_batches(), 0);

    let mut trainer = Trainer::new(config, Box::new(NullSink));
    let err = trainer.train(&mut bundle, &mut train).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(trainer.global_step(), 0);
}

#[test]
fn test_train_rejects_zero_intervals() {
    let dir = tempdir().unwrap();
    let mut config = common::setup(dir.path());
    config.training.save_every = 0;

    let mut bundle = ModelBundle::new(&config, Device::Cpu).unwrap();
    let mut train = loader(&config, "train");
    let mut trainer = Trainer::new(config, Box::new(NullSink));

    let err = trainer.train(&mut bundle, &mut train).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
    assert!(trainer.history().is_empty());
}
