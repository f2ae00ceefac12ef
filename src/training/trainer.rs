//! Training loop for the conditional GAN
//!
//! Every step runs two phases that never overlap:
//! 1. Discriminator phase on real targets and detached generator output
//! 2. Generator phase on the weighted sum of adversarial, pixel, feature
//!    and style terms, with the discriminator frozen
//!
//! Gradients are cleared between the phases.

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Kind, Tensor};
use tracing::{info, warn};

use super::history::{LossHistory, StepLosses};
use crate::data::{to_display_rgb, Batch, ColorSpace, DataLoader, ImageFolder};
use crate::error::{Error, Result};
use crate::model::{gram_matrix, vgg_input, ModelBundle};
use crate::utils::{save_checkpoint, Config, LossConfig};
use crate::visual::VisualSink;

/// Weights of the generator loss terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    /// Adversarial
    pub d: f64,
    /// Pixel, L channel (channel 0 in rgb)
    pub l: f64,
    /// Pixel, AB channels (channels 1..3 in rgb)
    pub ab: f64,
    /// Feature
    pub f: f64,
    /// Style
    pub s: f64,
}

impl LossWeights {
    /// Weights applied in the given colour space
    pub fn from_config(loss: &LossConfig, color_space: ColorSpace) -> Self {
        let (l, ab) = loss.pixel_weights(color_space);
        Self {
            d: loss.discriminator_weight,
            l,
            ab,
            f: loss.feature_weight,
            s: loss.style_weight,
        }
    }
}

/// Unweighted generator loss terms of one step
pub struct GeneratorTerms {
    pub gd: Tensor,
    pub gpl: Tensor,
    pub gpab: Tensor,
    pub gf: Tensor,
    pub gs: Tensor,
}

impl GeneratorTerms {
    /// `w_d*gd + w_l*gpl + w_ab*gpab + w_f*gf + w_s*gs`
    pub fn total(&self, w: &LossWeights) -> Tensor {
        &self.gd * w.d + &self.gpl * w.l + &self.gpab * w.ab + &self.gf * w.f + &self.gs * w.s
    }
}

fn sum_terms(terms: Vec<Tensor>) -> Tensor {
    Tensor::stack(&terms, 0).sum(Kind::Float)
}

/// Compute every generator loss term for a generated batch
///
/// Target and texture features are computed without gradient tracking.
pub fn generator_loss_terms(bundle: &ModelBundle, fake: &Tensor, batch: &Batch) -> GeneratorTerms {
    let c = &bundle.criterions;
    let target = &batch.target;

    let scores = bundle.discriminator.forward_t(&bundle.visible(fake), true);
    let gd = c.gan.forward(&scores, bundle.labels.real);

    let gpl = c.pixel_l.forward(&fake.narrow(1, 0, 1), &target.narrow(1, 0, 1));
    let gpab = c.pixel_ab.forward(&fake.narrow(1, 1, 2), &target.narrow(1, 1, 2));

    let fake_vgg = vgg_input(&bundle.visible(fake));

    let fake_content = bundle.content.forward(&fake_vgg);
    let target_content =
        tch::no_grad(|| bundle.content.forward(&vgg_input(&bundle.visible(target))));
    let gf = sum_terms(
        fake_content
            .iter()
            .zip(&target_content)
            .map(|(f, t)| c.feature.forward(f, &t.detach()))
            .collect(),
    );

    let fake_style = bundle.style.forward(&fake_vgg);
    let texture_style =
        tch::no_grad(|| bundle.style.forward(&vgg_input(&bundle.visible(&batch.texture))));
    let gs = sum_terms(
        fake_style
            .iter()
            .zip(&texture_style)
            .map(|(f, t)| c.style.forward(&gram_matrix(f), &gram_matrix(&t.detach())))
            .collect(),
    );

    GeneratorTerms {
        gd,
        gpl,
        gpab,
        gf,
        gs,
    }
}

/// Discriminator phase: update D on real targets and detached fakes
///
/// # Returns
///
/// The discriminator loss
pub fn discriminator_phase(bundle: &mut ModelBundle, fake: &Tensor, batch: &Batch) -> f64 {
    bundle.gen_opt.zero_grad();
    bundle.disc_opt.zero_grad();

    let gan = bundle.criterions.gan;
    let real_scores = bundle
        .discriminator
        .forward_t(&bundle.visible(&batch.target), true);
    let fake_scores = bundle
        .discriminator
        .forward_t(&bundle.visible(&fake.detach()), true);

    let loss = gan.forward(&real_scores, bundle.labels.real) + gan.forward(&fake_scores, bundle.labels.fake);
    loss.backward();
    bundle.disc_opt.step();

    loss.double_value(&[])
}

/// Clear accumulated gradients and freeze the discriminator
pub fn phase_barrier(bundle: &mut ModelBundle) {
    bundle.gen_opt.zero_grad();
    bundle.disc_opt.zero_grad();
    bundle.disc_vs.freeze();
}

/// Generator phase: update G on the weighted loss, then unfreeze D
///
/// Expects [`phase_barrier`] to have run.
pub fn generator_phase(
    bundle: &mut ModelBundle,
    fake: &Tensor,
    batch: &Batch,
    weights: &LossWeights,
) -> StepLosses {
    let terms = generator_loss_terms(bundle, fake, batch);
    let total = terms.total(weights);

    total.backward();
    bundle.gen_opt.step();
    bundle.disc_vs.unfreeze();

    StepLosses {
        g: total.double_value(&[]),
        gd: terms.gd.double_value(&[]),
        gf: terms.gf.double_value(&[]),
        gpl: terms.gpl.double_value(&[]),
        gpab: terms.gpab.double_value(&[]),
        gs: terms.gs.double_value(&[]),
        d: 0.0,
    }
}

/// One full training step on a batch already on the bundle's device
pub fn train_step(bundle: &mut ModelBundle, batch: &Batch, weights: &LossWeights) -> StepLosses {
    let fake = bundle.generator.forward_t(&batch.input, true);

    let d = discriminator_phase(bundle, &fake, batch);
    phase_barrier(bundle);
    let losses = generator_phase(bundle, &fake, batch, weights);

    StepLosses { d, ..losses }
}

/// Load a fixed batch of validation samples for visualisation
///
/// Samples are picked at random once; the same batch is shown for the whole run.
pub fn load_display_batch(val: ImageFolder, batch_size: usize, seed: Option<u64>) -> Result<Batch> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..val.len()).collect();
    indices.shuffle(&mut rng);
    indices.truncate(batch_size);

    let mut loader = DataLoader::new(val, batch_size, false, false).with_sampler(indices);
    if let Some(seed) = seed {
        loader = loader.with_seed(seed);
    }
    let batch = loader.iter().next();
    batch.unwrap_or(Err(Error::LoaderDisconnected))
}

fn push_images(
    sink: &mut dyn VisualSink,
    bundle: &ModelBundle,
    display: &Batch,
    step: u64,
) -> Result<()> {
    let cs = bundle.color_space;
    let output = bundle.generate(&display.input);

    let sketch = to_display_rgb(&display.input.narrow(1, 0, 1), cs)?;
    let patch = to_display_rgb(&display.input.narrow(1, 1, 3), cs)?;

    sink.images("sketch", &sketch, step)?;
    sink.images("texture_patch", &patch, step)?;
    sink.images("output", &to_display_rgb(&output, cs)?, step)?;
    sink.images("target", &to_display_rgb(&display.target, cs)?, step)?;
    sink.images("texture", &to_display_rgb(&display.texture, cs)?, step)
}

/// GAN trainer
pub struct Trainer {
    config: Config,
    weights: LossWeights,
    history: LossHistory,
    global_step: u64,
    epoch: usize,
    sink: Box<dyn VisualSink>,
    display: Option<Batch>,
}

impl Trainer {
    /// Create a new trainer
    ///
    /// The step counter starts at the resumed generator step, if any, so
    /// checkpoint labels keep increasing across runs.
    pub fn new(config: Config, sink: Box<dyn VisualSink>) -> Self {
        let weights = LossWeights::from_config(&config.loss, config.data.color_space);
        let global_step = config.model.load.unwrap_or(0);

        Self {
            config,
            weights,
            history: LossHistory::new(),
            global_step,
            epoch: 0,
            sink,
            display: None,
        }
    }

    /// Set the validation batch shown on every visualisation
    pub fn set_display_batch(&mut self, batch: Batch) {
        self.display = Some(batch);
    }

    /// Train for the configured number of epochs
    ///
    /// # Arguments
    ///
    /// * `bundle` - Networks, optimizers and criterions
    /// * `loader` - DataLoader providing training batches
    ///
    /// # Returns
    ///
    /// Loss history
    pub fn train(&mut self, bundle: &mut ModelBundle, loader: &mut DataLoader) -> Result<&LossHistory> {
        self.config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if loader.num_batches() == 0 {
            return Err(Error::Config(format!(
                "{} split has {} samples, too few for a batch of {}",
                loader.dataset().split(),
                loader.num_samples(),
                loader.batch_size()
            )));
        }

        let epochs = self.config.training.num_epoch;
        info!(
            "Starting training for {} epochs, {} batches per epoch",
            epochs,
            loader.num_batches()
        );

        for _ in 0..epochs {
            self.train_epoch(bundle, loader)?;
        }

        let save_dir = std::path::Path::new(&self.config.training.save_dir);
        std::fs::create_dir_all(save_dir)?;
        if let Err(e) = self.history.save_csv(save_dir.join("loss_history.csv")) {
            warn!("Failed to save loss history: {}", e);
        }

        Ok(&self.history)
    }

    /// Run one epoch over the loader
    pub fn train_epoch(&mut self, bundle: &mut ModelBundle, loader: &mut DataLoader) -> Result<()> {
        let num_batches = loader.num_batches();
        let pb = ProgressBar::new(num_batches as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let mut batch_count = 0usize;
        for batch in loader.iter() {
            let batch = batch?.to_device(bundle.device);
            let losses = train_step(bundle, &batch, &self.weights);

            self.global_step += 1;
            batch_count += 1;
            self.history.record(&losses);
            self.check_finite(&losses)?;

            pb.set_message(format!("G: {:.4}, D: {:.4}", losses.g, losses.d));
            pb.inc(1);

            if self.global_step % self.config.training.visualize_every == 0 {
                self.visualize(bundle);
            }

            if self.global_step % self.config.training.save_every == 0 {
                if let Err(e) = save_checkpoint(
                    bundle,
                    &self.history,
                    self.global_step,
                    self.epoch,
                    &self.config.training.save_dir,
                ) {
                    warn!("Failed to save checkpoint: {}", e);
                }
            }
        }

        pb.finish_with_message("done");
        self.epoch += 1;

        let window = batch_count.max(1);
        info!(
            "Epoch {}/{}: step={}, G={:.4} (gd={:.4}, gpl={:.4}, gpab={:.4}, gf={:.4}, gs={:.4}), D={:.4}",
            self.epoch,
            self.config.training.num_epoch,
            self.global_step,
            self.history.recent_mean("g", window),
            self.history.recent_mean("gd", window),
            self.history.recent_mean("gpl", window),
            self.history.recent_mean("gpab", window),
            self.history.recent_mean("gf", window),
            self.history.recent_mean("gs", window),
            self.history.recent_mean("d", window),
        );

        Ok(())
    }

    fn check_finite(&self, losses: &StepLosses) -> Result<()> {
        if let Some((series, value)) = losses.first_non_finite() {
            warn!(
                "Non-finite {} loss ({}) at step {}",
                series, value, self.global_step
            );
            if self.config.training.abort_on_non_finite {
                return Err(Error::NonFiniteLoss {
                    series,
                    value,
                    step: self.global_step,
                });
            }
        }
        Ok(())
    }

    /// Push display images and loss curves to the sink
    ///
    /// Sink failures are logged and otherwise ignored.
    pub fn visualize(&mut self, bundle: &ModelBundle) {
        let step = self.global_step;
        if let Some(display) = &self.display {
            if let Err(e) = push_images(self.sink.as_mut(), bundle, display, step) {
                warn!("Failed to send images to {}: {}", self.sink.name(), e);
            }
        }
        if let Err(e) = self.sink.losses(&self.history, step) {
            warn!("Failed to send losses to {}: {}", self.sink.name(), e);
        }
    }

    /// Loss history so far
    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// Number of steps taken, including resumed ones
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
