// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-driven fine-tuning loop with Adam.
//
//   - Training runs on B (Autodiff<…>) for gradients, fed by a
//     seeded shuffling DataLoader
//   - Validation runs on model.valid(), i.e. B::InnerBackend,
//     every `val_interval` optimizer steps and once at the end
//   - The best validation loss decides which weights are kept
//     and triggers the autosave callback
//   - argmax(1) returns [batch, 1] so it is reshaped to [batch]
//     before comparing with the class targets

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::{BatchTargets, ClassifierBatch, ClassifierBatcher};
use crate::data::dataset::ClassifierDataset;
use crate::infra::metrics::{MetricsLogger, ValidationMetrics};
use crate::ml::model::ClassifierModel;
use crate::ml::schedule::WarmupLinearSchedule;

#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub batch_size:    usize,
    pub n_epochs:      usize,
    pub learning_rate: f64,
    /// Fraction of all steps spent in learning rate warmup.
    pub warmup:        f64,
    pub val_interval:  usize,
    pub seed:          u64,
    /// Log validation passes at info instead of debug.
    pub verbose:       bool,
}

/// What a fine-tuning run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs:           usize,
    pub steps:            usize,
    pub train_examples:   usize,
    pub val_examples:     usize,
    /// Mean loss over the last epoch.
    pub final_train_loss: f64,
    pub best_val_loss:    Option<f64>,
    pub best_step:        Option<usize>,
    pub validations:      Vec<ValidationMetrics>,
}

/// Keeps the best-so-far model and the validation history.
struct ValidationTracker<B: AutodiffBackend> {
    best:    Option<(ClassifierModel<B>, ValidationMetrics)>,
    history: Vec<ValidationMetrics>,
    verbose: bool,
}

impl<B: AutodiffBackend> ValidationTracker<B> {
    fn record(
        &mut self,
        model:          &ClassifierModel<B>,
        metrics:        ValidationMetrics,
        logger:         Option<&MetricsLogger>,
        on_improvement: &mut impl FnMut(&ClassifierModel<B>, &ValidationMetrics) -> Result<()>,
    ) -> Result<()> {
        let accuracy = metrics
            .val_accuracy
            .map(|a| format!(" | val_acc={:.1}%", a * 100.0))
            .unwrap_or_default();
        if self.verbose {
            tracing::info!(
                "Step {:>5} (epoch {}) | train_loss={:.4} | val_loss={:.4}{}",
                metrics.step, metrics.epoch, metrics.train_loss, metrics.val_loss, accuracy
            );
        } else {
            tracing::debug!(
                "Step {:>5} (epoch {}) | train_loss={:.4} | val_loss={:.4}{}",
                metrics.step, metrics.epoch, metrics.train_loss, metrics.val_loss, accuracy
            );
        }

        if let Some(logger) = logger {
            logger.log(&metrics)?;
        }

        let best_loss = self.best.as_ref().map(|(_, m)| m.val_loss);
        if metrics.is_improvement(best_loss) {
            on_improvement(model, &metrics)?;
            self.best = Some((model.clone(), metrics.clone()));
        }
        self.history.push(metrics);
        Ok(())
    }
}

/// Fine-tune `model` and return the weights with the best validation
/// loss (the last weights when there is no validation set).
pub fn train<B: AutodiffBackend>(
    model:              ClassifierModel<B>,
    train_set:          ClassifierDataset,
    val_set:            ClassifierDataset,
    settings:           &TrainerSettings,
    device:             &B::Device,
    logger:             Option<&MetricsLogger>,
    mut on_improvement: impl FnMut(&ClassifierModel<B>, &ValidationMetrics) -> Result<()>,
) -> Result<(ClassifierModel<B>, TrainingSummary)> {
    anyhow::ensure!(!train_set.is_empty(), "training set is empty");
    anyhow::ensure!(settings.batch_size > 0, "batch_size must be positive");
    anyhow::ensure!(settings.val_interval > 0, "val_interval must be positive");

    let mut model = model;
    let train_examples = train_set.len();
    let val_examples   = val_set.len();

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, ClassifierModel<B>>();

    let steps_per_epoch = train_examples.div_ceil(settings.batch_size);
    let schedule = WarmupLinearSchedule::new(
        settings.learning_rate,
        settings.warmup,
        steps_per_epoch * settings.n_epochs,
    );

    // ── Training data loader (AutodiffBackend, reshuffled every epoch) ───────
    let train_loader = DataLoaderBuilder::new(ClassifierBatcher::<B>::new())
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .set_device(device.clone())
        .build(train_set);

    // ── Validation data loader (InnerBackend, no autodiff overhead) ──────────
    let val_loader = (val_examples > 0).then(|| {
        DataLoaderBuilder::new(ClassifierBatcher::<B::InnerBackend>::new())
            .batch_size(settings.batch_size)
            .set_device(device.clone())
            .build(val_set)
    });

    tracing::info!(
        "Training on {} examples ({} validation) for {} epochs, {} steps per epoch",
        train_examples, val_examples, settings.n_epochs, steps_per_epoch
    );

    let mut tracker = ValidationTracker::<B> { best: None, history: Vec::new(), verbose: settings.verbose };

    let mut step             = 0usize;
    let mut window_loss      = 0.0f64;
    let mut window_batches   = 0usize;
    let mut final_train_loss = f64::NAN;

    for epoch in 1..=settings.n_epochs {
        let mut epoch_loss    = 0.0f64;
        let mut epoch_batches = 0usize;

        for batch in train_loader.iter() {
            let targets = batch
                .targets
                .ok_or_else(|| anyhow::anyhow!("training batch is missing targets"))?;

            let (loss, _) = model.forward_loss(batch.input_ids, batch.attention_mask, targets);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            epoch_loss     += loss_val;
            epoch_batches  += 1;
            window_loss    += loss_val;
            window_batches += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(schedule.lr_at(step), model, grads);
            step += 1;

            if let Some(val_loader) = &val_loader {
                if step % settings.val_interval == 0 {
                    let train_loss = window_loss / window_batches as f64;
                    let metrics = evaluate(&model, val_loader.iter(), step, epoch, train_loss)?;
                    tracker.record(&model, metrics, logger, &mut on_improvement)?;
                    window_loss    = 0.0;
                    window_batches = 0;
                }
            }
        }

        final_train_loss = epoch_loss / epoch_batches.max(1) as f64;
        tracing::debug!("Epoch {}/{} | train_loss={:.4}", epoch, settings.n_epochs, final_train_loss);
    }

    // Final pass unless the last step already validated.
    if let Some(val_loader) = &val_loader {
        if window_batches > 0 {
            let train_loss = window_loss / window_batches as f64;
            let metrics = evaluate(&model, val_loader.iter(), step, settings.n_epochs, train_loss)?;
            tracker.record(&model, metrics, logger, &mut on_improvement)?;
        }
    }

    let best_val_loss = tracker.best.as_ref().map(|(_, m)| m.val_loss);
    let best_step     = tracker.best.as_ref().map(|(_, m)| m.step);
    let summary = TrainingSummary {
        epochs: settings.n_epochs,
        steps: step,
        train_examples,
        val_examples,
        final_train_loss,
        best_val_loss,
        best_step,
        validations: tracker.history,
    };

    let model = match tracker.best {
        Some((best, metrics)) => {
            tracing::info!("Keeping weights from step {} (val_loss={:.4})", metrics.step, metrics.val_loss);
            best
        }
        None => model,
    };

    tracing::info!("Training complete: {} steps", step);
    Ok((model, summary))
}

fn evaluate<B: AutodiffBackend>(
    model:      &ClassifierModel<B>,
    batches:    impl Iterator<Item = ClassifierBatch<B::InnerBackend>>,
    step:       usize,
    epoch:      usize,
    train_loss: f64,
) -> Result<ValidationMetrics> {
    // Dropout disabled, no autodiff graph.
    let model_valid = model.valid();
    let (val_loss, val_accuracy) = validation_loss(&model_valid, batches)?;
    Ok(ValidationMetrics { step, epoch, train_loss, val_loss, val_accuracy })
}

/// Mean loss over the batches, plus accuracy for class targets.
pub fn validation_loss<B: Backend>(
    model:   &ClassifierModel<B>,
    batches: impl Iterator<Item = ClassifierBatch<B>>,
) -> Result<(f64, Option<f64>)> {
    let mut loss_sum      = 0.0f64;
    let mut total_samples = 0usize;
    let mut correct       = 0usize;
    let mut classified    = false;

    for batch in batches {
        let [n, _] = batch.input_ids.dims();
        let targets = batch
            .targets
            .ok_or_else(|| anyhow::anyhow!("validation batch is missing targets"))?;

        let (loss, output) = model.forward_loss(batch.input_ids, batch.attention_mask, targets.clone());
        loss_sum      += loss.into_scalar().elem::<f64>() * n as f64;
        total_samples += n;

        if let BatchTargets::Classes(classes) = targets {
            classified = true;
            let predicted = output.logits.argmax(1).reshape([n]);
            let hits: i64 = predicted.equal(classes).int().sum().into_scalar().elem::<i64>();
            correct += hits as usize;
        }
    }

    let total = total_samples.max(1) as f64;
    let accuracy = classified.then(|| correct as f64 / total);
    Ok((loss_sum / total, accuracy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{ClassifierItem, Target};
    use crate::ml::model::LanguageModelConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = Autodiff<NdArray>;

    fn tiny() -> LanguageModelConfig {
        LanguageModelConfig::new(12)
            .with_max_seq_len(6)
            .with_d_model(8)
            .with_num_heads(2)
            .with_num_layers(1)
            .with_d_ff(16)
            .with_dropout(0.0)
    }

    /// Class 1 examples contain token 5, class 0 examples token 6.
    fn toy_items(n: usize) -> Vec<ClassifierItem> {
        (0..n)
            .map(|i| {
                let class = i % 2;
                let marker = if class == 1 { 5 } else { 6 };
                ClassifierItem {
                    token_ids:      vec![2, marker, 7 + (i % 3) as u32, 3, 0, 0],
                    attention_mask: vec![1, 1, 1, 1, 0, 0],
                    target:         Some(Target::Class(class)),
                }
            })
            .collect()
    }

    fn settings(val_interval: usize) -> TrainerSettings {
        TrainerSettings {
            batch_size: 4,
            n_epochs: 3,
            learning_rate: 1e-2,
            warmup: 0.0,
            val_interval,
            seed: 1,
            verbose: false,
        }
    }

    #[test]
    fn test_validation_interval_and_autosave_callback() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);
        let train_set = ClassifierDataset::new(toy_items(8));
        let val_set   = ClassifierDataset::new(toy_items(4));

        let mut saves = 0usize;
        let (_, summary) = train(model, train_set, val_set, &settings(2), &device, None, |_, _| {
            saves += 1;
            Ok(())
        })
        .unwrap();

        // 2 steps per epoch × 3 epochs, validated every 2 steps.
        assert_eq!(summary.steps, 6);
        assert_eq!(summary.validations.len(), 3);
        assert_eq!(summary.validations.iter().map(|m| m.step).collect::<Vec<_>>(), vec![2, 4, 6]);
        assert!(saves >= 1);
        assert!(summary.best_val_loss.is_some());
        assert!(summary.validations.iter().all(|m| m.val_accuracy.is_some()));
    }

    #[test]
    fn test_final_validation_when_interval_not_reached() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);
        let train_set = ClassifierDataset::new(toy_items(8));
        let val_set   = ClassifierDataset::new(toy_items(2));

        let (_, summary) = train(model, train_set, val_set, &settings(100), &device, None, |_, _| Ok(())).unwrap();
        assert_eq!(summary.validations.len(), 1);
        assert_eq!(summary.validations[0].step, 6);
        assert_eq!(summary.best_step, Some(6));
    }

    #[test]
    fn test_no_validation_set() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);
        let train_set = ClassifierDataset::new(toy_items(5));
        let val_set   = ClassifierDataset::new(Vec::new());

        let (_, summary) = train(model, train_set, val_set, &settings(1), &device, None, |_, _| {
            panic!("no validation, no autosave callback")
        })
        .unwrap();
        assert_eq!(summary.steps, 6);
        assert!(summary.validations.is_empty());
        assert!(summary.best_val_loss.is_none());
        assert!(summary.final_train_loss.is_finite());
    }

    #[test]
    fn test_training_reduces_loss() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);
        let items = toy_items(16);
        let batcher = ClassifierBatcher::<NdArray>::new();
        let full_batch = || std::iter::once(batcher.batch(items.clone(), &device));
        let (before, _) = validation_loss(&model.valid(), full_batch()).unwrap();

        let mut long = settings(1000);
        long.n_epochs = 30;
        let train_set = ClassifierDataset::new(items.clone());
        let (trained, _) = train(model, train_set, ClassifierDataset::new(Vec::new()), &long, &device, None, |_, _| Ok(())).unwrap();
        let (after, _) = validation_loss(&trained.valid(), full_batch()).unwrap();
        assert!(after < before, "loss did not decrease: {before} -> {after}");
    }

    #[test]
    fn test_shuffled_loader_covers_every_example_each_epoch() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);

        // 7 examples in batches of 4: a full batch then a remainder of 3.
        let (_, summary) = train(
            model,
            ClassifierDataset::new(toy_items(7)),
            ClassifierDataset::new(toy_items(3)),
            &settings(2),
            &device,
            None,
            |_, _| Ok(()),
        )
        .unwrap();
        assert_eq!(summary.train_examples, 7);
        assert_eq!(summary.val_examples, 3);
        assert_eq!(summary.steps, 6);
        assert_eq!(summary.validations.len(), 3);
    }
}
