// ============================================================
// Layer 2 — LanguageModelBase
// ============================================================
// The fine-tuning engine behind the general API. It owns:
//
//   - the multi-input encoder (tokenizer + [CLS]/[SEP] layout)
//   - the base trunk every fine-tuning run starts from
//   - the fitted classifier (trunk copy + head + label space)
//
// and runs the pipelines:
//
//   finetune: encode → split → fresh head → train (autosave) → keep best
//   predict:  encode → logits → argmax → labels   (or raw value)
//   proba:    encode → softmax → {label: p}
//   featurize: encode → pooled trunk states
//
// Inference always runs on the inner (non-autodiff) backend.

use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use std::{collections::BTreeMap, path::Path};
use tokenizers::Tokenizer;

use crate::application::config::{BaseConfig, TrainingOptions};
use crate::data::{
    dataset::{ClassifierDataset, Target},
    encoder::{MultiInputEncoder, TokenArrays},
    splitter::split_train_val,
};
use crate::domain::{
    inputs::InputChannels,
    label::{ClassIndex, Label, Labels, TaskType},
    traits::TextEncoder,
};
use crate::error::{FinetuneError, FinetuneResult};
use crate::infra::{
    checkpoint::{load_trunk, save_trunk, CheckpointManager, CheckpointManifest},
    metrics::MetricsLogger,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    inferencer::{FeatureMatrix, Inferencer},
    model::{ClassifierModel, LanguageModelConfig, TextTransformer},
    trainer::{train, TrainerSettings, TrainingSummary},
};

/// What the head predicts.
#[derive(Debug, Clone, PartialEq)]
enum TargetSpace {
    Classes(ClassIndex),
    Regression,
}

impl TargetSpace {
    fn task_type(&self) -> TaskType {
        match self {
            TargetSpace::Classes(_) => TaskType::Classification,
            TargetSpace::Regression => TaskType::Regression,
        }
    }

    fn n_outputs(&self) -> usize {
        match self {
            TargetSpace::Classes(index) => index.len(),
            TargetSpace::Regression => 1,
        }
    }

    fn classes(&self) -> Option<&ClassIndex> {
        match self {
            TargetSpace::Classes(index) => Some(index),
            TargetSpace::Regression => None,
        }
    }
}

struct FittedClassifier<B: AutodiffBackend> {
    model:       ClassifierModel<B>,
    target:      TargetSpace,
    input_names: Vec<String>,
}

pub struct LanguageModelBase<B: AutodiffBackend> {
    config:  BaseConfig,
    encoder: MultiInputEncoder,
    arch:    LanguageModelConfig,
    trunk:   TextTransformer<B>,
    fitted:  Option<FittedClassifier<B>>,
    device:  B::Device,
}

impl<B: AutodiffBackend> LanguageModelBase<B> {
    pub fn new(config: BaseConfig, tokenizer: Tokenizer, device: B::Device) -> FinetuneResult<Self> {
        config.validate()?;
        let encoder = MultiInputEncoder::new(tokenizer)?;
        let arch    = config.model_config(encoder.vocab_size());
        arch.check()?;

        let trunk = base_trunk::<B>(&config, &arch, &device)?;
        tracing::info!(
            "Language model ready: vocab={}, d_model={}, layers={}, max_length={}",
            arch.vocab_size, arch.d_model, arch.num_layers, config.max_length
        );

        Ok(Self { config, encoder, arch, trunk, fitted: None, device })
    }

    /// Rebuild a fitted model from a directory written by [`save`](Self::save)
    /// or by autosave. Architecture and max length come from the checkpoint.
    pub fn load(dir: impl AsRef<Path>, mut config: BaseConfig, device: B::Device) -> FinetuneResult<Self> {
        let dir      = dir.as_ref();
        let ckpt     = CheckpointManager::new(dir);
        let manifest = ckpt.load_manifest()?;
        let encoder  = MultiInputEncoder::new(TokenizerStore::new(dir).load()?)?;

        let arch = manifest.model.clone();
        arch.check()?;
        if encoder.vocab_size() > arch.vocab_size {
            return Err(FinetuneError::Internal(anyhow::anyhow!(
                "tokenizer in '{}' has {} tokens but the model was built for {}",
                dir.display(), encoder.vocab_size(), arch.vocab_size
            )));
        }

        config.max_length = manifest.max_length;
        config.d_model    = arch.d_model;
        config.num_heads  = arch.num_heads;
        config.num_layers = arch.num_layers;
        config.d_ff       = arch.d_ff;
        config.dropout    = arch.dropout;
        config.validate()?;

        let target = match (manifest.task, manifest.classes) {
            (TaskType::Classification, Some(index)) => TargetSpace::Classes(index),
            (TaskType::Classification, None) => {
                return Err(FinetuneError::Internal(anyhow::anyhow!(
                    "manifest in '{}' has no class labels",
                    dir.display()
                )))
            }
            (TaskType::Regression, _) => TargetSpace::Regression,
        };

        let model = arch.init_classifier(arch.init::<B>(&device), target.n_outputs(), &device);
        let model = ckpt.load_model(model, &device)?;

        // Later fine-tuning continues from the loaded trunk unless base weights are given.
        let trunk = match config.base_weights {
            Some(_) => base_trunk::<B>(&config, &arch, &device)?,
            None    => model.trunk.clone(),
        };

        tracing::info!("Loaded {} model from '{}'", target.task_type(), dir.display());
        let fitted = FittedClassifier { model, target, input_names: manifest.input_names };
        Ok(Self { config, encoder, arch, trunk, fitted: Some(fitted), device })
    }

    pub fn config(&self) -> &BaseConfig {
        &self.config
    }

    pub fn encoder(&self) -> &MultiInputEncoder {
        &self.encoder
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn max_length(&self) -> usize {
        self.config.max_length
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Task of the fitted head, if any.
    pub fn task_type(&self) -> Option<TaskType> {
        self.fitted.as_ref().map(|f| f.target.task_type())
    }

    /// Input channel names the fitted head was trained with.
    pub fn input_names(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|f| f.input_names.as_slice())
    }

    // ─── Text → ids ──────────────────────────────────────────────────────────
    pub fn text_to_ids(&self, channels: &InputChannels, max_length: Option<usize>) -> FinetuneResult<TokenArrays> {
        let max_length = max_length.unwrap_or(self.config.max_length);
        if max_length > self.arch.max_seq_len {
            return Err(FinetuneError::MaxLengthExceeded {
                requested: max_length,
                limit:     self.arch.max_seq_len,
            });
        }
        let encoded = self.encoder.encode_multi_input(channels, max_length)?;
        Ok(TokenArrays::format(encoded, max_length, self.encoder.pad_id()))
    }

    // ─── Fine-tuning ─────────────────────────────────────────────────────────
    pub fn finetune_channels(
        &mut self,
        channels: &InputChannels,
        labels:   &Labels,
        options:  &TrainingOptions,
    ) -> FinetuneResult<TrainingSummary> {
        options.validate()?;
        if channels.len() != labels.len() {
            return Err(FinetuneError::LengthMismatch { inputs: channels.len(), labels: labels.len() });
        }
        if channels.is_empty() {
            return Err(FinetuneError::EmptyDataset);
        }

        // ── Step 1: Targets ─────────────────────────────────────────────────
        let (target, targets): (TargetSpace, Vec<Target>) = match labels.task_type() {
            TaskType::Classification => {
                let index   = ClassIndex::fit(labels)?;
                let targets = index.encode(labels)?.into_iter().map(Target::Class).collect();
                (TargetSpace::Classes(index), targets)
            }
            TaskType::Regression => {
                let targets = labels.to_targets()?.into_iter().map(Target::Value).collect();
                (TargetSpace::Regression, targets)
            }
        };
        tracing::info!(
            "Fine-tuning for {} on {} examples with {} input channel(s)",
            target.task_type(), channels.len(), channels.arity()
        );

        // ── Step 2: Encode + split ──────────────────────────────────────────
        let arrays = self.text_to_ids(channels, None)?;
        let items  = ClassifierDataset::labelled(arrays, targets).into_items();
        let (train_items, val_items) = split_train_val(items, options.val_size, self.config.seed);
        let train_set = ClassifierDataset::new(train_items);
        let val_set   = ClassifierDataset::new(val_items);

        // ── Step 3: Autosave directory ──────────────────────────────────────
        let autosave = self.config.autosave_path.clone();
        let ckpt     = CheckpointManager::new(&autosave);
        let manifest = self.manifest(&target, channels.names());
        TokenizerStore::new(&autosave).save(self.encoder.tokenizer())?;
        let metrics  = MetricsLogger::new(&autosave)?;

        // ── Step 4: Train a fresh head on a copy of the base trunk ─────────
        let model = self
            .arch
            .init_classifier(self.trunk.clone(), target.n_outputs(), &self.device);
        let settings = TrainerSettings {
            batch_size:    options.batch_size,
            n_epochs:      self.config.n_epochs,
            learning_rate: self.config.learning_rate,
            warmup:        self.config.warmup,
            val_interval:  options.val_interval,
            seed:          self.config.seed,
            verbose:       self.config.verbose,
        };
        let (model, summary) = train(
            model,
            train_set,
            val_set,
            &settings,
            &self.device,
            Some(&metrics),
            |best, m| {
                tracing::debug!("Autosaving step {} to '{}'", m.step, ckpt.dir().display());
                ckpt.save(best, &manifest)
            },
        )?;

        ckpt.save(&model, &manifest)?;
        tracing::info!("Saved fine-tuned model to '{}'", autosave.display());

        self.fitted = Some(FittedClassifier {
            model,
            target,
            input_names: channels.names().to_vec(),
        });
        Ok(summary)
    }

    // ─── Inference ───────────────────────────────────────────────────────────
    pub fn predict_channels(&self, channels: &InputChannels, max_length: Option<usize>) -> FinetuneResult<Vec<Label>> {
        let fitted  = self.fitted_for(channels)?;
        let dataset = self.dataset(channels, max_length)?;
        let outputs = self.inferencer().logits(&fitted.model.valid(), dataset)?;

        match &fitted.target {
            TargetSpace::Classes(index) => outputs
                .rows()
                .map(|row| {
                    let best = argmax(row);
                    index.label(best).cloned().ok_or_else(|| {
                        FinetuneError::Internal(anyhow::anyhow!("head output {best} has no class label"))
                    })
                })
                .collect(),
            TargetSpace::Regression => Ok(outputs.rows().map(|row| Label::Float(row[0] as f64)).collect()),
        }
    }

    pub fn predict_proba_channels(
        &self,
        channels:   &InputChannels,
        max_length: Option<usize>,
    ) -> FinetuneResult<Vec<BTreeMap<Label, f32>>> {
        let fitted = self.fitted_for(channels)?;
        let index = match &fitted.target {
            TargetSpace::Classes(index) => index,
            TargetSpace::Regression => return Err(FinetuneError::ProbabilitiesUnavailable(TaskType::Regression)),
        };

        let dataset = self.dataset(channels, max_length)?;
        let probs   = self.inferencer().probabilities(&fitted.model.valid(), dataset)?;
        Ok(probs
            .rows()
            .map(|row| index.classes().iter().cloned().zip(row.iter().copied()).collect())
            .collect())
    }

    /// Pooled trunk features. Uses the fine-tuned trunk once fitted.
    pub fn featurize_channels(&self, channels: &InputChannels, max_length: Option<usize>) -> FinetuneResult<FeatureMatrix> {
        let trunk = match &self.fitted {
            Some(fitted) => {
                self.check_arity(fitted, channels)?;
                &fitted.model.trunk
            }
            None => &self.trunk,
        };
        let dataset = self.dataset(channels, max_length)?;
        Ok(self.inferencer().features(&trunk.valid(), dataset)?)
    }

    // ─── Persistence ─────────────────────────────────────────────────────────
    /// Write weights, manifest and tokenizer of the fitted model to `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> FinetuneResult<()> {
        let fitted = self.fitted.as_ref().ok_or(FinetuneError::NotFitted)?;
        let dir = dir.as_ref();
        let manifest = self.manifest(&fitted.target, &fitted.input_names);
        CheckpointManager::new(dir).save(&fitted.model, &manifest)?;
        TokenizerStore::new(dir).save(self.encoder.tokenizer())?;
        tracing::info!("Saved model to '{}'", dir.display());
        Ok(())
    }

    /// Write the current trunk (fine-tuned if fitted) as base weights.
    pub fn export_trunk(&self, path: impl AsRef<Path>) -> FinetuneResult<()> {
        let trunk = self.fitted.as_ref().map_or(&self.trunk, |f| &f.model.trunk);
        save_trunk(trunk, path.as_ref())?;
        tracing::info!("Exported trunk weights to '{}'", path.as_ref().display());
        Ok(())
    }

    // ─── Helpers ─────────────────────────────────────────────────────────────
    fn manifest(&self, target: &TargetSpace, input_names: &[String]) -> CheckpointManifest {
        CheckpointManifest {
            model:       self.arch.clone(),
            max_length:  self.config.max_length,
            task:        target.task_type(),
            classes:     target.classes().cloned(),
            input_names: input_names.to_vec(),
        }
    }

    fn fitted_for(&self, channels: &InputChannels) -> FinetuneResult<&FittedClassifier<B>> {
        let fitted = self.fitted.as_ref().ok_or(FinetuneError::NotFitted)?;
        self.check_arity(fitted, channels)?;
        Ok(fitted)
    }

    fn check_arity(&self, fitted: &FittedClassifier<B>, channels: &InputChannels) -> FinetuneResult<()> {
        if channels.arity() != fitted.input_names.len() {
            return Err(FinetuneError::InvalidSchema(format!(
                "model was trained on {} input channel(s) {:?}, got {}",
                fitted.input_names.len(),
                fitted.input_names,
                channels.arity()
            )));
        }
        Ok(())
    }

    fn dataset(&self, channels: &InputChannels, max_length: Option<usize>) -> FinetuneResult<ClassifierDataset> {
        Ok(ClassifierDataset::from_arrays(self.text_to_ids(channels, max_length)?))
    }

    fn inferencer(&self) -> Inferencer<B::InnerBackend> {
        Inferencer::new(self.device.clone(), self.config.predict_batch_size)
    }
}

fn base_trunk<B: AutodiffBackend>(
    config: &BaseConfig,
    arch:   &LanguageModelConfig,
    device: &B::Device,
) -> FinetuneResult<TextTransformer<B>> {
    let trunk = arch.init::<B>(device);
    match &config.base_weights {
        Some(path) => {
            tracing::info!("Loading base trunk weights from '{}'", path.display());
            Ok(load_trunk(trunk, path, device)?)
        }
        None => Ok(trunk),
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inputs::InputSchema;
    use crate::infra::tokenizer_store::build_word_level;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    const TEXTS: [&str; 4] = ["the cat sat", "on the mat", "a dog ran", "in the park"];

    fn tiny_config(dir: &Path) -> BaseConfig {
        BaseConfig {
            autosave_path: dir.to_path_buf(),
            max_length: 12,
            n_epochs: 2,
            learning_rate: 1e-2,
            predict_batch_size: 3,
            verbose: false,
            d_model: 8,
            num_heads: 2,
            num_layers: 1,
            d_ff: 16,
            dropout: 0.0,
            ..Default::default()
        }
    }

    fn base(dir: &Path) -> LanguageModelBase<TestBackend> {
        let tokenizer = build_word_level(TEXTS, 32).unwrap();
        LanguageModelBase::new(tiny_config(dir), tokenizer, Default::default()).unwrap()
    }

    fn channels(n: usize) -> InputChannels {
        let xs: Vec<[&str; 2]> = (0..n).map(|i| [TEXTS[i % 4], TEXTS[(i + 1) % 4]]).collect();
        InputSchema::positional(2).unwrap().transpose(&xs).unwrap()
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_text_to_ids_shape_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let base = base(dir.path());

        let arrays = base.text_to_ids(&channels(3), None).unwrap();
        assert_eq!(arrays.shape(), [3, 12]);
        let arrays = base.text_to_ids(&channels(3), Some(6)).unwrap();
        assert_eq!(arrays.shape(), [3, 6]);
        assert!(arrays.mask.iter().all(|row| row.iter().sum::<u32>() <= 6));

        assert!(matches!(
            base.text_to_ids(&channels(1), Some(64)),
            Err(FinetuneError::MaxLengthExceeded { requested: 64, limit: 12 })
        ));
        assert!(matches!(
            base.text_to_ids(&channels(1), Some(4)),
            Err(FinetuneError::MaxLengthTooSmall { .. })
        ));
    }

    #[test]
    fn test_inference_before_finetune() {
        let dir = tempfile::tempdir().unwrap();
        let base = base(dir.path());

        assert!(matches!(base.predict_channels(&channels(2), None), Err(FinetuneError::NotFitted)));
        assert!(matches!(base.predict_proba_channels(&channels(2), None), Err(FinetuneError::NotFitted)));
        assert!(matches!(base.save(dir.path()), Err(FinetuneError::NotFitted)));

        let feats = base.featurize_channels(&channels(2), None).unwrap();
        assert_eq!((feats.n_examples(), feats.width()), (2, 8));
    }

    #[test]
    fn test_finetune_validates_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = base(dir.path());
        let opts = TrainingOptions::default();

        let err = base.finetune_channels(&channels(3), &Labels::from(vec!["a", "b"]), &opts);
        assert!(matches!(err, Err(FinetuneError::LengthMismatch { inputs: 3, labels: 2 })));

        let empty = Labels::Text(Vec::new());
        assert!(matches!(base.finetune_channels(&channels(0), &empty, &opts), Err(FinetuneError::EmptyDataset)));
        assert!(!base.is_fitted());
    }

    #[test]
    fn test_regression_finetune_writes_autosave() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = base(dir.path());
        let opts = TrainingOptions { batch_size: 2, val_size: crate::data::splitter::ValSize::Count(2), val_interval: 2 };

        let labels = Labels::from(vec![0.5, 1.5, -0.5, 2.0, 1.0, 0.0]);
        let summary = base.finetune_channels(&channels(6), &labels, &opts).unwrap();
        assert_eq!(summary.train_examples, 4);
        assert_eq!(summary.val_examples, 2);
        assert_eq!(summary.steps, 4);
        assert!(summary.validations.iter().all(|m| m.val_accuracy.is_none()));

        assert_eq!(base.task_type(), Some(TaskType::Regression));
        assert!(dir.path().join("manifest.json").exists());
        assert!(dir.path().join("tokenizer.json").exists());
        assert!(dir.path().join("metrics.csv").exists());

        let preds = base.predict_channels(&channels(3), None).unwrap();
        assert_eq!(preds.len(), 3);
        assert!(preds.iter().all(|p| matches!(p, Label::Float(v) if v.is_finite())));
        assert!(matches!(
            base.predict_proba_channels(&channels(3), None),
            Err(FinetuneError::ProbabilitiesUnavailable(TaskType::Regression))
        ));
    }

    #[test]
    fn test_wrong_arity_after_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = base(dir.path());
        let opts = TrainingOptions { val_size: crate::data::splitter::ValSize::Count(0), ..Default::default() };
        base.finetune_channels(&channels(4), &Labels::from(vec![1i64, 0, 1, 0]), &opts).unwrap();

        let single = InputSchema::positional(1).unwrap().transpose(&[["the cat sat"]]).unwrap();
        assert!(matches!(base.predict_channels(&single, None), Err(FinetuneError::InvalidSchema(_))));
        assert!(matches!(base.featurize_channels(&single, None), Err(FinetuneError::InvalidSchema(_))));
    }
}
