// ============================================================
// Layer 2 — LanguageModelGeneralApi
// ============================================================
// Entry point for callers. Each call:
//
//   1. transposes the example tuples into named input channels
//      (arity checked against the declared InputSchema)
//   2. on finetune, resolves the task type from the label kind
//      against the once-only TaskState
//   3. forwards to LanguageModelBase
//
//   xs = [["What is 2+2?", "Four is a number."], ...]
//        │ InputSchema ["question", "context"]
//        ▼
//   question: ["What is 2+2?", ...]   context: ["Four is a number.", ...]

use burn::tensor::backend::AutodiffBackend;
use std::{collections::BTreeMap, path::Path};
use tokenizers::Tokenizer;

use crate::application::{
    base::LanguageModelBase,
    config::{BaseConfig, TrainingOptions},
};
use crate::data::encoder::TokenArrays;
use crate::domain::{
    inputs::InputSchema,
    label::{Label, Labels, TaskState, TaskType},
};
use crate::error::FinetuneResult;
use crate::ml::{inferencer::FeatureMatrix, trainer::TrainingSummary};

pub struct LanguageModelGeneralApi<B: AutodiffBackend> {
    base:   LanguageModelBase<B>,
    inputs: InputSchema,
    task:   TaskState,
}

impl<B: AutodiffBackend> LanguageModelGeneralApi<B> {
    pub fn new(
        config:    BaseConfig,
        inputs:    InputSchema,
        tokenizer: Tokenizer,
        device:    B::Device,
    ) -> FinetuneResult<Self> {
        let base = LanguageModelBase::new(config, tokenizer, device)?;
        Ok(Self { base, inputs, task: TaskState::Unconfigured })
    }

    /// Load a saved model. The input schema and task type come from the checkpoint.
    pub fn load(dir: impl AsRef<Path>, config: BaseConfig, device: B::Device) -> FinetuneResult<Self> {
        let base   = LanguageModelBase::load(dir, config, device)?;
        let inputs = InputSchema::new(base.input_names().unwrap_or_default().to_vec())?;
        let task   = base.task_type().map_or(TaskState::Unconfigured, TaskState::Configured);
        Ok(Self { base, inputs, task })
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> FinetuneResult<()> {
        self.base.save(dir)
    }

    pub fn export_trunk(&self, path: impl AsRef<Path>) -> FinetuneResult<()> {
        self.base.export_trunk(path)
    }

    pub fn base(&self) -> &LanguageModelBase<B> {
        &self.base
    }

    pub fn inputs(&self) -> &InputSchema {
        &self.inputs
    }

    pub fn task_state(&self) -> TaskState {
        self.task
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task.task_type()
    }

    /// `None` until the first successful finetune (or load).
    pub fn is_classification(&self) -> Option<bool> {
        self.task_type().map(|t| t == TaskType::Classification)
    }

    pub fn text_to_ids<E, S>(&self, xs: &[E], max_length: Option<usize>) -> FinetuneResult<TokenArrays>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let channels = self.inputs.transpose(xs)?;
        self.base.text_to_ids(&channels, max_length)
    }

    /// Train a fresh head on `(xs, y)`.
    ///
    /// The first successful call fixes the task type: float labels mean
    /// regression, anything else classification. Later calls whose labels
    /// imply the other task fail with `TaskTypeConflict` and leave the
    /// model untouched.
    pub fn finetune<E, S>(
        &mut self,
        xs:      &[E],
        y:       impl Into<Labels>,
        options: &TrainingOptions,
    ) -> FinetuneResult<TrainingSummary>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let channels = self.inputs.transpose(xs)?;
        let labels: Labels = y.into();

        let mut task = self.task;
        task.configure(labels.task_type())?;

        let summary = self.base.finetune_channels(&channels, &labels, options)?;
        self.task = task;
        Ok(summary)
    }

    pub fn predict<E, S>(&self, xs: &[E], max_length: Option<usize>) -> FinetuneResult<Vec<Label>>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let channels = self.inputs.transpose(xs)?;
        self.base.predict_channels(&channels, max_length)
    }

    pub fn predict_proba<E, S>(
        &self,
        xs:         &[E],
        max_length: Option<usize>,
    ) -> FinetuneResult<Vec<BTreeMap<Label, f32>>>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let channels = self.inputs.transpose(xs)?;
        self.base.predict_proba_channels(&channels, max_length)
    }

    pub fn featurize<E, S>(&self, xs: &[E], max_length: Option<usize>) -> FinetuneResult<FeatureMatrix>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let channels = self.inputs.transpose(xs)?;
        self.base.featurize_channels(&channels, max_length)
    }
}
