//! Errors surfaced by the fine-tuning API.

use thiserror::Error;

use crate::domain::label::TaskType;

/// Errors that can occur when fine-tuning or querying a model.
#[derive(Debug, Error)]
pub enum FinetuneError {
    /// An example does not have the declared number of input segments.
    #[error("example {index} has {found} input segments, expected {expected}")]
    ArityMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// The input channel declaration is unusable.
    #[error("invalid input schema: {0}")]
    InvalidSchema(String),

    /// Inputs and labels are not aligned.
    #[error("got {inputs} examples but {labels} labels")]
    LengthMismatch { inputs: usize, labels: usize },

    /// Nothing to train on.
    #[error("cannot fine-tune on an empty dataset")]
    EmptyDataset,

    /// Labels imply a different task than the one already configured.
    #[error("model is configured for {configured} but the labels imply {requested}")]
    TaskTypeConflict {
        configured: TaskType,
        requested: TaskType,
    },

    /// Prediction requested before any training or checkpoint load.
    #[error("model has not been fine-tuned; call finetune or load a checkpoint first")]
    NotFitted,

    /// Class probabilities requested from a regression model.
    #[error("class probabilities are only defined for classification, model is configured for {0}")]
    ProbabilitiesUnavailable(TaskType),

    /// Requested sequence length is longer than the position table.
    #[error("max_length {requested} exceeds the model's maximum sequence length {limit}")]
    MaxLengthExceeded { requested: usize, limit: usize },

    /// Requested sequence length cannot hold the special tokens plus one
    /// token per segment.
    #[error("max_length {max_length} cannot hold {segments} segments of at least one token plus special tokens")]
    MaxLengthTooSmall { max_length: usize, segments: usize },

    /// The tokenizer vocabulary lacks a token the encoder needs.
    #[error("tokenizer is missing special token '{0}'")]
    MissingSpecialToken(String),

    /// Labels cannot be used as training targets.
    #[error("invalid labels: {0}")]
    InvalidLabels(String),

    /// A training option is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Failure in a delegated component (tokenizer, recorder, filesystem).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result type for fine-tuning operations.
pub type FinetuneResult<T> = Result<T, FinetuneError>;
