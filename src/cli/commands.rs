// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Four subcommands over JSON Lines example files:
//
//   finetune       — train a head and autosave it
//   predict        — one label per example
//   predict-proba  — one {label: probability} object per example
//   featurize      — one feature vector per example
//
// Arguments are converted into application-layer config types
// with From impls, so Layer 2 never sees clap types.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::config::{BaseConfig, TrainingOptions, BATCH_SIZE, MAX_LENGTH, VAL_INTERVAL};
use crate::data::splitter::ValSize;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune on a labelled .jsonl file
    Finetune(FinetuneArgs),

    /// Predict labels with a saved model
    Predict(PredictArgs),

    /// Predict class probabilities with a saved classification model
    PredictProba(PredictArgs),

    /// Extract pooled features, from a saved model or a base trunk
    Featurize(FeaturizeArgs),
}

/// Transformer shape. Must match any base weights that are loaded.
#[derive(Args, Debug, Clone)]
pub struct ArchArgs {
    /// Hidden size of the transformer
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// Attention heads; d_model must be divisible by this
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Stacked encoder layers
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Inner dimension of the feed-forward network
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

#[derive(Args, Debug)]
pub struct FinetuneArgs {
    /// Training examples: {"inputs": [...], "label": ...} per line
    #[arg(long)]
    pub data: PathBuf,

    /// Where checkpoints, tokenizer and metrics.csv are written
    #[arg(long, default_value = "checkpoints")]
    pub autosave_dir: PathBuf,

    /// Input channel names, e.g. question,context (default: input_0, input_1, ...)
    #[arg(long, value_delimiter = ',')]
    pub inputs: Vec<String>,

    /// Existing tokenizer.json; built from the training text if omitted
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Vocabulary size when building a tokenizer
    #[arg(long, default_value_t = 30000)]
    pub vocab_size: usize,

    /// Pretrained trunk weights written by a previous export
    #[arg(long)]
    pub base_weights: Option<PathBuf>,

    /// Tokens per example, special tokens included
    #[arg(long, default_value_t = MAX_LENGTH)]
    pub max_length: usize,

    #[arg(long, default_value_t = BATCH_SIZE)]
    pub batch_size: usize,

    /// Validation set: a fraction like 0.05 or a count like 100
    #[arg(long, default_value = "0.05")]
    pub val_size: ValSize,

    /// Optimizer steps between validation passes
    #[arg(long, default_value_t = VAL_INTERVAL)]
    pub val_interval: usize,

    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    #[arg(long, default_value_t = 6.25e-5)]
    pub lr: f64,

    /// Fraction of steps spent warming up the learning rate
    #[arg(long, default_value_t = 0.002)]
    pub warmup: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Log validation passes at debug level only
    #[arg(long)]
    pub quiet: bool,

    #[command(flatten)]
    pub arch: ArchArgs,
}

impl From<&FinetuneArgs> for BaseConfig {
    fn from(a: &FinetuneArgs) -> Self {
        BaseConfig {
            autosave_path: a.autosave_dir.clone(),
            max_length:    a.max_length,
            n_epochs:      a.epochs,
            learning_rate: a.lr,
            warmup:        a.warmup,
            seed:          a.seed,
            verbose:       !a.quiet,
            base_weights:  a.base_weights.clone(),
            ..arch_config(&a.arch)
        }
    }
}

impl From<&FinetuneArgs> for TrainingOptions {
    fn from(a: &FinetuneArgs) -> Self {
        TrainingOptions {
            batch_size:   a.batch_size,
            val_size:     a.val_size,
            val_interval: a.val_interval,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Examples: {"inputs": [...]} per line
    #[arg(long)]
    pub data: PathBuf,

    /// Directory written by finetune
    #[arg(long, default_value = "checkpoints")]
    pub model_dir: PathBuf,

    /// Override the trained max length (cannot exceed it)
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Examples per forward pass
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
}

impl From<&PredictArgs> for BaseConfig {
    fn from(a: &PredictArgs) -> Self {
        BaseConfig {
            autosave_path:      a.model_dir.clone(),
            predict_batch_size: a.batch_size,
            ..BaseConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct FeaturizeArgs {
    /// Examples: {"inputs": [...]} per line
    #[arg(long)]
    pub data: PathBuf,

    /// Directory written by finetune; uses its fine-tuned trunk
    #[arg(long, conflicts_with = "tokenizer")]
    pub model_dir: Option<PathBuf>,

    /// tokenizer.json for featurising with a base trunk
    #[arg(long, required_unless_present = "model_dir")]
    pub tokenizer: Option<PathBuf>,

    /// Base trunk weights (random initialisation if omitted)
    #[arg(long)]
    pub base_weights: Option<PathBuf>,

    /// Input channel names for base-trunk featurising
    #[arg(long, value_delimiter = ',')]
    pub inputs: Vec<String>,

    #[arg(long)]
    pub max_length: Option<usize>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[command(flatten)]
    pub arch: ArchArgs,
}

impl From<&FeaturizeArgs> for BaseConfig {
    fn from(a: &FeaturizeArgs) -> Self {
        BaseConfig {
            max_length:         a.max_length.unwrap_or(MAX_LENGTH),
            predict_batch_size: a.batch_size,
            base_weights:       a.base_weights.clone(),
            ..arch_config(&a.arch)
        }
    }
}

fn arch_config(a: &ArchArgs) -> BaseConfig {
    BaseConfig {
        d_model:    a.d_model,
        num_heads:  a.num_heads,
        num_layers: a.num_layers,
        d_ff:       a.d_ff,
        dropout:    a.dropout,
        ..BaseConfig::default()
    }
}
