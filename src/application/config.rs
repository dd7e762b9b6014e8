// ============================================================
// Layer 2 — Configuration
// ============================================================
// Instance-wide settings (BaseConfig) and per-call training
// options (TrainingOptions). Both are serde types so the CLI
// and callers can build them from files as well as code.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::splitter::ValSize;
use crate::error::{FinetuneError, FinetuneResult};
use crate::ml::model::LanguageModelConfig;

/// Default sequence length, tokens included.
pub const MAX_LENGTH: usize = 512;

/// Default per-step training batch size.
pub const BATCH_SIZE: usize = 8;

/// Default number of optimizer steps between validation passes.
pub const VAL_INTERVAL: usize = 150;

// ─── Base Configuration ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Checkpoints, tokenizer and metrics are written here during training.
    pub autosave_path:      PathBuf,
    pub max_length:         usize,
    pub n_epochs:           usize,
    pub learning_rate:      f64,
    /// Fraction of training steps spent warming up the learning rate.
    pub warmup:             f64,
    pub predict_batch_size: usize,
    pub seed:               u64,
    pub verbose:            bool,
    /// Pretrained trunk weights written by `export_trunk`.
    pub base_weights:       Option<PathBuf>,

    pub d_model:            usize,
    pub num_heads:          usize,
    pub num_layers:         usize,
    pub d_ff:               usize,
    pub dropout:            f64,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            autosave_path:      PathBuf::from("checkpoints"),
            max_length:         MAX_LENGTH,
            n_epochs:           3,
            learning_rate:      6.25e-5,
            warmup:             0.002,
            predict_batch_size: 8,
            seed:               42,
            verbose:            true,
            base_weights:       None,
            d_model:            256,
            num_heads:          8,
            num_layers:         6,
            d_ff:               1024,
            dropout:            0.1,
        }
    }
}

impl BaseConfig {
    pub fn validate(&self) -> FinetuneResult<()> {
        let fail = |msg: &str| Err(FinetuneError::InvalidOption(msg.to_string()));
        if self.max_length == 0 {
            return fail("max_length must be positive");
        }
        if self.n_epochs == 0 {
            return fail("n_epochs must be positive");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return fail("learning_rate must be a positive number");
        }
        if !(0.0..=1.0).contains(&self.warmup) {
            return fail("warmup must be in [0, 1]");
        }
        if self.predict_batch_size == 0 {
            return fail("predict_batch_size must be positive");
        }
        Ok(())
    }

    /// Architecture for a tokenizer with `vocab_size` entries. The
    /// position table covers `max_length`.
    pub fn model_config(&self, vocab_size: usize) -> LanguageModelConfig {
        LanguageModelConfig::new(vocab_size)
            .with_max_seq_len(self.max_length)
            .with_d_model(self.d_model)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_d_ff(self.d_ff)
            .with_dropout(self.dropout)
    }
}

// ─── Training Options ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub batch_size:   usize,
    pub val_size:     ValSize,
    pub val_interval: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            batch_size:   BATCH_SIZE,
            val_size:     ValSize::default(),
            val_interval: VAL_INTERVAL,
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> FinetuneResult<()> {
        if self.batch_size == 0 {
            return Err(FinetuneError::InvalidOption("batch_size must be positive".into()));
        }
        if self.val_interval == 0 {
            return Err(FinetuneError::InvalidOption("val_interval must be positive".into()));
        }
        self.val_size.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BaseConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_length, MAX_LENGTH);
        assert!(cfg.verbose);

        let opts = TrainingOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.batch_size, BATCH_SIZE);
        assert_eq!(opts.val_size, ValSize::Fraction(0.05));
        assert_eq!(opts.val_interval, VAL_INTERVAL);
    }

    #[test]
    fn test_invalid_values() {
        let cfg = BaseConfig { n_epochs: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(FinetuneError::InvalidOption(_))));

        let opts = TrainingOptions { val_size: ValSize::Fraction(1.5), ..Default::default() };
        assert!(opts.validate().is_err());
        let opts = TrainingOptions { val_interval: 0, ..Default::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_model_config_uses_max_length() {
        let cfg = BaseConfig { max_length: 64, d_model: 32, num_heads: 4, ..Default::default() };
        let arch = cfg.model_config(100);
        assert_eq!(arch.vocab_size, 100);
        assert_eq!(arch.max_seq_len, 64);
        assert!(arch.check().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: BaseConfig = serde_json::from_str(r#"{"n_epochs": 1, "seed": 7}"#).unwrap();
        assert_eq!(cfg.n_epochs, 1);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.max_length, MAX_LENGTH);
    }
}
