// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and holds out a validation
// set. The size is either a fraction of the data or an absolute
// count. At least one sample always stays in the training set.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{FinetuneError, FinetuneResult};

/// Size of the validation set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValSize {
    /// Fraction of the samples, in `[0, 1)`.
    Fraction(f64),
    /// Absolute number of samples.
    Count(usize),
}

impl ValSize {
    pub fn validate(&self) -> FinetuneResult<()> {
        match *self {
            ValSize::Fraction(f) if !(0.0..1.0).contains(&f) => Err(FinetuneError::InvalidOption(
                format!("val_size fraction must be in [0, 1), got {f}"),
            )),
            _ => Ok(()),
        }
    }

    /// Number of held-out samples out of `total`.
    pub fn resolve(&self, total: usize) -> usize {
        let wanted = match *self {
            ValSize::Fraction(f) => ((total as f64) * f).round() as usize,
            ValSize::Count(n) => n,
        };
        wanted.min(total.saturating_sub(1))
    }
}

impl Default for ValSize {
    fn default() -> Self {
        ValSize::Fraction(0.05)
    }
}

impl fmt::Display for ValSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValSize::Fraction(v) => write!(f, "{v}"),
            ValSize::Count(n) => write!(f, "{n}"),
        }
    }
}

/// `"0.1"` is a fraction, `"100"` a count.
impl FromStr for ValSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return Ok(ValSize::Count(n));
        }
        let f = s
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is neither a count nor a fraction"))?;
        let size = ValSize::Fraction(f);
        size.validate().map_err(|e| e.to_string())?;
        Ok(size)
    }
}

/// Shuffle `samples` and split into (train, validation).
pub fn split_train_val<T>(mut samples: Vec<T>, val_size: ValSize, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let n_val    = val_size.resolve(total);
    let split_at = total - n_val;
    let val      = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}
