// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per validation pass to metrics.csv in the
// autosave directory:
//
//   step,epoch,train_loss,val_loss,val_accuracy
//   150,1,0.693100,0.688400,0.550000
//   300,2,0.512000,0.530200,0.700000
//
// val_accuracy is empty for regression runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "step,epoch,train_loss,val_loss,val_accuracy";

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Optimizer steps taken so far.
    pub step: usize,

    /// 1-based epoch the pass happened in.
    pub epoch: usize,

    /// Mean training loss since the previous pass.
    pub train_loss: f64,

    /// Mean loss over the validation set.
    pub val_loss: f64,

    /// Fraction of validation examples classified correctly.
    pub val_accuracy: Option<f64>,
}

impl ValidationMetrics {
    /// Returns true if this pass beats the best validation loss so far
    pub fn is_improvement(&self, best_val_loss: Option<f64>) -> bool {
        best_val_loss.map_or(true, |best| self.val_loss < best)
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &ValidationMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let accuracy = m.val_accuracy.map(|a| format!("{a:.6}")).unwrap_or_default();
        writeln!(
            f,
            "{},{},{:.6},{:.6},{}",
            m.step,
            m.epoch,
            m.train_loss,
            m.val_loss,
            accuracy,
        )?;

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(step: usize, val_loss: f64, acc: Option<f64>) -> ValidationMetrics {
        ValidationMetrics { step, epoch: 1, train_loss: 1.0, val_loss, val_accuracy: acc }
    }

    #[test]
    fn test_is_improvement() {
        let m = metrics(10, 2.3, None);
        assert!(m.is_improvement(None));
        assert!(m.is_improvement(Some(3.0)));
        assert!(!m.is_improvement(Some(2.0)));
        assert!(!m.is_improvement(Some(2.3)));
    }

    #[test]
    fn test_rows_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(5, 0.5, Some(0.75))).unwrap();

        // A second logger on the same directory keeps existing rows.
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(10, 0.25, None)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "5,1,1.000000,0.500000,0.750000");
        assert_eq!(lines[2], "10,1,1.000000,0.250000,");
        assert_eq!(lines.len(), 3);
    }
}
