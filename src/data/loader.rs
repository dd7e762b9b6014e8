// ============================================================
// Layer 4 — JSON Lines Loader
// ============================================================
// Reads examples for the CLI, one JSON object per line:
//
//   {"inputs": ["What is 2+2?", "Four is a number."], "label": "yes"}
//   {"inputs": ["What is 3+3?", "Six is a number."],  "label": 0.75}
//
// `label` is optional for prediction and featurisation files.
// Blank lines are skipped.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::label::{Label, Labels};

#[derive(Debug, Deserialize)]
struct Record {
    inputs: Vec<String>,
    #[serde(default)]
    label:  Option<Label>,
}

/// Examples read from a file, with labels when every line had one.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedExamples {
    pub inputs: Vec<Vec<String>>,
    pub labels: Option<Labels>,
}

pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn load(&self) -> Result<LoadedExamples> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        let loaded = parse_jsonl(&text)
            .with_context(|| format!("Invalid examples file '{}'", self.path.display()))?;
        tracing::info!("Loaded {} examples from '{}'", loaded.inputs.len(), self.path.display());
        Ok(loaded)
    }

    /// Like [`load`](Self::load) but every line must carry a label.
    pub fn load_labelled(&self) -> Result<(Vec<Vec<String>>, Labels)> {
        let loaded = self.load()?;
        match loaded.labels {
            Some(labels) => Ok((loaded.inputs, labels)),
            None => anyhow::bail!("'{}' has no labels", self.path.display()),
        }
    }
}

pub fn parse_jsonl(text: &str) -> Result<LoadedExamples> {
    let mut inputs = Vec::new();
    let mut labels = Vec::new();
    let mut unlabelled = 0usize;

    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line)
            .with_context(|| format!("line {}: malformed record", n + 1))?;
        match record.label {
            Some(label) => labels.push(label),
            None => unlabelled += 1,
        }
        inputs.push(record.inputs);
    }

    let labels = if labels.is_empty() {
        None
    } else if unlabelled > 0 {
        anyhow::bail!("{} of {} records have no label", unlabelled, inputs.len());
    } else {
        Some(Labels::from_values(labels)?)
    };

    Ok(LoadedExamples { inputs, labels })
}
