// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores a fine-tuned model directory:
//
//   <dir>/
//     model.mpk         ← trunk + head weights (NamedMpkFileRecorder)
//     manifest.json     ← architecture, max length, task, classes,
//                         input channel names
//     tokenizer.json    ← written by TokenizerStore
//     metrics.csv       ← written by MetricsLogger
//
// The manifest is what lets a loader rebuild an identically
// shaped model before the weights are loaded into it.
//
// Trunk-only weight files (pretrained weights for featurising or
// as a fine-tuning starting point) use the same recorder.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::label::{ClassIndex, TaskType};
use crate::ml::model::{ClassifierModel, LanguageModelConfig, TextTransformer};

/// Full precision so a reloaded model reproduces its predictions.
type WeightRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const MODEL_FILE: &str = "model";
const MANIFEST_FILE: &str = "manifest.json";

/// Everything besides the weights needed to rebuild a fitted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub model:       LanguageModelConfig,
    pub max_length:  usize,
    pub task:        TaskType,
    /// Present for classification.
    pub classes:     Option<ClassIndex>,
    pub input_names: Vec<String>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True once a manifest has been written.
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).exists()
    }

    pub fn save<B: Backend>(&self, model: &ClassifierModel<B>, manifest: &CheckpointManifest) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))?;

        let path = self.dir.join(MODEL_FILE);
        model
            .clone()
            .save_file(path.clone(), &WeightRecorder::new())
            .map_err(|e| anyhow::anyhow!("Failed to save weights to '{}': {e:?}", path.display()))?;

        self.save_manifest(manifest)?;
        tracing::debug!("Saved checkpoint to '{}'", self.dir.display());
        Ok(())
    }

    /// Load weights into `model`, which must match the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  ClassifierModel<B>,
        device: &B::Device,
    ) -> Result<ClassifierModel<B>> {
        let path = self.dir.join(MODEL_FILE);
        tracing::info!("Loading checkpoint from '{}'", self.dir.display());
        model
            .load_file(path.clone(), &WeightRecorder::new(), device)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load checkpoint '{}'. Has the model been fine-tuned? {e:?}",
                path.display()
            ))
    }

    pub fn save_manifest(&self, manifest: &CheckpointManifest) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write manifest to '{}'", path.display()))
    }

    pub fn load_manifest(&self) -> Result<CheckpointManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read manifest from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed manifest '{}'", path.display()))
    }
}

/// Write trunk weights to `path` (the recorder appends its extension).
pub fn save_trunk<B: Backend>(trunk: &TextTransformer<B>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    trunk
        .clone()
        .save_file(path.clone(), &WeightRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save trunk weights to '{}': {e:?}", path.display()))
}

/// Load trunk weights saved by [`save_trunk`] into `trunk`.
pub fn load_trunk<B: Backend>(
    trunk:  TextTransformer<B>,
    path:   impl AsRef<Path>,
    device: &B::Device,
) -> Result<TextTransformer<B>> {
    let path = path.as_ref().to_path_buf();
    trunk
        .load_file(path.clone(), &WeightRecorder::new(), device)
        .map_err(|e| anyhow::anyhow!("Cannot load trunk weights from '{}': {e:?}", path.display()))
}
