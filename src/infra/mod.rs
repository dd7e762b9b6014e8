// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of the
// engine:
//
//   checkpoint.rs      — Model weights + manifest
//                        Burn's NamedMpkFileRecorder stores the
//                        parameters, manifest.json stores what
//                        is needed to rebuild the model shape
//                        (architecture, task, classes, inputs).
//                        Also reads/writes trunk-only weights.
//
//   tokenizer_store.rs — Tokenizer persistence
//                        Loads a tokenizer.json or builds a
//                        word-level vocabulary from the corpus,
//                        so training and inference share ids.
//
//   metrics.rs         — Validation metrics logging
//                        One CSV row per validation pass
//                        (losses, accuracy) in the autosave dir.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Validation metrics CSV logger
pub mod metrics;
