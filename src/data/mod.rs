// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From raw multi-segment text to tensor batches:
//
//   JSONL file / in-memory examples
//       │
//       ▼
//   InputSchema::transpose  → per-channel sequences (domain)
//       │
//       ▼
//   MultiInputEncoder       → [CLS] a [SEP] b [SEP] id rows
//       │
//       ▼
//   TokenArrays             → fixed-width tokens + mask
//       │
//       ▼
//   ClassifierDataset       → Burn Dataset of items (+ targets)
//       │
//       ▼
//   split_train_val         → train / validation
//       │
//       ▼
//   ClassifierBatcher       → tensors on the device

/// Reads JSON Lines example files
pub mod loader;

/// Multi-segment encoding and array formatting
pub mod encoder;

/// Implements Burn's Dataset trait for padded examples
pub mod dataset;

/// Stacks examples into tensor batches
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;
