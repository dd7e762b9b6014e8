// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model architecture, optimisation and batched inference.
//
//   model.rs      — Transformer encoder trunk (TextTransformer)
//                   plus a linear head (ClassifierModel):
//                   • Token + positional embeddings
//                   • Multi-head self-attention with pad masking
//                   • GELU feed-forward, post-norm residuals
//                   • Masked mean pooling for features
//
//   schedule.rs   — Linear warmup / linear decay learning rate
//
//   trainer.rs    — Step loop: forward, loss, backward, Adam,
//                   periodic validation, best-model tracking
//
//   inferencer.rs — Batched logits, probabilities and features
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Radford et al. (2018) Improving Language Understanding
//            by Generative Pre-Training

/// Transformer encoder trunk and prediction head
pub mod model;

/// Warmup + linear decay learning rate schedule
pub mod schedule;

/// Fine-tuning loop with validation and autosave hooks
pub mod trainer;

/// Batched forward passes for prediction and featurising
pub mod inferencer;
