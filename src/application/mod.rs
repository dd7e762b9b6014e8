// ============================================================
// Layer 2 — Application
// ============================================================
// The public fine-tuning API and the engine behind it.
//
//   general_api.rs — LanguageModelGeneralApi: multi-input
//                    transposition and once-only task typing,
//                    then delegation to the base engine
//
//   base.rs        — LanguageModelBase: encoding, training,
//                    autosave, batched inference, persistence
//
//   config.rs      — BaseConfig and TrainingOptions defaults
//
// No tensor math here; that lives in Layer 5 (ml).

// Instance settings and per-call options
pub mod config;

// The training / inference engine
pub mod base;

// The caller-facing adapter
pub mod general_api;
