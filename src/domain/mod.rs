// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the system works with:
// multi-segment inputs, labels, the task type and the encoder
// seam. No Burn types and no file I/O in this layer.

// Input channel declaration and example transposition
pub mod inputs;

// Label values, task type inference and class indexing
pub mod label;

// Abstractions the engine delegates to
pub mod traits;
