// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Seams between the fine-tuning API and the components it
// delegates to. The base engine only talks to a TextEncoder,
// so any tokenisation scheme that can lay out multi-segment
// examples can be plugged in.

use crate::domain::inputs::InputChannels;
use crate::error::FinetuneResult;

/// Token ids for one example, before padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub token_ids: Vec<u32>,
}

/// Turns multi-segment text into token id sequences.
pub trait TextEncoder {
    /// Encode every example of `channels` into at most `max_length` ids,
    /// truncating segments as needed.
    fn encode_multi_input(
        &self,
        channels: &InputChannels,
        max_length: usize,
    ) -> FinetuneResult<Vec<EncodedExample>>;

    /// Id written into padded positions.
    fn pad_id(&self) -> u32;

    /// Number of distinct ids the encoder can produce.
    fn vocab_size(&self) -> usize;
}
