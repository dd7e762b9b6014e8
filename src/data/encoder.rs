// ============================================================
// Layer 4 — Multi-Input Encoder
// ============================================================
// Lays out a multi-segment example as one id sequence:
//
//   [CLS] seg_1 [SEP] seg_2 [SEP] ... seg_k [SEP]
//
// and pads it into fixed-width token / mask rows.
//
// Truncation: the k + 1 special tokens are always kept, and
// max_length must leave at least one token per segment. The rest
// of the budget is shared max-min fairly between segments, so a
// short question keeps every token and a long passage absorbs
// the cut. Each segment loses tokens from its tail.

use tokenizers::Tokenizer;

use crate::domain::inputs::InputChannels;
use crate::domain::traits::{EncodedExample, TextEncoder};
use crate::error::{FinetuneError, FinetuneResult};
use crate::infra::tokenizer_store::{CLS_TOKEN, PAD_TOKEN, SEP_TOKEN};

/// Fixed-shape token ids and attention mask, `[n_examples, max_length]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenArrays {
    pub tokens:     Vec<Vec<u32>>,
    /// 1 = real token, 0 = padding
    pub mask:       Vec<Vec<u32>>,
    pub max_length: usize,
}

impl TokenArrays {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.tokens.len(), self.max_length]
    }

    /// Pad encoded examples into fixed-width rows.
    pub fn format(encoded: Vec<EncodedExample>, max_length: usize, pad_id: u32) -> Self {
        let mut tokens = Vec::with_capacity(encoded.len());
        let mut mask   = Vec::with_capacity(encoded.len());

        for example in encoded {
            let mut ids = example.token_ids;
            ids.truncate(max_length);
            let real = ids.len();

            let mut row_mask = vec![1u32; real];
            ids.resize(max_length, pad_id);
            row_mask.resize(max_length, 0);

            tokens.push(ids);
            mask.push(row_mask);
        }

        Self { tokens, mask, max_length }
    }
}

/// `[CLS] a [SEP] b [SEP]` encoder backed by a `tokenizers::Tokenizer`.
#[derive(Clone)]
pub struct MultiInputEncoder {
    tokenizer: Tokenizer,
    cls_id:    u32,
    sep_id:    u32,
    pad_id:    u32,
}

impl MultiInputEncoder {
    pub fn new(tokenizer: Tokenizer) -> FinetuneResult<Self> {
        let lookup = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| FinetuneError::MissingSpecialToken(token.to_string()))
        };
        let cls_id = lookup(CLS_TOKEN)?;
        let sep_id = lookup(SEP_TOKEN)?;
        let pad_id = lookup(PAD_TOKEN)?;
        Ok(Self { tokenizer, cls_id, sep_id, pad_id })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn tokenize(&self, text: &str) -> FinetuneResult<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl TextEncoder for MultiInputEncoder {
    fn encode_multi_input(
        &self,
        channels:   &InputChannels,
        max_length: usize,
    ) -> FinetuneResult<Vec<EncodedExample>> {
        let segments = channels.arity();
        let special  = segments + 1;
        // Room for the special tokens and one token per segment.
        if max_length < special + segments {
            return Err(FinetuneError::MaxLengthTooSmall { max_length, segments });
        }
        let budget = max_length - special;

        let mut encoded    = Vec::with_capacity(channels.len());
        let mut truncated  = 0usize;
        for i in 0..channels.len() {
            let pieces = channels
                .example(i)
                .into_iter()
                .map(|text| self.tokenize(text))
                .collect::<FinetuneResult<Vec<_>>>()?;

            let lengths: Vec<usize> = pieces.iter().map(Vec::len).collect();
            let keep = allocate_budget(&lengths, budget);
            if keep != lengths {
                truncated += 1;
            }

            let mut token_ids = Vec::with_capacity(max_length);
            token_ids.push(self.cls_id);
            for (piece, n) in pieces.iter().zip(keep) {
                token_ids.extend_from_slice(&piece[..n]);
                token_ids.push(self.sep_id);
            }
            encoded.push(EncodedExample { token_ids });
        }

        if truncated > 0 {
            tracing::debug!("{} of {} examples truncated to {} tokens", truncated, channels.len(), max_length);
        }
        Ok(encoded)
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

/// How many tokens each segment keeps when `budget` tokens are available.
fn allocate_budget(lengths: &[usize], budget: usize) -> Vec<usize> {
    if lengths.iter().sum::<usize>() <= budget {
        return lengths.to_vec();
    }

    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by_key(|&i| lengths[i]);

    let mut keep      = vec![0; lengths.len()];
    let mut remaining = budget;
    for (pos, &i) in order.iter().enumerate() {
        let share = remaining / (order.len() - pos);
        keep[i]   = lengths[i].min(share);
        remaining -= keep[i];
    }
    keep
}
