use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::{CrossEntropyLossConfig, MseLoss, Reduction},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::data::batcher::BatchTargets;
use crate::error::{FinetuneError, FinetuneResult};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct LanguageModelConfig {
    pub vocab_size:  usize,
    #[config(default = 512)]
    pub max_seq_len: usize,
    #[config(default = 256)]
    pub d_model:     usize,
    #[config(default = 8)]
    pub num_heads:   usize,
    #[config(default = 6)]
    pub num_layers:  usize,
    #[config(default = 1024)]
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl LanguageModelConfig {
    pub fn check(&self) -> FinetuneResult<()> {
        let fail = |msg: String| Err(FinetuneError::InvalidOption(msg));
        if self.vocab_size == 0 || self.max_seq_len == 0 || self.d_model == 0 || self.num_heads == 0 {
            return fail("vocab_size, max_seq_len, d_model and num_heads must be positive".into());
        }
        if self.d_model % self.num_heads != 0 {
            return fail(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TextTransformer<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        TextTransformer { token_embedding, position_embedding, layers, final_norm, dropout }
    }

    /// Fresh prediction head with `n_outputs` outputs over `trunk`.
    pub fn init_classifier<B: Backend>(
        &self,
        trunk:     TextTransformer<B>,
        n_outputs: usize,
        device:    &B::Device,
    ) -> ClassifierModel<B> {
        ClassifierModel {
            trunk,
            head:    LinearConfig::new(self.d_model, n_outputs).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask` is true at padded positions, which receive no attention.
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input       = MhaInput::self_attn(x.clone()).mask_pad(pad_mask);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Transformer encoder trunk: token ids → contextual hidden states.
#[derive(Module, Debug)]
pub struct TextTransformer<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> TextTransformer<B> {
    /// input_ids, attention_mask: [batch, seq_len] → [batch, seq_len, d_model]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let pad_mask = attention_mask.equal_elem(0);
        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        self.final_norm.forward(x)
    }

    /// Mean of the hidden states over real tokens: [batch, d_model]
    pub fn pool(&self, hidden: Tensor<B, 3>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len, d_model] = hidden.dims();
        let weights = attention_mask
            .float()
            .reshape([batch_size, seq_len, 1]);

        let summed = (hidden * weights.clone().expand([batch_size, seq_len, d_model]))
            .sum_dim(1)
            .reshape([batch_size, d_model]);
        let counts = weights
            .sum_dim(1)
            .reshape([batch_size, 1])
            .clamp_min(1.0)
            .expand([batch_size, d_model]);
        summed / counts
    }

    pub fn features(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let hidden = self.forward(input_ids, attention_mask.clone());
        self.pool(hidden, attention_mask)
    }
}

/// Trunk plus a linear head producing class logits or a regression value.
#[derive(Module, Debug)]
pub struct ClassifierModel<B: Backend> {
    pub trunk:   TextTransformer<B>,
    pub head:    Linear<B>,
    pub dropout: Dropout,
}

pub struct ClassifierOutput<B: Backend> {
    /// [batch, d_model]
    pub features: Tensor<B, 2>,
    /// [batch, n_outputs]
    pub logits:   Tensor<B, 2>,
}

impl<B: Backend> ClassifierModel<B> {
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> ClassifierOutput<B> {
        let features = self.trunk.features(input_ids, attention_mask);
        let logits   = self.head.forward(self.dropout.forward(features.clone()));
        ClassifierOutput { features, logits }
    }

    /// Cross-entropy for class targets, mean squared error for values.
    pub fn forward_loss(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        targets:        BatchTargets<B>,
    ) -> (Tensor<B, 1>, ClassifierOutput<B>) {
        let output = self.forward(input_ids, attention_mask);
        let loss = match targets {
            BatchTargets::Classes(classes) => CrossEntropyLossConfig::new()
                .init(&output.logits.device())
                .forward(output.logits.clone(), classes),
            BatchTargets::Values(values) => {
                let [batch_size, _] = output.logits.dims();
                let predicted = output.logits.clone().reshape([batch_size]);
                MseLoss::new().forward(predicted, values, Reduction::Mean)
            }
        };
        (loss, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny() -> LanguageModelConfig {
        LanguageModelConfig::new(20)
            .with_max_seq_len(8)
            .with_d_model(8)
            .with_num_heads(2)
            .with_num_layers(1)
            .with_d_ff(16)
            .with_dropout(0.0)
    }

    fn inputs(device: &<TestBackend as Backend>::Device) -> (Tensor<TestBackend, 2, Int>, Tensor<TestBackend, 2, Int>) {
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 6, 3, 0, 0, 2, 7, 3, 8, 3, 0].as_slice(), device)
            .reshape([2, 6]);
        let mask = Tensor::<TestBackend, 1, Int>::from_ints([1, 1, 1, 1, 0, 0, 1, 1, 1, 1, 1, 0].as_slice(), device)
            .reshape([2, 6]);
        (ids, mask)
    }

    #[test]
    fn test_config_check() {
        assert!(tiny().check().is_ok());
        assert!(tiny().with_num_heads(3).check().is_err());
        assert!(tiny().with_dropout(1.0).check().is_err());
    }

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let cfg = tiny();
        let model = cfg.init_classifier(cfg.init::<TestBackend>(&device), 3, &device);
        let (ids, mask) = inputs(&device);

        let out = model.forward(ids, mask);
        assert_eq!(out.features.dims(), [2, 8]);
        assert_eq!(out.logits.dims(), [2, 3]);
    }

    #[test]
    fn test_padding_does_not_change_features() {
        let device = Default::default();
        let cfg = tiny();
        let trunk = cfg.init::<TestBackend>(&device);
        let (ids, mask) = inputs(&device);

        // Same first row, different ids in its padded positions.
        let ids_alt = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 6, 3, 9, 11, 2, 7, 3, 8, 3, 0].as_slice(), &device)
            .reshape([2, 6]);

        let a: Vec<f32> = trunk.features(ids, mask.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = trunk.features(ids_alt, mask).into_data().to_vec().unwrap();
        for (x, y) in a[..8].iter().zip(&b[..8]) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }

    #[test]
    fn test_losses_are_finite() {
        let device = Default::default();
        let cfg = tiny();
        let (ids, mask) = inputs(&device);

        let clf = cfg.init_classifier(cfg.init::<TestBackend>(&device), 2, &device);
        let classes = Tensor::<TestBackend, 1, Int>::from_ints([1, 0].as_slice(), &device);
        let (loss, _) = clf.forward_loss(ids.clone(), mask.clone(), BatchTargets::Classes(classes));
        assert!(loss.into_scalar().elem::<f32>().is_finite());

        let reg = cfg.init_classifier(cfg.init::<TestBackend>(&device), 1, &device);
        let values = Tensor::<TestBackend, 1>::from_floats([0.5, -1.0].as_slice(), &device);
        let (loss, _) = reg.forward_loss(ids, mask, BatchTargets::Values(values));
        assert!(loss.into_scalar().elem::<f32>() >= 0.0);
    }
}
