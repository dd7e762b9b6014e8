// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Batched forward passes over an encoded dataset.
//
//   logits()        → [n_examples, n_outputs]   raw head outputs
//   probabilities() → [n_examples, n_classes]   softmax over logits
//   features()      → [n_examples, d_model]     pooled trunk states
//
// Callers pass models that are already in inference mode
// (model.valid()), so dropout is off and no graph is built.

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    prelude::*,
    tensor::activation::softmax,
};

use crate::data::batcher::{ClassifierBatch, ClassifierBatcher};
use crate::data::dataset::ClassifierDataset;
use crate::ml::model::{ClassifierModel, TextTransformer};

/// Row-major `[n_examples, width]` matrix of model outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data:       Vec<f32>,
    n_examples: usize,
    width:      usize,
}

impl FeatureMatrix {
    pub fn new(data: Vec<f32>, n_examples: usize, width: usize) -> Result<Self> {
        anyhow::ensure!(
            data.len() == n_examples * width,
            "{} values do not fill a {n_examples}×{width} matrix",
            data.len()
        );
        Ok(Self { data, n_examples, width })
    }

    pub fn n_examples(&self) -> usize { self.n_examples }
    pub fn width(&self) -> usize { self.width }
    pub fn is_empty(&self) -> bool { self.n_examples == 0 }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.n_examples).map(move |i| self.row(i))
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.rows().map(<[f32]>::to_vec).collect()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

pub struct Inferencer<B: Backend> {
    device:     B::Device,
    batch_size: usize,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(device: B::Device, batch_size: usize) -> Self {
        Self { device, batch_size: batch_size.max(1) }
    }

    /// Raw head outputs. One column per class, or a single regression column.
    pub fn logits(&self, model: &ClassifierModel<B>, dataset: ClassifierDataset) -> Result<FeatureMatrix> {
        let width = model.head.weight.dims()[1];
        self.run(dataset, width, |batch| model.forward(batch.input_ids, batch.attention_mask).logits)
    }

    pub fn probabilities(&self, model: &ClassifierModel<B>, dataset: ClassifierDataset) -> Result<FeatureMatrix> {
        let width = model.head.weight.dims()[1];
        self.run(dataset, width, |batch| {
            softmax(model.forward(batch.input_ids, batch.attention_mask).logits, 1)
        })
    }

    /// Masked mean-pooled trunk states.
    pub fn features(&self, trunk: &TextTransformer<B>, dataset: ClassifierDataset) -> Result<FeatureMatrix> {
        let width = trunk.token_embedding.weight.dims()[1];
        self.run(dataset, width, |batch| trunk.features(batch.input_ids, batch.attention_mask))
    }

    fn run(
        &self,
        dataset: ClassifierDataset,
        width:   usize,
        forward: impl Fn(ClassifierBatch<B>) -> Tensor<B, 2>,
    ) -> Result<FeatureMatrix> {
        let n_examples = dataset.len();
        let mut data = Vec::with_capacity(n_examples * width);

        // No shuffle, no workers: rows come back in input order.
        let loader = DataLoaderBuilder::new(ClassifierBatcher::<B>::new())
            .batch_size(self.batch_size)
            .set_device(self.device.clone())
            .build(dataset);

        for (i, batch) in loader.iter().enumerate() {
            let out = forward(batch);
            let values: Vec<f32> = out
                .into_data()
                .to_vec()
                .map_err(|e| anyhow::anyhow!("Cannot read model output: {e:?}"))?;
            data.extend(values);
            tracing::trace!("Inference batch {i}");
        }

        FeatureMatrix::new(data, n_examples, width)
    }
}
