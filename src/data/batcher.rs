// ============================================================
// Layer 4 — Classifier Batcher
// ============================================================
// Stacks padded ClassifierItems into device tensors.
//
//   Input:  N items, each with sequences of length S
//   Output: ClassifierBatch with ids/mask of shape [N, S]
//           and, for labelled items, targets of shape [N]
//
// All rows are padded to the same length by the encoder, so
// stacking is a flatten followed by a reshape.

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use std::marker::PhantomData;

use crate::data::dataset::{ClassifierItem, Target};

/// Targets for a batch: class indices or regression values.
#[derive(Debug, Clone)]
pub enum BatchTargets<B: Backend> {
    Classes(Tensor<B, 1, Int>),
    Values(Tensor<B, 1>),
}

#[derive(Debug, Clone)]
pub struct ClassifierBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub input_ids:      Tensor<B, 2, Int>,
    /// [batch_size, seq_len], 1 = real token
    pub attention_mask: Tensor<B, 2, Int>,
    /// Present only when every item carries a target.
    pub targets:        Option<BatchTargets<B>>,
}

#[derive(Clone, Debug)]
pub struct ClassifierBatcher<B: Backend> {
    _backend: PhantomData<B>,
}

impl<B: Backend> ClassifierBatcher<B> {
    pub fn new() -> Self {
        Self { _backend: PhantomData }
    }
}

impl<B: Backend> Default for ClassifierBatcher<B> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Burn Batcher Trait Implementation ───────────────────────────────────────
// The DataLoader calls .batch(items, device) with each mini-batch.
impl<B: Backend> Batcher<B, ClassifierItem, ClassifierBatch<B>> for ClassifierBatcher<B> {
    /// `items` must be non-empty and share one sequence length.
    fn batch(&self, items: Vec<ClassifierItem>, device: &B::Device) -> ClassifierBatch<B> {
        let batch_size = items.len();
        let seq_len    = items[0].token_ids.len();

        let input_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.token_ids.iter().map(|&x| x as i32))
            .collect();
        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device)
            .reshape([batch_size, seq_len]);

        ClassifierBatch {
            input_ids,
            attention_mask,
            targets: Self::targets(&items, device),
        }
    }
}

impl<B: Backend> ClassifierBatcher<B> {
    fn targets(items: &[ClassifierItem], device: &B::Device) -> Option<BatchTargets<B>> {
        match items.first()?.target? {
            Target::Class(_) => {
                let classes = items
                    .iter()
                    .map(|item| match item.target {
                        Some(Target::Class(c)) => Some(c as i32),
                        _ => None,
                    })
                    .collect::<Option<Vec<i32>>>()?;
                Some(BatchTargets::Classes(Tensor::<B, 1, Int>::from_ints(
                    classes.as_slice(),
                    device,
                )))
            }
            Target::Value(_) => {
                let values = items
                    .iter()
                    .map(|item| match item.target {
                        Some(Target::Value(v)) => Some(v),
                        _ => None,
                    })
                    .collect::<Option<Vec<f32>>>()?;
                Some(BatchTargets::Values(Tensor::<B, 1>::from_floats(
                    values.as_slice(),
                    device,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn item(ids: [u32; 4], mask: [u32; 4], target: Option<Target>) -> ClassifierItem {
        ClassifierItem { token_ids: ids.to_vec(), attention_mask: mask.to_vec(), target }
    }

    #[test]
    fn test_batch_shapes_and_class_targets() {
        let batcher = ClassifierBatcher::<TestBackend>::new();
        let device = Default::default();
        let batch = batcher.batch(vec![
            item([2, 5, 3, 0], [1, 1, 1, 0], Some(Target::Class(1))),
            item([2, 6, 7, 3], [1, 1, 1, 1], Some(Target::Class(0))),
            item([2, 3, 0, 0], [1, 1, 0, 0], Some(Target::Class(1))),
        ], &device);

        assert_eq!(batch.input_ids.dims(), [3, 4]);
        assert_eq!(batch.attention_mask.dims(), [3, 4]);
        let mask_total: i64 = batch.attention_mask.sum().into_scalar().elem::<i64>();
        assert_eq!(mask_total, 9);

        match batch.targets {
            Some(BatchTargets::Classes(t)) => {
                let v: Vec<i64> = t.into_data().convert::<i64>().to_vec::<i64>().unwrap();
                assert_eq!(v, vec![1, 0, 1]);
            }
            other => panic!("expected class targets, got {other:?}"),
        }
    }

    #[test]
    fn test_regression_targets() {
        let batcher = ClassifierBatcher::<TestBackend>::new();
        let device = Default::default();
        let batch = batcher.batch(vec![
            item([2, 5, 3, 0], [1, 1, 1, 0], Some(Target::Value(0.5))),
            item([2, 6, 3, 0], [1, 1, 1, 0], Some(Target::Value(-2.0))),
        ], &device);
        match batch.targets {
            Some(BatchTargets::Values(t)) => {
                let v: Vec<f32> = t.into_data().to_vec::<f32>().unwrap();
                assert_eq!(v, vec![0.5, -2.0]);
            }
            other => panic!("expected value targets, got {other:?}"),
        }
    }

    #[test]
    fn test_unlabelled_batch_has_no_targets() {
        let batcher = ClassifierBatcher::<TestBackend>::new();
        let device = Default::default();
        let batch = batcher.batch(vec![item([2, 5, 3, 0], [1, 1, 1, 0], None)], &device);
        assert!(batch.targets.is_none());
    }

    #[test]
    fn test_shuffled_loader_yields_every_item_once() {
        use crate::data::dataset::ClassifierDataset;
        use burn::data::dataloader::DataLoaderBuilder;

        let items = (0..5)
            .map(|i| item([2, 5 + i as u32, 3, 0], [1, 1, 1, 0], Some(Target::Class(i))))
            .collect();
        let loader = DataLoaderBuilder::new(ClassifierBatcher::<TestBackend>::new())
            .batch_size(2)
            .shuffle(7)
            .build(ClassifierDataset::new(items));

        for _epoch in 0..2 {
            let mut seen = Vec::new();
            let mut batches = 0;
            for batch in loader.iter() {
                batches += 1;
                let Some(BatchTargets::Classes(t)) = batch.targets else { panic!("expected class targets") };
                seen.extend(t.into_data().convert::<i64>().to_vec::<i64>().unwrap());
            }
            seen.sort_unstable();
            assert_eq!(batches, 3);
            assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        }
    }
}
