use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::encoder::TokenArrays;

/// Supervision for one example.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Index into the class set.
    Class(usize),
    /// Regression value.
    Value(f32),
}

/// One padded example ready for batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierItem {
    pub token_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub target:         Option<Target>,
}

impl ClassifierItem {
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m != 0).count()
    }
}

pub struct ClassifierDataset {
    items: Vec<ClassifierItem>,
}

impl ClassifierDataset {
    pub fn new(items: Vec<ClassifierItem>) -> Self { Self { items } }

    /// Unlabelled items for inference.
    pub fn from_arrays(arrays: TokenArrays) -> Self {
        let items = arrays
            .tokens
            .into_iter()
            .zip(arrays.mask)
            .map(|(token_ids, attention_mask)| ClassifierItem { token_ids, attention_mask, target: None })
            .collect();
        Self { items }
    }

    /// Labelled items; `targets` must be aligned with the array rows.
    pub fn labelled(arrays: TokenArrays, targets: Vec<Target>) -> Self {
        debug_assert_eq!(arrays.len(), targets.len());
        let items = arrays
            .tokens
            .into_iter()
            .zip(arrays.mask)
            .zip(targets)
            .map(|((token_ids, attention_mask), target)| ClassifierItem {
                token_ids,
                attention_mask,
                target: Some(target),
            })
            .collect();
        Self { items }
    }

    pub fn into_items(self) -> Vec<ClassifierItem> { self.items }
}

impl Dataset<ClassifierItem> for ClassifierDataset {
    fn get(&self, index: usize) -> Option<ClassifierItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrays() -> TokenArrays {
        TokenArrays {
            tokens:     vec![vec![2, 7, 3, 0], vec![2, 8, 9, 3]],
            mask:       vec![vec![1, 1, 1, 0], vec![1, 1, 1, 1]],
            max_length: 4,
        }
    }

    #[test]
    fn test_labelled_items_keep_row_order() {
        let ds = ClassifierDataset::labelled(arrays(), vec![Target::Class(1), Target::Class(0)]);
        assert_eq!(ds.len(), 2);
        let second = ds.get(1).unwrap();
        assert_eq!(second.token_ids, vec![2, 8, 9, 3]);
        assert_eq!(second.target, Some(Target::Class(0)));
        assert_eq!(ds.get(0).unwrap().real_tokens(), 3);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_unlabelled_items() {
        let ds = ClassifierDataset::from_arrays(arrays());
        assert!(ds.into_items().iter().all(|i| i.target.is_none()));
    }
}
