use crate::collator::Collator;
use crate::sample::Sample;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tch::{Device, Tensor};

/// A batch of samples stacked along dim 0.
///
/// Each tensor has shape `[batch_size, ...]`. Produced by a [`Collator`].
#[derive(Debug)]
pub struct MiniBatch {
    pub tensors: HashMap<String, Tensor>,
}

impl MiniBatch {
    /// Delegates batching to `collator`.
    pub fn collate(samples: Vec<Sample>, collator: impl Collator) -> Result<Self> {
        collator.collate(&samples)
    }

    pub fn batch_size(&self) -> Result<i64> {
        self.tensors
            .values()
            .next()
            .map(|t| t.size()[0])
            .ok_or(anyhow!("Empty mini-batch"))
    }

    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.tensors
            .get(feature)
            .ok_or_else(|| anyhow!("Feature '{}' not found in mini-batch", feature))
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn to_device(&self, device: Device) -> Self {
        Self {
            tensors: self
                .tensors
                .iter()
                .map(|(name, tensor)| (name.clone(), tensor.to_device(device)))
                .collect(),
        }
    }
}

/// A collated batch together with the dataset it was drawn from.
///
/// `origin` is 0 for the main dataset and `i + 1` for the `i`-th interleaved
/// dataset, matching [`InterleavedDataset`](crate::dataset::InterleavedDataset).
#[derive(Debug)]
pub struct InterleavedBatch {
    pub origin: usize,
    pub batch: MiniBatch,
}

impl InterleavedBatch {
    pub fn is_main(&self) -> bool {
        self.origin == 0
    }
}
