use crate::error::SamplingError;
use crate::minibatch::{InterleavedBatch, MiniBatch};
use crate::sample::Sample;
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tch::Tensor;

/// A `Collator` defines how to combine multiple [`Sample`]s into a [`MiniBatch`].
///
/// Any `Fn(&[Sample]) -> Result<MiniBatch>` is a collator, so dataset-specific
/// batching can be passed as a closure.
pub trait Collator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch>;
}

impl<F> Collator for F
where
    F: Fn(&[Sample]) -> Result<MiniBatch>,
{
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch> {
        self(samples)
    }
}

/// A collator that can be shared with worker threads.
pub type SharedCollator = Arc<dyn Collator + Send + Sync>;

/// Stacks identically shaped tensors along dim 0. This is the default
/// collator for every dataset that does not bring its own.
///
/// Fails on an empty sample list, mismatched feature names, or mismatched shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackCollator;

impl Collator for StackCollator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch> {
        let Some(first) = samples.first() else {
            bail!("Cannot collate empty sample list");
        };

        let keys: HashSet<&String> = first.features.keys().collect();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            let other: HashSet<&String> = sample.features.keys().collect();
            if other != keys {
                bail!(
                    "Sample #{} has mismatch feature keys:\n -Missing: {:?}\n -Extra: {:?}",
                    i,
                    keys.difference(&other).collect::<Vec<_>>(),
                    other.difference(&keys).collect::<Vec<_>>()
                );
            }
        }

        let mut tensors = HashMap::with_capacity(keys.len());
        for key in keys {
            let column: Vec<&Tensor> = samples.iter().map(|s| &s.features[key]).collect();
            let reference = column[0].size();
            if let Some((i, tensor)) = column
                .iter()
                .enumerate()
                .find(|(_, t)| t.size() != reference)
            {
                bail!(
                    "Shape mismatch in sample {} for feature '{}': expected {:?}, got {:?}",
                    i,
                    key,
                    reference,
                    tensor.size()
                );
            }
            tensors.insert(key.clone(), Tensor::stack(&column, 0));
        }
        Ok(MiniBatch { tensors })
    }
}

/// Routes a fetched batch to the collator of the dataset it came from.
///
/// Items arrive as `(origin, sample)` pairs from
/// [`InterleavedDataset`](crate::dataset::InterleavedDataset). The scheduler never
/// mixes datasets inside one batch, so a mixed batch is an invariant violation.
#[derive(Clone)]
pub struct InterleavedCollator {
    collators: Vec<SharedCollator>,
}

impl InterleavedCollator {
    /// `collators[0]` belongs to the main dataset, `collators[i + 1]` to the
    /// `i`-th interleaved dataset.
    pub fn new(collators: Vec<SharedCollator>) -> Self {
        Self { collators }
    }

    pub fn num_origins(&self) -> usize {
        self.collators.len()
    }

    pub fn collate(&self, items: Vec<(usize, Sample)>) -> Result<InterleavedBatch> {
        let Some(&(origin, _)) = items.first() else {
            return Err(SamplingError::invariant("received an empty batch").into());
        };
        if let Some((position, (other, _))) =
            items.iter().enumerate().find(|(_, (o, _))| *o != origin)
        {
            return Err(SamplingError::invariant(format!(
                "batch mixes datasets: item 0 is from dataset {} but item {} is from dataset {}",
                origin, position, other
            ))
            .into());
        }
        let Some(collator) = self.collators.get(origin) else {
            return Err(SamplingError::invariant(format!(
                "no collator for dataset {} ({} registered)",
                origin,
                self.collators.len()
            ))
            .into());
        };

        let samples: Vec<Sample> = items.into_iter().map(|(_, sample)| sample).collect();
        let batch = collator
            .collate(&samples)
            .with_context(|| format!("Failed to collate batch from dataset {}", origin))?;
        Ok(InterleavedBatch { origin, batch })
    }
}

impl std::fmt::Debug for InterleavedCollator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedCollator")
            .field("num_origins", &self.collators.len())
            .finish()
    }
}
