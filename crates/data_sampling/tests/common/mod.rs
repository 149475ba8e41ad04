#![allow(dead_code)]

use data_sampling::{dataset::InMemoryDataset, sample::Sample, sampler::InterleavedSampler};

use anyhow::Result;
use tch::Tensor;

/// Samples whose feature `"x"` holds the value from `values`.
pub fn value_dataset(values: impl IntoIterator<Item = i64>) -> InMemoryDataset<Sample> {
    InMemoryDataset::new(
        values
            .into_iter()
            .map(|v| Sample::from_single("x", Tensor::from_slice(&[v])))
            .collect(),
    )
}

/// Samples with a `"class"` label each; `-1` marks an unlabeled sample.
pub fn labeled_dataset(classes: &[i64]) -> InMemoryDataset<Sample> {
    InMemoryDataset::new(
        classes
            .iter()
            .enumerate()
            .map(|(i, &class)| {
                Sample::from_single("x", Tensor::from_slice(&[i as i64])).with_class(class)
            })
            .collect(),
    )
}

/// All batches of the stream, failing on the first stream error.
pub fn all_batches(sampler: &InterleavedSampler) -> Result<Vec<Vec<usize>>> {
    sampler.batches().iter().collect()
}

/// Number of batches drawn from the main dataset (global indices below `main_size`).
pub fn count_main(batches: &[Vec<usize>], main_size: usize) -> usize {
    batches.iter().filter(|b| b[0] < main_size).count()
}
