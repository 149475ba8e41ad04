//! SemiSampler tests.
//!
//! Tests cover:
//! - Every labeled and unlabeled index is drawn once per epoch when the pools fit the ratio
//! - Ranks partition both pools
//! - SemiSampler as the main sampler of an interleaved schedule and loader

mod common;
use common::labeled_dataset;

use data_sampling::{
    loader::InterleavedLoader,
    sampler::{
        InterleavedConfig, InterleavedSampler, Sampler, SemiSampler, SequentialSampler,
        StopCondition, Trigger,
    },
};

use anyhow::Result;
use std::collections::HashSet;

/// 8 labeled samples with classes 0..3 and 8 unlabeled samples, interleaved.
fn classes() -> Vec<i64> {
    (0..16).map(|i| if i % 2 == 0 { (i / 2) % 4 } else { -1 }).collect()
}

#[test]
fn covers_each_pool_once_per_epoch() -> Result<()> {
    let classes = classes();
    let sampler = SemiSampler::builder(classes.clone()).seed(5).build()?;
    assert_eq!(sampler.len(), 16);

    for epoch in 0..3 {
        let indices: Vec<usize> = sampler.iter(epoch).collect();
        let unique: HashSet<usize> = indices.iter().copied().collect();
        assert_eq!(unique.len(), 16, "epoch {}", epoch);
        for (position, &index) in indices.iter().enumerate() {
            assert_eq!(classes[index] == -1, position % 2 == 1);
        }
    }
    Ok(())
}

#[test]
fn ranks_partition_both_pools() -> Result<()> {
    let world_size = 4;
    let mut seen = HashSet::new();
    for rank in 0..world_size {
        let sampler = SemiSampler::builder(classes())
            .rank(rank)
            .world_size(world_size)
            .seed(11)
            .build()?;
        assert_eq!(sampler.len(), 4);
        for index in sampler.iter(2) {
            assert!(seen.insert(index), "index {} drawn by two ranks", index);
        }
    }
    assert_eq!(seen.len(), 16);
    Ok(())
}

#[test]
fn drives_interleaved_schedule() -> Result<()> {
    let classes = classes();
    let semi = SemiSampler::builder(classes.clone())
        .num_labeled(1)
        .num_unlabeled(3)
        .seed(1)
        .build()?;
    let sampler = InterleavedSampler::builder(semi, 4)
        .stop(StopCondition::Epochs(2))
        .build()?;

    let batches: Vec<Vec<usize>> = sampler.batches().iter().collect::<Result<_>>()?;
    assert_eq!(batches.len(), 8);
    for batch in &batches {
        let unlabeled: Vec<bool> = batch.iter().map(|&i| classes[i] == -1).collect();
        assert_eq!(unlabeled, vec![false, true, true, true]);
    }
    Ok(())
}

#[test]
fn loads_labeled_and_unlabeled_batches() -> Result<()> {
    let classes = classes();
    let dataset = labeled_dataset(&classes);
    let semi = SemiSampler::from_dataset(&dataset)?.seed(3).build()?;
    let sampler = InterleavedSampler::builder(semi, 2)
        .interleave(InterleavedConfig::new(
            SequentialSampler::new(4),
            Trigger::EveryNEpochs(1),
        ))
        .stop(StopCondition::Epochs(1))
        .build()?;
    let loader = InterleavedLoader::builder(sampler, dataset)
        .interleaved_dataset(labeled_dataset(&[0, 1, 2, 3]))
        .build()?;

    let mut main_batches = 0;
    for batch in loader.iter()? {
        let batch = batch?;
        let labels: Vec<i64> = batch.batch.get("class")?.flatten(0, -1).try_into()?;
        if batch.is_main() {
            main_batches += 1;
            assert_ne!(labels[0], -1);
            assert_eq!(labels[1], -1);
        } else {
            assert_eq!(batch.origin, 1);
            assert!(labels == vec![0, 1] || labels == vec![2, 3]);
        }
    }
    assert_eq!(main_batches, 8);
    Ok(())
}
