use crate::dataset::Dataset;
use crate::error::ensure_config;
use crate::sample::Sample;
use crate::sampler::Sampler;
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Class value that marks an unlabeled sample.
pub const UNLABELED: i64 = -1;

/// Semi-supervised sampler that interleaves labeled and unlabeled indices in a
/// fixed `num_labeled : num_unlabeled` cycle.
///
/// Every epoch both pools are shuffled with `seed + epoch` (the same order on
/// every rank) and sharded with stride `world_size` starting at `rank`. Each
/// shard is shuffled again with `seed + epoch + rank` and read cyclically, so a
/// small unlabeled pool wraps around instead of being resampled.
///
/// ```text
/// classes: [0, -1, 1, -1, 2, 3], 1:1, world_size 1
/// emitted: [L, U, L, U, L, U]   (the third U repeats the first)
/// ```
#[derive(Debug, Clone)]
pub struct SemiSampler {
    labeled: Vec<usize>,
    unlabeled: Vec<usize>,
    num_labeled: usize,
    num_unlabeled: usize,
    rank: usize,
    world_size: usize,
    seed: u64,
}

impl SemiSampler {
    /// `classes[i]` is the class of dataset sample `i`, [`UNLABELED`] if it has none.
    pub fn builder(classes: Vec<i64>) -> SemiSamplerBuilder {
        SemiSamplerBuilder {
            classes,
            num_labeled: 1,
            num_unlabeled: 1,
            rank: 0,
            world_size: 1,
            seed: 0,
        }
    }

    /// Reads the `"class"` feature of every sample in `dataset`.
    pub fn from_dataset<D>(dataset: &D) -> Result<SemiSamplerBuilder>
    where
        D: Dataset<Item = Sample> + ?Sized,
    {
        let classes = (0..dataset.len())
            .map(|index| {
                dataset
                    .get(index)
                    .and_then(|sample| sample.class())
                    .with_context(|| format!("Failed to read class of sample {}", index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::builder(classes))
    }

    pub fn num_labeled_samples(&self) -> usize {
        self.labeled.len()
    }

    pub fn num_unlabeled_samples(&self) -> usize {
        self.unlabeled.len()
    }

    fn shard(&self, pool: &[usize], shared: &mut StdRng, local: &mut StdRng) -> Vec<usize> {
        let mut pool = pool.to_vec();
        pool.shuffle(shared);
        let mut shard: Vec<usize> = pool
            .into_iter()
            .skip(self.rank)
            .step_by(self.world_size)
            .collect();
        shard.shuffle(local);
        shard
    }
}

impl Sampler for SemiSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let epoch_seed = self.seed.wrapping_add(epoch as u64);
        let mut shared = StdRng::seed_from_u64(epoch_seed);
        let mut local = StdRng::seed_from_u64(epoch_seed.wrapping_add(self.rank as u64));

        let labeled = self.shard(&self.labeled, &mut shared, &mut local);
        let unlabeled = self.shard(&self.unlabeled, &mut shared, &mut local);

        let cycle = self.num_labeled + self.num_unlabeled;
        let mut labeled_pos = 0;
        let mut unlabeled_pos = 0;
        let indices: Vec<usize> = (0..self.len())
            .map(|i| {
                if i % cycle < self.num_labeled {
                    labeled_pos += 1;
                    labeled[(labeled_pos - 1) % labeled.len()]
                } else {
                    unlabeled_pos += 1;
                    unlabeled[(unlabeled_pos - 1) % unlabeled.len()]
                }
            })
            .collect();
        Box::new(indices.into_iter())
    }

    fn len(&self) -> usize {
        self.dataset_size().div_ceil(self.world_size)
    }

    fn dataset_size(&self) -> usize {
        self.labeled.len() + self.unlabeled.len()
    }
}

/// Builder for [`SemiSampler`]. Defaults: 1:1 ratio, rank 0 of 1, seed 0.
#[derive(Debug, Clone)]
pub struct SemiSamplerBuilder {
    classes: Vec<i64>,
    num_labeled: usize,
    num_unlabeled: usize,
    rank: usize,
    world_size: usize,
    seed: u64,
}

impl SemiSamplerBuilder {
    pub fn num_labeled(mut self, num_labeled: usize) -> Self {
        self.num_labeled = num_labeled;
        self
    }

    pub fn num_unlabeled(mut self, num_unlabeled: usize) -> Self {
        self.num_unlabeled = num_unlabeled;
        self
    }

    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn world_size(mut self, world_size: usize) -> Self {
        self.world_size = world_size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<SemiSampler> {
        ensure_config!(
            self.world_size > 0,
            "world_size must be > 0, but got world_size={}",
            self.world_size
        );
        ensure_config!(
            self.rank < self.world_size,
            "Invalid rank {}, rank should be in the interval [0, {}]",
            self.rank,
            self.world_size - 1
        );
        ensure_config!(
            self.num_labeled + self.num_unlabeled > 0,
            "num_labeled and num_unlabeled must not both be 0"
        );

        let (unlabeled, labeled): (Vec<usize>, Vec<usize>) =
            (0..self.classes.len()).partition(|&i| self.classes[i] == UNLABELED);
        if self.num_labeled > 0 {
            ensure_config!(
                labeled.len() >= self.world_size,
                "{} labeled samples cannot be sharded across {} ranks",
                labeled.len(),
                self.world_size
            );
        }
        if self.num_unlabeled > 0 {
            ensure_config!(
                unlabeled.len() >= self.world_size,
                "{} unlabeled samples cannot be sharded across {} ranks",
                unlabeled.len(),
                self.world_size
            );
        }

        log::debug!(
            "SemiSampler: {} labeled, {} unlabeled, ratio {}:{}, rank {}/{}",
            labeled.len(),
            unlabeled.len(),
            self.num_labeled,
            self.num_unlabeled,
            self.rank,
            self.world_size
        );
        Ok(SemiSampler {
            labeled,
            unlabeled,
            num_labeled: self.num_labeled,
            num_unlabeled: self.num_unlabeled,
            rank: self.rank,
            world_size: self.world_size,
            seed: self.seed,
        })
    }
}
