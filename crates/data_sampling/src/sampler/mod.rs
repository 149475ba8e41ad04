use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub mod interleaved;
pub mod semi;

pub use interleaved::{
    InterleavedBatchSampler, InterleavedBatches, InterleavedConfig, InterleavedIter,
    InterleavedSampler, InterleavedSamplerBuilder, ResumePoint, ScheduleState, StopCondition,
    Trigger,
};
pub use semi::{SemiSampler, SemiSamplerBuilder};

/// A `Sampler` defines the strategy for how to iterate and draw indices from
/// a dataset.
///
/// # Methods
/// - `iter(epoch)`: the index sequence for that epoch. Epoch-aware samplers
///   derive their shuffling from a base seed and `epoch`, so calling
///   `iter(epoch)` is also how a sampler is told which epoch it is in.
/// - `len()`: number of indices a single `iter` call yields.
/// - `dataset_size()`: size of the dataset the indices point into. Interleaved
///   scheduling uses it to compute global index offsets.
///
/// Implementations must be `Send + Sync` so the same sampler instance can be
/// shared with loader threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;

    fn len(&self) -> usize;

    fn dataset_size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    type Item = S::Item;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        (**self).iter(epoch)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn dataset_size(&self) -> usize {
        (**self).dataset_size()
    }
}

/// ============================================================================
/// Yields indices sequentially in order `(0,1,2,...,dataset_size-1)`.
///
/// ```ignore
/// let sampler = SequentialSampler::new(5);
/// let indices: Vec<_> = sampler.iter(0).collect();
/// assert_eq!(indices, vec![0, 1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.dataset_size)
    }

    fn len(&self) -> usize {
        self.dataset_size
    }

    fn dataset_size(&self) -> usize {
        self.dataset_size
    }
}

/// ============================================================================
/// Random uniform sampling over `0..dataset_size`, with optional replacement.
///
/// # Arguments:
/// - `dataset_size`: Total number of samples in a dataset.
/// - `replacement`: If `true`, each draw is independent and indices may repeat.
/// - `num_samples`: Number of indices per epoch, defaults to `dataset_size`.
///                  Without replacement it must not exceed `dataset_size`.
/// - `base_seed`: Base RNG seed.
///
/// Each epoch derives its generator from `base_seed + epoch`, so epochs differ
/// from each other but a run is reproducible from `base_seed`.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    replacement: bool,
    num_samples: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(
        dataset_size: usize,
        replacement: bool,
        num_samples: Option<usize>,
        base_seed: u64,
    ) -> Result<Self> {
        let num_samples = num_samples.unwrap_or(dataset_size);
        ensure!(
            num_samples > 0,
            "num_samples must be a positive integer value, but got num_samples={}",
            num_samples
        );
        if !replacement {
            ensure!(
                num_samples <= dataset_size,
                "num_samples ({}) exceeds dataset size ({}) without replacement",
                num_samples,
                dataset_size
            );
        }

        Ok(Self {
            dataset_size,
            replacement,
            num_samples,
            base_seed,
        })
    }

    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = self.derive_rng_for_epoch(epoch);
        if self.replacement {
            Box::new((0..self.num_samples).map(move |_| rng.random_range(0..self.dataset_size)))
        } else {
            let mut indices: Vec<_> = (0..self.dataset_size).collect();
            indices.shuffle(&mut rng);
            indices.truncate(self.num_samples);
            Box::new(indices.into_iter())
        }
    }

    fn len(&self) -> usize {
        self.num_samples
    }

    fn dataset_size(&self) -> usize {
        self.dataset_size
    }
}

/// ============================================================================
/// Partitions a dataset's indices evenly across `num_replicas` ranks.
///
/// All ranks shuffle with the same `base_seed + epoch`, then rank `r` takes
/// every `num_replicas`-th index starting at `r`, so the shards are disjoint.
///
/// ```text
/// indices: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9], 3 ranks
///
/// drop_last=true (truncate to 9 samples)
///   Rank 0: [0, 3, 6]
///   Rank 1: [1, 4, 7]
///   Rank 2: [2, 5, 8]
///
/// drop_last=false (pad to 12 samples by cycling from the front)
///   Rank 0: [0, 3, 6, 9]
///   Rank 1: [1, 4, 7, 0]
///   Rank 2: [2, 5, 8, 1]
/// ```
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    dataset_size: usize,
    num_replicas: usize,
    rank: usize,
    shuffle: bool,
    drop_last: bool,
    base_seed: u64,
}

impl DistributedSampler {
    pub fn new(
        dataset_size: usize,
        num_replicas: usize,
        rank: usize,
        shuffle: bool,
        drop_last: bool,
        base_seed: u64,
    ) -> Result<Self> {
        ensure!(dataset_size > 0, "Dataset size must not be empty");
        ensure!(num_replicas > 0, "Number of replicas must be > 0");
        ensure!(
            rank < num_replicas,
            "Invalid rank {rank}, rank should be in the interval [0, {}]",
            num_replicas - 1
        );
        Ok(Self {
            dataset_size,
            num_replicas,
            rank,
            shuffle,
            drop_last,
            base_seed,
        })
    }

    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }

    /// Largest multiple of `num_replicas` not above `dataset_size` with
    /// `drop_last`, smallest multiple not below it otherwise.
    fn total_size(&self) -> usize {
        if self.drop_last {
            self.dataset_size - (self.dataset_size % self.num_replicas)
        } else {
            self.dataset_size.div_ceil(self.num_replicas) * self.num_replicas
        }
    }
}

impl Sampler for DistributedSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        if self.shuffle {
            indices.shuffle(&mut self.derive_rng_for_epoch(epoch));
        }

        let total_size = self.total_size();
        if self.drop_last {
            indices.truncate(total_size);
        } else if total_size > indices.len() {
            let padding: Vec<_> = indices
                .iter()
                .cycle()
                .take(total_size - indices.len())
                .copied()
                .collect();
            indices.extend(padding);
        }

        Box::new(
            indices
                .into_iter()
                .skip(self.rank)
                .step_by(self.num_replicas),
        )
    }

    fn len(&self) -> usize {
        self.total_size() / self.num_replicas
    }

    fn dataset_size(&self) -> usize {
        self.dataset_size
    }
}
