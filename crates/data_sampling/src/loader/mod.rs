//! Batch materialization for an [`InterleavedSampler`].
//!
//! The loader turns the sampler's batches of global indices into collated
//! batches:
//!
//! ```text
//!  InterleavedSampler ── Vec<usize> ──► InterleavedDataset ── (origin, Sample) ──►
//!  InterleavedCollator ── InterleavedBatch { origin, batch } ──► caller
//! ```
//!
//! With `num_workers > 0`, batch `k` of the stream is loaded by worker
//! `k % num_workers` and results are yielded in stream order.
//!
//! ```ignore
//! let loader = InterleavedLoader::builder(sampler, main_dataset)
//!     .interleaved_dataset(test_dataset)
//!     .config(LoaderConfig::builder().num_workers(4).seed(0).build())
//!     .build()?;
//!
//! for batch in loader.iter()? {
//!     let batch = batch?;
//!     if batch.is_main() { /* train step */ } else { /* evaluate */ }
//! }
//! ```

mod config;
mod pool;

pub use config::{LoaderConfig, LoaderConfigBuilder};

use crate::collator::{InterleavedCollator, SharedCollator, StackCollator};
use crate::dataset::{Dataset, InterleavedDataset, SharedDataset};
use crate::error::ensure_config;
use crate::minibatch::InterleavedBatch;
use crate::rng::{clear_worker_rng, init_worker_rng};
use crate::sample::Sample;
use crate::sampler::{InterleavedBatches, InterleavedSampler, ScheduleState};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use pool::WorkerPool;
use rand::Rng;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Loads the batches of an [`InterleavedSampler`] from the main dataset and
/// one dataset per interleaved config.
pub struct InterleavedLoader {
    sampler: InterleavedSampler,
    dataset: Arc<InterleavedDataset<Sample>>,
    collator: Arc<InterleavedCollator>,
    config: LoaderConfig,
    runtime_seed: u64,
}

impl InterleavedLoader {
    pub fn builder(
        sampler: InterleavedSampler,
        main_dataset: impl Dataset<Item = Sample> + 'static,
    ) -> InterleavedLoaderBuilder {
        InterleavedLoaderBuilder {
            sampler,
            main_dataset: Arc::new(main_dataset),
            main_collator: None,
            datasets: Vec::new(),
            config: LoaderConfig::default(),
        }
    }

    pub fn sampler(&self) -> &InterleavedSampler {
        &self.sampler
    }

    pub fn dataset(&self) -> &InterleavedDataset<Sample> {
        &self.dataset
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Base seed of the worker RNGs (drawn at construction if not configured).
    pub fn runtime_seed(&self) -> u64 {
        self.runtime_seed
    }

    pub fn iter(&self) -> Result<InterleavedLoaderIter<'_>> {
        let batches = self.sampler.batches().iter();
        let epoch = self.sampler.start_state().epoch;

        let inner = if self.config.num_workers == 0 {
            let seeded = self.config.seed.is_some();
            if seeded {
                init_worker_rng(0, epoch, self.runtime_seed);
            }
            LoaderImpl::Single { batches, seeded }
        } else {
            log::info!(
                "InterleavedLoader: starting {} workers (prefetch_factor={}, seed={}, epoch={})",
                self.config.num_workers,
                self.config.prefetch_factor,
                self.runtime_seed,
                epoch
            );
            LoaderImpl::Multi {
                pool: self.spawn_workers(epoch)?,
                batches,
                next_to_send: 0,
                next_to_yield: 0,
                in_flight: 0,
                ready: BTreeMap::new(),
                exhausted: false,
            }
        };
        Ok(InterleavedLoaderIter {
            loader: self,
            inner,
            finished: false,
        })
    }

    fn spawn_workers(&self, epoch: usize) -> Result<WorkerPool<Task, TaskOutput>> {
        let dataset = self.dataset.clone();
        let collator = self.collator.clone();
        let base_seed = self.runtime_seed;
        let poll = self.config.worker_timeout;

        WorkerPool::<Task, TaskOutput>::new(
            self.config.num_workers,
            self.config.prefetch_factor,
            move |worker_id, tasks, outputs, shutdown| {
                init_worker_rng(worker_id, epoch, base_seed);
                while !shutdown.load(Ordering::Relaxed) {
                    let (batch_index, indices) = match tasks.recv_timeout(poll) {
                        Ok(task) => task,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        load_batch(&dataset, &collator, &indices)
                    }))
                    .unwrap_or_else(|_| Err(anyhow!("Worker {} panicked", worker_id)))
                    .with_context(|| {
                        format!("Worker {} failed to load batch {}", worker_id, batch_index)
                    });
                    if outputs.send((batch_index, result)).is_err() {
                        break;
                    }
                }
            },
        )
        .context("Failed to create worker pool for interleaved loading")
    }
}

impl std::fmt::Debug for InterleavedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedLoader")
            .field("sampler", &self.sampler)
            .field("num_datasets", &self.dataset.num_datasets())
            .field("config", &self.config)
            .finish()
    }
}

pub struct InterleavedLoaderBuilder {
    sampler: InterleavedSampler,
    main_dataset: SharedDataset<Sample>,
    main_collator: Option<SharedCollator>,
    datasets: Vec<SharedDataset<Sample>>,
    config: LoaderConfig,
}

impl InterleavedLoaderBuilder {
    /// Collator for main batches. Defaults to [`StackCollator`].
    pub fn main_collator(mut self, collator: SharedCollator) -> Self {
        self.main_collator = Some(collator);
        self
    }

    /// Dataset of the next interleaved config, in declaration order.
    pub fn interleaved_dataset(mut self, dataset: impl Dataset<Item = Sample> + 'static) -> Self {
        self.datasets.push(Arc::new(dataset));
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<InterleavedLoader> {
        self.config.validate()?;
        let configs = self.sampler.configs();
        ensure_config!(
            self.datasets.len() == configs.len(),
            "Expected one dataset per interleaved config ({}), but got {}",
            configs.len(),
            self.datasets.len()
        );

        let datasets: Vec<SharedDataset<Sample>> = std::iter::once(self.main_dataset)
            .chain(self.datasets)
            .collect();
        for (origin, (dataset, expected)) in datasets
            .iter()
            .zip(self.sampler.dataset_sizes())
            .enumerate()
        {
            ensure_config!(
                dataset.len() == expected,
                "Dataset {} has {} samples but its sampler indexes {}",
                origin,
                dataset.len(),
                expected
            );
        }

        let default: SharedCollator = Arc::new(StackCollator);
        let collators: Vec<SharedCollator> =
            std::iter::once(self.main_collator.unwrap_or_else(|| default.clone()))
                .chain(
                    self.sampler
                        .collators()
                        .into_iter()
                        .map(|c| c.unwrap_or_else(|| default.clone())),
                )
                .collect();

        let runtime_seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
        Ok(InterleavedLoader {
            dataset: Arc::new(InterleavedDataset::new(datasets)?),
            collator: Arc::new(InterleavedCollator::new(collators)),
            sampler: self.sampler,
            config: self.config,
            runtime_seed,
        })
    }
}

type Task = (usize, Vec<usize>);
type TaskOutput = (usize, Result<InterleavedBatch>);

fn load_batch(
    dataset: &InterleavedDataset<Sample>,
    collator: &InterleavedCollator,
    indices: &[usize],
) -> Result<InterleavedBatch> {
    let items = indices
        .iter()
        .map(|&index| {
            dataset
                .get(index)
                .with_context(|| format!("Failed to load sample {}", index))
        })
        .collect::<Result<Vec<_>>>()?;
    collator.collate(items)
}

enum LoaderImpl<'a> {
    Single {
        batches: InterleavedBatches<'a>,
        /// The caller thread's worker RNG was seeded and is cleared on drop.
        seeded: bool,
    },
    Multi {
        pool: WorkerPool<Task, TaskOutput>,
        batches: InterleavedBatches<'a>,
        next_to_send: usize,
        next_to_yield: usize,
        in_flight: usize,
        ready: BTreeMap<usize, Result<InterleavedBatch>>,
        exhausted: bool,
    },
}

/// Yields collated batches in stream order. Dropping it stops the workers.
pub struct InterleavedLoaderIter<'a> {
    loader: &'a InterleavedLoader,
    inner: LoaderImpl<'a>,
    finished: bool,
}

impl InterleavedLoaderIter<'_> {
    /// Scheduler position. With workers it runs ahead of the yielded batches
    /// by up to `num_workers * prefetch_factor` batches.
    pub fn sampler_state(&self) -> ScheduleState {
        match &self.inner {
            LoaderImpl::Single { batches, .. } | LoaderImpl::Multi { batches, .. } => {
                batches.state()
            }
        }
    }
}

impl Iterator for InterleavedLoaderIter<'_> {
    type Item = Result<InterleavedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let loader = self.loader;
        match &mut self.inner {
            LoaderImpl::Single { batches, .. } => match batches.next()? {
                Ok(indices) => Some(load_batch(&loader.dataset, &loader.collator, &indices)),
                Err(e) => {
                    self.finished = true;
                    Some(Err(e))
                }
            },
            LoaderImpl::Multi {
                pool,
                batches,
                next_to_send,
                next_to_yield,
                in_flight,
                ready,
                exhausted,
            } => {
                let max_in_flight = loader.config.max_in_flight();
                while !*exhausted && *in_flight < max_in_flight {
                    match batches.next() {
                        Some(Ok(indices)) => {
                            let worker = *next_to_send % pool.num_workers();
                            if let Err(e) = pool.send(worker, (*next_to_send, indices)) {
                                self.finished = true;
                                return Some(Err(e.context(format!(
                                    "Failed to send batch {} to worker {}",
                                    *next_to_send, worker
                                ))));
                            }
                            *next_to_send += 1;
                            *in_flight += 1;
                        }
                        Some(Err(e)) => {
                            ready.insert(*next_to_send, Err(e));
                            *next_to_send += 1;
                            *exhausted = true;
                        }
                        None => *exhausted = true,
                    }
                }

                loop {
                    if let Some(result) = ready.remove(next_to_yield) {
                        *next_to_yield += 1;
                        return Some(result);
                    }
                    if *in_flight == 0 {
                        self.finished = true;
                        return None;
                    }
                    match pool.recv_timeout(loader.config.timeout) {
                        Ok((batch_index, result)) => {
                            *in_flight -= 1;
                            ready.insert(batch_index, result);
                        }
                        Err(e) => {
                            self.finished = true;
                            return Some(Err(e.context(format!(
                                "Failed to receive batch {} ({} in flight)",
                                *next_to_yield, *in_flight
                            ))));
                        }
                    }
                }
            }
        }
    }
}

impl Drop for InterleavedLoaderIter<'_> {
    fn drop(&mut self) {
        if let LoaderImpl::Single { seeded: true, .. } = self.inner {
            clear_worker_rng();
        }
    }
}
