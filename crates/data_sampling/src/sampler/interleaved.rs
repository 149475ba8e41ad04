//! Interleaved multi-dataset scheduling.
//!
//! An [`InterleavedSampler`] walks the epochs of a main sampler batch by batch
//! and, after every update, runs full passes over auxiliary samplers whose
//! trigger fires. The result is one deterministic stream of
//! `(is_batch_boundary, global_index)` pairs:
//!
//! ```text
//! main L=6, batch_size=2, aux (3 samples, every 4 samples), offset 6
//!
//! (F,m)(T,m) (F,m)(T,m) (F,6)(T,7)(T,8) (F,m)(T,m) ...
//! └ update 1┘└ update 2┘└─ aux pass ──┘└ update 3┘
//! ```
//!
//! Global indices address the concatenation of the main dataset and the
//! auxiliary datasets in declaration order
//! (see [`InterleavedDataset`](crate::dataset::InterleavedDataset)).

use crate::collator::{Collator, SharedCollator};
use crate::error::{ensure_config, SamplingError};
use crate::sampler::Sampler;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// When an auxiliary sampler is iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// At the end of every `n`-th epoch.
    EveryNEpochs(usize),
    /// After every `n`-th update.
    EveryNUpdates(usize),
    /// After the first update at or past every multiple of `n` samples.
    EveryNSamples(usize),
}

impl Trigger {
    fn period(&self) -> usize {
        match *self {
            Trigger::EveryNEpochs(n) | Trigger::EveryNUpdates(n) | Trigger::EveryNSamples(n) => n,
        }
    }

    /// Evaluated once per update, after the counters in `state` advanced.
    fn fires(&self, state: &ScheduleState, epoch_ended: bool) -> bool {
        match *self {
            Trigger::EveryNEpochs(n) => epoch_ended && state.epoch % n == 0,
            Trigger::EveryNUpdates(n) => state.update % n == 0,
            Trigger::EveryNSamples(n) => {
                state.sample % n == 0 || state.sample_at_last_update / n < state.sample / n
            }
        }
    }
}

/// When iteration ends. Absent means the stream is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    Epochs(usize),
    Updates(usize),
    Samples(usize),
}

impl StopCondition {
    fn value(&self) -> usize {
        match *self {
            StopCondition::Epochs(n) | StopCondition::Updates(n) | StopCondition::Samples(n) => n,
        }
    }

    fn reached(&self, state: &ScheduleState) -> bool {
        match *self {
            StopCondition::Epochs(n) => state.epoch >= n,
            StopCondition::Updates(n) => state.update >= n,
            StopCondition::Samples(n) => state.sample >= n,
        }
    }
}

/// Checkpoint position to resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePoint {
    Epoch(usize),
    Update(usize),
    Sample(usize),
}

/// Progress counters of an interleaved iteration.
///
/// `epoch`, `update` and `sample` only count the main dataset.
/// `sample_in_update` and `sample_in_epoch` reset at batch and epoch
/// boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub epoch: usize,
    pub update: usize,
    pub sample: usize,
    pub sample_in_update: usize,
    pub sample_in_epoch: usize,
    pub sample_at_last_update: usize,
}

/// An auxiliary dataset's sampler, trigger and optional collator.
pub struct InterleavedConfig {
    sampler: Box<dyn Sampler<Item = usize>>,
    trigger: Trigger,
    collator: Option<SharedCollator>,
}

impl InterleavedConfig {
    pub fn new(sampler: impl Sampler<Item = usize> + 'static, trigger: Trigger) -> Self {
        Self {
            sampler: Box::new(sampler),
            trigger,
            collator: None,
        }
    }

    /// Collator for batches of this dataset. Defaults to
    /// [`StackCollator`](crate::collator::StackCollator).
    pub fn with_collator(mut self, collator: impl Collator + Send + Sync + 'static) -> Self {
        self.collator = Some(Arc::new(collator));
        self
    }

    pub fn sampler(&self) -> &dyn Sampler<Item = usize> {
        self.sampler.as_ref()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn collator(&self) -> Option<&SharedCollator> {
        self.collator.as_ref()
    }
}

impl std::fmt::Debug for InterleavedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedConfig")
            .field("len", &self.sampler.len())
            .field("dataset_size", &self.sampler.dataset_size())
            .field("trigger", &self.trigger)
            .field("has_collator", &self.collator.is_some())
            .finish()
    }
}

/// Interleaves the epochs of a main sampler with periodic passes over
/// auxiliary samplers.
///
/// ```ignore
/// let sampler = InterleavedSampler::builder(SequentialSampler::new(6), 2)
///     .interleave(InterleavedConfig::new(SequentialSampler::new(3), Trigger::EveryNSamples(4)))
///     .stop(StopCondition::Epochs(2))
///     .build()?;
/// for (is_boundary, index) in sampler.iter() { ... }
/// ```
pub struct InterleavedSampler {
    main_sampler: Box<dyn Sampler<Item = usize>>,
    batch_size: usize,
    drop_last: bool,
    configs: Vec<InterleavedConfig>,
    stop: Option<StopCondition>,
    start: ScheduleState,
    samples_per_epoch: usize,
    index_offsets: Vec<usize>,
}

impl InterleavedSampler {
    pub fn builder(
        main_sampler: impl Sampler<Item = usize> + 'static,
        batch_size: usize,
    ) -> InterleavedSamplerBuilder {
        InterleavedSamplerBuilder {
            main_sampler: Box::new(main_sampler),
            batch_size,
            drop_last: true,
            configs: Vec::new(),
            stop: None,
            resume: None,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn drop_last(&self) -> bool {
        self.drop_last
    }

    pub fn main_sampler(&self) -> &dyn Sampler<Item = usize> {
        self.main_sampler.as_ref()
    }

    pub fn configs(&self) -> &[InterleavedConfig] {
        &self.configs
    }

    pub fn stop(&self) -> Option<StopCondition> {
        self.stop
    }

    /// Counters at the resume point.
    pub fn start_state(&self) -> ScheduleState {
        self.start
    }

    /// Main-dataset samples consumed per epoch.
    pub fn samples_per_epoch(&self) -> usize {
        self.samples_per_epoch
    }

    /// `index_offsets()[i]` is added to every local index of auxiliary config `i`.
    pub fn index_offsets(&self) -> &[usize] {
        &self.index_offsets
    }

    /// Dataset sizes in global index order: main first, then every auxiliary dataset.
    pub fn dataset_sizes(&self) -> Vec<usize> {
        std::iter::once(self.main_sampler.dataset_size())
            .chain(self.configs.iter().map(|c| c.sampler.dataset_size()))
            .collect()
    }

    /// Collators of the interleaved configs; `None` means the default collator.
    pub fn collators(&self) -> Vec<Option<SharedCollator>> {
        self.configs.iter().map(|c| c.collator.clone()).collect()
    }

    pub fn iter(&self) -> InterleavedIter<'_> {
        let finished = self.stop.is_some_and(|stop| stop.reached(&self.start));
        if finished {
            log::info!(
                "InterleavedSampler: resume point {:?} already satisfies {:?}",
                self.start,
                self.stop
            );
        }
        InterleavedIter {
            sampler: self,
            state: self.start,
            main: None,
            pending: VecDeque::new(),
            aux: None,
            stop_after_aux: false,
            finished,
        }
    }

    /// Groups the stream into batches of global indices.
    pub fn batches(&self) -> InterleavedBatchSampler<'_> {
        InterleavedBatchSampler { sampler: self }
    }
}

impl std::fmt::Debug for InterleavedSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedSampler")
            .field("main_len", &self.main_sampler.len())
            .field("batch_size", &self.batch_size)
            .field("drop_last", &self.drop_last)
            .field("configs", &self.configs)
            .field("stop", &self.stop)
            .field("start", &self.start)
            .finish()
    }
}

pub struct InterleavedSamplerBuilder {
    main_sampler: Box<dyn Sampler<Item = usize>>,
    batch_size: usize,
    drop_last: bool,
    configs: Vec<InterleavedConfig>,
    stop: Option<StopCondition>,
    resume: Option<ResumePoint>,
}

impl InterleavedSamplerBuilder {
    /// Skip the trailing partial batch of every epoch. Defaults to `true`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn interleave(mut self, config: InterleavedConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn stop(mut self, stop: StopCondition) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn resume(mut self, resume: ResumePoint) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn build(self) -> Result<InterleavedSampler> {
        let main_len = self.main_sampler.len();
        let batch_size = self.batch_size;
        ensure_config!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        ensure_config!(
            batch_size <= main_len,
            "batch_size ({}) exceeds the length of the main sampler ({})",
            batch_size,
            main_len
        );
        if let Some(stop) = self.stop {
            ensure_config!(stop.value() > 0, "{:?} must be > 0", stop);
        }
        for (i, config) in self.configs.iter().enumerate() {
            ensure_config!(
                config.trigger.period() > 0,
                "Interleaved config {} has {:?}, the period must be > 0",
                i,
                config.trigger
            );
            ensure_config!(
                !config.sampler.is_empty(),
                "Interleaved config {} has an empty sampler",
                i
            );
        }

        let updates_per_epoch_full = main_len / batch_size;
        let samples_per_epoch = if self.drop_last {
            updates_per_epoch_full * batch_size
        } else {
            main_len
        };
        let start = match self.resume {
            None => ScheduleState::default(),
            Some(resume) => resume_state(
                resume,
                updates_per_epoch_full,
                batch_size,
                samples_per_epoch,
                self.drop_last,
            )?,
        };

        let mut index_offsets = Vec::with_capacity(self.configs.len());
        let mut offset = self.main_sampler.dataset_size();
        for config in &self.configs {
            index_offsets.push(offset);
            offset += config.sampler.dataset_size();
        }

        log::info!(
            "InterleavedSampler: {} main samples per epoch, batch_size={}, drop_last={}, {} interleaved config(s), stop={:?}, start={:?}",
            samples_per_epoch,
            batch_size,
            self.drop_last,
            self.configs.len(),
            self.stop,
            start
        );
        Ok(InterleavedSampler {
            main_sampler: self.main_sampler,
            batch_size,
            drop_last: self.drop_last,
            configs: self.configs,
            stop: self.stop,
            start,
            samples_per_epoch,
            index_offsets,
        })
    }
}

/// Converts a resume point into start counters. Only epoch boundaries can be
/// resumed from, since anything else would require skipping forward inside
/// the main sampler.
fn resume_state(
    resume: ResumePoint,
    full_updates_per_epoch: usize,
    batch_size: usize,
    samples_per_epoch: usize,
    drop_last: bool,
) -> Result<ScheduleState> {
    let (epoch, update, sample) = match resume {
        ResumePoint::Epoch(epoch) => {
            let updates_per_epoch = if samples_per_epoch % batch_size == 0 {
                full_updates_per_epoch
            } else {
                full_updates_per_epoch + 1
            };
            (epoch, updates_per_epoch * epoch, samples_per_epoch * epoch)
        }
        ResumePoint::Update(update) => {
            let epoch = epoch_of_update(update, full_updates_per_epoch, drop_last)?;
            (epoch, update, update * batch_size)
        }
        ResumePoint::Sample(sample) => {
            ensure_config!(
                sample % batch_size == 0,
                "Resume sample {} is not a multiple of batch_size {}",
                sample,
                batch_size
            );
            let update = sample / batch_size;
            let epoch = epoch_of_update(update, full_updates_per_epoch, drop_last)?;
            (epoch, update, sample)
        }
    };
    Ok(ScheduleState {
        epoch,
        update,
        sample,
        sample_at_last_update: sample,
        ..ScheduleState::default()
    })
}

fn epoch_of_update(update: usize, updates_per_epoch: usize, drop_last: bool) -> Result<usize> {
    if !drop_last || update % updates_per_epoch != 0 {
        return Err(SamplingError::unsupported(format!(
            "resuming from update {} would require skipping forward in the main sampler \
             ({} updates per epoch, drop_last={})",
            update, updates_per_epoch, drop_last
        ))
        .into());
    }
    Ok(update / updates_per_epoch)
}

/// An auxiliary pass in progress.
struct AuxPass<'a> {
    indices: Box<dyn Iterator<Item = usize> + Send + 'a>,
    offset: usize,
    len: usize,
    emitted: usize,
}

/// Iterator over `(is_batch_boundary, global_index)`.
///
/// Pull-based and single-threaded; dropping it cancels the iteration.
pub struct InterleavedIter<'a> {
    sampler: &'a InterleavedSampler,
    state: ScheduleState,
    main: Option<Box<dyn Iterator<Item = usize> + Send + 'a>>,
    pending: VecDeque<usize>,
    aux: Option<AuxPass<'a>>,
    stop_after_aux: bool,
    finished: bool,
}

impl<'a> InterleavedIter<'a> {
    /// Current counters, e.g. for checkpointing.
    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Advances the counters after a main batch boundary and queues the
    /// auxiliary passes whose trigger fires.
    fn finish_update(&mut self, epoch_ended: bool) {
        let sampler = self.sampler;
        self.state.sample_in_update = 0;
        self.state.update += 1;
        if epoch_ended {
            self.state.epoch += 1;
            self.state.sample_in_epoch = 0;
        }

        for (i, config) in sampler.configs.iter().enumerate() {
            if config.trigger.fires(&self.state, epoch_ended) {
                log::debug!(
                    "Interleaved config {} ({:?}) fires at epoch={} update={} sample={}",
                    i,
                    config.trigger,
                    self.state.epoch,
                    self.state.update,
                    self.state.sample
                );
                self.pending.push_back(i);
            }
        }
        self.state.sample_at_last_update = self.state.sample;

        if sampler.stop.is_some_and(|stop| stop.reached(&self.state)) {
            self.stop_after_aux = true;
        }
        if epoch_ended {
            self.main = None;
        }
    }

    fn next_aux(&mut self) -> Option<(bool, usize)> {
        let aux = self.aux.as_mut()?;
        match aux.indices.next() {
            Some(local) => {
                aux.emitted += 1;
                let boundary =
                    aux.emitted % self.sampler.batch_size == 0 || aux.emitted == aux.len;
                Some((boundary, aux.offset + local))
            }
            None => {
                self.aux = None;
                None
            }
        }
    }
}

impl Iterator for InterleavedIter<'_> {
    type Item = (bool, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let sampler = self.sampler;
        loop {
            if self.finished {
                return None;
            }
            if let Some(item) = self.next_aux() {
                return Some(item);
            }
            if let Some(i) = self.pending.pop_front() {
                let config = &sampler.configs[i];
                self.aux = Some(AuxPass {
                    indices: config.sampler.iter(self.state.epoch),
                    offset: sampler.index_offsets[i],
                    len: config.sampler.len(),
                    emitted: 0,
                });
                continue;
            }
            if self.stop_after_aux {
                self.finished = true;
                return None;
            }

            let main = self
                .main
                .get_or_insert_with(|| sampler.main_sampler.iter(self.state.epoch));
            let Some(index) = main.next() else {
                log::warn!(
                    "Main sampler was exhausted after {} of {} samples in epoch {}, stopping",
                    self.state.sample_in_epoch,
                    sampler.samples_per_epoch,
                    self.state.epoch
                );
                self.finished = true;
                return None;
            };

            self.state.sample += 1;
            self.state.sample_in_epoch += 1;
            self.state.sample_in_update += 1;
            let epoch_ended = self.state.sample_in_epoch == sampler.samples_per_epoch;
            let boundary = self.state.sample_in_update == sampler.batch_size || epoch_ended;
            if boundary {
                self.finish_update(epoch_ended);
            }
            return Some((boundary, index));
        }
    }
}

/// Batch view over an [`InterleavedSampler`].
///
/// The total number of batches depends on the trigger and stop settings, so
/// `len` is not supported.
#[derive(Debug, Clone, Copy)]
pub struct InterleavedBatchSampler<'a> {
    sampler: &'a InterleavedSampler,
}

impl<'a> InterleavedBatchSampler<'a> {
    pub fn iter(&self) -> InterleavedBatches<'a> {
        InterleavedBatches {
            inner: self.sampler.iter(),
            done: false,
        }
    }

    pub fn len(&self) -> Result<usize> {
        Err(SamplingError::unsupported("InterleavedBatchSampler has no defined length").into())
    }
}

impl<'a> IntoIterator for InterleavedBatchSampler<'a> {
    type Item = Result<Vec<usize>>;
    type IntoIter = InterleavedBatches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Yields one `Vec` of global indices per batch.
pub struct InterleavedBatches<'a> {
    inner: InterleavedIter<'a>,
    done: bool,
}

impl InterleavedBatches<'_> {
    pub fn state(&self) -> ScheduleState {
        self.inner.state()
    }
}

impl Iterator for InterleavedBatches<'_> {
    type Item = Result<Vec<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.inner.sampler.batch_size);
        for (boundary, index) in self.inner.by_ref() {
            batch.push(index);
            if boundary {
                return Some(Ok(batch));
            }
        }
        self.done = true;
        if batch.is_empty() {
            None
        } else {
            Some(Err(SamplingError::invariant(format!(
                "stream ended with {} buffered indices that do not form a batch",
                batch.len()
            ))
            .into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::sampling_error;
    use crate::sampler::SequentialSampler;

    fn seq(n: usize) -> SequentialSampler {
        SequentialSampler::new(n)
    }

    fn batches(sampler: &InterleavedSampler) -> Vec<Vec<usize>> {
        sampler
            .batches()
            .iter()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn config_error(result: Result<InterleavedSampler>) -> bool {
        matches!(
            result.as_ref().err().and_then(sampling_error),
            Some(SamplingError::Configuration(_))
        )
    }

    mod trigger_tests {
        use super::*;

        fn state(epoch: usize, update: usize, sample: usize, last: usize) -> ScheduleState {
            ScheduleState {
                epoch,
                update,
                sample,
                sample_at_last_update: last,
                ..ScheduleState::default()
            }
        }

        #[test]
        fn every_n_epochs_requires_epoch_end() {
            let trigger = Trigger::EveryNEpochs(2);
            assert!(trigger.fires(&state(2, 6, 12, 10), true));
            assert!(!trigger.fires(&state(2, 6, 12, 10), false));
            assert!(!trigger.fires(&state(3, 9, 18, 16), true));
        }

        #[test]
        fn every_n_samples_fires_once_when_crossing() {
            let trigger = Trigger::EveryNSamples(4);
            assert!(trigger.fires(&state(0, 2, 4, 2), false));
            assert!(trigger.fires(&state(0, 3, 6, 3), false));
            assert!(!trigger.fires(&state(0, 3, 7, 5), false));
        }
    }

    mod stream_tests {
        use super::*;

        #[test]
        fn main_only_drops_last_partial_batch() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(5), 2)
                .stop(StopCondition::Epochs(2))
                .build()?;
            assert_eq!(
                batches(&sampler),
                vec![vec![0, 1], vec![2, 3], vec![0, 1], vec![2, 3]]
            );
            Ok(())
        }

        #[test]
        fn keeps_short_batch_without_drop_last() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(5), 2)
                .drop_last(false)
                .stop(StopCondition::Epochs(1))
                .build()?;
            assert_eq!(batches(&sampler), vec![vec![0, 1], vec![2, 3], vec![4]]);
            Ok(())
        }

        #[test]
        fn aux_pass_uses_offset_and_batching() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(4), 2)
                .interleave(InterleavedConfig::new(seq(5), Trigger::EveryNEpochs(1)))
                .stop(StopCondition::Epochs(1))
                .build()?;
            assert_eq!(sampler.index_offsets(), &[4]);
            let stream: Vec<_> = sampler.iter().collect();
            assert_eq!(
                stream,
                vec![
                    (false, 0),
                    (true, 1),
                    (false, 2),
                    (true, 3),
                    (false, 4),
                    (true, 5),
                    (false, 6),
                    (true, 7),
                    (true, 8),
                ]
            );
            Ok(())
        }

        #[test]
        fn stop_after_updates() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(10), 3)
                .interleave(InterleavedConfig::new(seq(2), Trigger::EveryNUpdates(2)))
                .stop(StopCondition::Updates(4))
                .build()?;
            assert_eq!(
                batches(&sampler),
                vec![
                    vec![0, 1, 2],
                    vec![3, 4, 5],
                    vec![10, 11],
                    vec![6, 7, 8],
                    vec![0, 1, 2],
                    vec![10, 11],
                ]
            );
            Ok(())
        }

        #[test]
        fn state_tracks_progress() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(4), 2).build()?;
            let mut iter = sampler.iter();
            iter.by_ref().take(4).for_each(drop);
            assert_eq!(
                iter.state(),
                ScheduleState {
                    epoch: 1,
                    update: 2,
                    sample: 4,
                    sample_in_update: 0,
                    sample_in_epoch: 0,
                    sample_at_last_update: 4,
                }
            );

            iter.next();
            let state = iter.state();
            assert_eq!(state.epoch, 1);
            assert_eq!(state.update, 2);
            assert_eq!(state.sample, 5);
            assert_eq!(state.sample_in_epoch, 1);
            assert_eq!(state.sample_in_update, 1);
            assert_eq!(state.sample_at_last_update, 4);
            Ok(())
        }

        #[test]
        fn leftover_indices_violate_invariant() -> Result<()> {
            struct ShortSampler;
            impl Sampler for ShortSampler {
                type Item = usize;
                fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
                    Box::new(0..3)
                }
                fn len(&self) -> usize {
                    4
                }
                fn dataset_size(&self) -> usize {
                    4
                }
            }

            let sampler = InterleavedSampler::builder(ShortSampler, 2).build()?;
            let results: Vec<_> = sampler.batches().iter().collect();
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].as_ref().unwrap(), &vec![0, 1]);
            let err = results[1].as_ref().unwrap_err();
            assert!(matches!(
                sampling_error(err),
                Some(SamplingError::InvariantViolation(_))
            ));
            Ok(())
        }

        #[test]
        fn batch_view_has_no_length() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(4), 2).build()?;
            let err = sampler.batches().len().unwrap_err();
            assert!(matches!(
                sampling_error(&err),
                Some(SamplingError::Unsupported(_))
            ));
            Ok(())
        }
    }

    mod construction_tests {
        use super::*;

        #[test]
        fn rejects_invalid_arguments() {
            assert!(config_error(InterleavedSampler::builder(seq(4), 0).build()));
            assert!(config_error(InterleavedSampler::builder(seq(4), 5).build()));
            assert!(config_error(
                InterleavedSampler::builder(seq(4), 2)
                    .stop(StopCondition::Samples(0))
                    .build()
            ));
            assert!(config_error(
                InterleavedSampler::builder(seq(4), 2)
                    .interleave(InterleavedConfig::new(seq(3), Trigger::EveryNUpdates(0)))
                    .build()
            ));
            assert!(config_error(
                InterleavedSampler::builder(seq(4), 2)
                    .interleave(InterleavedConfig::new(seq(0), Trigger::EveryNEpochs(1)))
                    .build()
            ));
            assert!(config_error(
                InterleavedSampler::builder(seq(4), 2)
                    .resume(ResumePoint::Sample(3))
                    .build()
            ));
        }

        #[test]
        fn resume_translation() -> Result<()> {
            let start = |resume: ResumePoint| {
                InterleavedSampler::builder(seq(10), 3)
                    .resume(resume)
                    .build()
                    .map(|s| s.start_state())
            };
            let from_epoch = start(ResumePoint::Epoch(2))?;
            assert_eq!((from_epoch.epoch, from_epoch.update, from_epoch.sample), (2, 6, 18));
            assert_eq!(from_epoch.sample_at_last_update, 18);
            assert_eq!(start(ResumePoint::Update(6))?, from_epoch);
            assert_eq!(start(ResumePoint::Sample(18))?, from_epoch);

            for resume in [ResumePoint::Update(4), ResumePoint::Sample(12)] {
                let err = start(resume).unwrap_err();
                assert!(matches!(
                    sampling_error(&err),
                    Some(SamplingError::Unsupported(_))
                ));
            }
            Ok(())
        }

        #[test]
        fn resume_epoch_without_drop_last_counts_short_batch() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(10), 3)
                .drop_last(false)
                .resume(ResumePoint::Epoch(2))
                .build()?;
            let state = sampler.start_state();
            assert_eq!((state.epoch, state.update, state.sample), (2, 8, 20));

            let err = InterleavedSampler::builder(seq(10), 3)
                .drop_last(false)
                .resume(ResumePoint::Update(3))
                .build()
                .unwrap_err();
            assert!(matches!(
                sampling_error(&err),
                Some(SamplingError::Unsupported(_))
            ));
            Ok(())
        }

        #[test]
        fn resume_past_stop_yields_nothing() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(4), 2)
                .stop(StopCondition::Epochs(2))
                .resume(ResumePoint::Epoch(2))
                .build()?;
            assert_eq!(sampler.iter().count(), 0);
            Ok(())
        }

        #[test]
        fn dataset_sizes_and_offsets() -> Result<()> {
            let sampler = InterleavedSampler::builder(seq(4), 2)
                .interleave(InterleavedConfig::new(seq(2), Trigger::EveryNEpochs(1)))
                .interleave(InterleavedConfig::new(seq(3), Trigger::EveryNUpdates(1)))
                .build()?;
            assert_eq!(sampler.dataset_sizes(), vec![4, 2, 3]);
            assert_eq!(sampler.index_offsets(), &[4, 6]);
            Ok(())
        }
    }
}
