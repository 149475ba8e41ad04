//! Interleaved multi-dataset sampling for training loops.
//!
//! An [`InterleavedSampler`] walks the main (training) dataset and, on a
//! schedule, splices complete passes over auxiliary datasets into the same
//! index stream. The [`InterleavedLoader`] materializes that stream into
//! collated batches tagged with the dataset they came from.

pub mod collator;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod minibatch;
pub mod pseudo_label;
pub mod readers;
pub mod rng;
pub mod sample;
pub mod sampler;
pub mod transforms;

pub use collator::{Collator, InterleavedCollator, SharedCollator, StackCollator};
pub use dataset::{Dataset, InMemoryDataset, InterleavedDataset, SharedDataset};
pub use error::SamplingError;
pub use loader::{InterleavedLoader, LoaderConfig};
pub use minibatch::{InterleavedBatch, MiniBatch};
pub use pseudo_label::{
    LabelMode, LabelTable, PseudoLabelAssigner, PseudoLabelConfig, PseudoLabelDataset,
};
pub use sample::Sample;
pub use sampler::{
    DistributedSampler, InterleavedConfig, InterleavedSampler, RandomSampler, ResumePoint,
    Sampler, ScheduleState, SemiSampler, SequentialSampler, StopCondition, Trigger,
};
pub use transforms::{ImageRangeNorm, Normalize, Transform};
