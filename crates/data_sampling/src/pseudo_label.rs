//! Pseudo-label assignment from a precomputed label table.
//!
//! A [`LabelTable`] holds either one hard label per sample (1-D) or one score
//! row per sample (2-D, e.g. logits or probabilities of a pretrained model). The
//! [`PseudoLabelAssigner`] turns a row into a class label according to the
//! options in [`PseudoLabelConfig`]:
//!
//! ```text
//! table  threshold  topk  label
//! 1-D    -          -     stored value
//! 2-D    -          -     argmax
//! 2-D    t          -     argmax if softmax(row)[argmax] > t, else -1
//! 2-D    -          k     draw among the k best scores
//! ```

use crate::dataset::Dataset;
use crate::error::{ensure_config, SamplingError};
use crate::readers::SafetensorsSource;
use crate::rng::with_worker_rng;
use crate::sample::Sample;
use anyhow::{anyhow, Context, Result};
use rand::distr::{weighted::WeightedIndex, Distribution};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label emitted when a thresholded prediction is not confident enough.
pub const IGNORE_LABEL: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
enum Values {
    Hard(Vec<f32>),
    Scores { values: Vec<f32>, num_columns: usize },
}

/// One row per dataset sample, read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    values: Values,
}

impl LabelTable {
    pub fn hard(labels: Vec<f32>) -> Self {
        Self {
            values: Values::Hard(labels),
        }
    }

    /// Row-major scores with `num_columns` columns. A single column is the
    /// same as a 1-D table.
    pub fn scores(values: Vec<f32>, num_columns: usize) -> Result<Self> {
        ensure_config!(num_columns > 0, "Score table needs at least one column");
        ensure_config!(
            values.len() % num_columns == 0,
            "{} values do not fill rows of {} columns",
            values.len(),
            num_columns
        );
        if num_columns == 1 {
            return Ok(Self::hard(values));
        }
        Ok(Self {
            values: Values::Scores {
                values,
                num_columns,
            },
        })
    }

    pub fn from_shape(shape: &[usize], values: Vec<f32>) -> Result<Self> {
        match *shape {
            [len] => {
                ensure_config!(
                    values.len() == len,
                    "Shape {:?} does not match {} values",
                    shape,
                    values.len()
                );
                Ok(Self::hard(values))
            }
            [rows, columns] => {
                ensure_config!(
                    values.len() == rows * columns,
                    "Shape {:?} does not match {} values",
                    shape,
                    values.len()
                );
                Self::scores(values, columns)
            }
            _ => Err(SamplingError::configuration(format!(
                "Pseudo labels must be 1-D or 2-D, but got shape {:?}",
                shape
            ))
            .into()),
        }
    }

    /// Loads tensor `name` from a safetensors file.
    pub fn from_safetensors(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = path.as_ref();
        let (shape, values) = SafetensorsSource::new(path).load_f32(name)?;
        Self::from_shape(&shape, values)
            .with_context(|| format!("Invalid pseudo labels in {}", path.display()))
    }

    pub fn len(&self) -> usize {
        match &self.values {
            Values::Hard(labels) => labels.len(),
            Values::Scores {
                values,
                num_columns,
            } => values.len() / num_columns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for a 1-D table.
    pub fn num_columns(&self) -> Option<usize> {
        match self.values {
            Values::Hard(_) => None,
            Values::Scores { num_columns, .. } => Some(num_columns),
        }
    }

    fn hard_label(&self, index: usize) -> Option<f32> {
        match &self.values {
            Values::Hard(labels) => labels.get(index).copied(),
            Values::Scores { .. } => None,
        }
    }

    fn row(&self, index: usize) -> Option<&[f32]> {
        match &self.values {
            Values::Hard(_) => None,
            Values::Scores {
                values,
                num_columns,
            } => values.chunks_exact(*num_columns).nth(index),
        }
    }
}

/// Options for pseudo-label assignment.
///
/// ```ignore
/// let config = PseudoLabelConfig::builder().topk(5).temperature(0.5).seed(0).build();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoLabelConfig {
    /// Minimum softmax probability of the argmax (2-D tables only).
    pub threshold: Option<f32>,
    /// Sample among the `topk` highest scores instead of taking the argmax.
    pub topk: Option<usize>,
    /// Scores are logits divided by `temperature` before the softmax
    /// (top-k only). `f32::INFINITY` samples uniformly among the top k.
    pub temperature: Option<f32>,
    /// Fixed seed: labels are stable across epochs and workers.
    /// Without it, sampled labels are redrawn on every access.
    pub seed: Option<u64>,
    /// Splits the class space into `splits` copies (1 = no splitting).
    pub splits: usize,
}

impl Default for PseudoLabelConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            topk: None,
            temperature: None,
            seed: None,
            splits: 1,
        }
    }
}

impl PseudoLabelConfig {
    pub fn builder() -> PseudoLabelConfigBuilder {
        PseudoLabelConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct PseudoLabelConfigBuilder {
    config: PseudoLabelConfig,
}

impl PseudoLabelConfigBuilder {
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.config.threshold = Some(threshold);
        self
    }

    pub fn topk(mut self, topk: usize) -> Self {
        self.config.topk = Some(topk);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn splits(mut self, splits: usize) -> Self {
        self.config.splits = splits;
        self
    }

    pub fn build(self) -> PseudoLabelConfig {
        self.config
    }
}

/// How a row becomes a label. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LabelMode {
    /// 1-D table: the stored value, truncated to an integer.
    Stored,
    /// 2-D table: index of the first maximum.
    Argmax,
    /// 2-D table: argmax if its softmax probability exceeds the threshold.
    Threshold(f32),
    /// 2-D table: one draw among the `k` best columns.
    TopK { k: usize, temperature: Option<f32> },
}

/// Derives per-sample class labels from a [`LabelTable`].
#[derive(Debug, Clone)]
pub struct PseudoLabelAssigner {
    table: LabelTable,
    mode: LabelMode,
    seed: Option<u64>,
    num_classes: usize,
    split_indices: Option<Vec<usize>>,
    splits: usize,
}

impl PseudoLabelAssigner {
    /// `table` must hold one row per dataset sample; a 2-D table's columns
    /// must match the dataset's `num_classes`.
    pub fn new(
        table: LabelTable,
        num_samples: usize,
        num_classes: usize,
        config: &PseudoLabelConfig,
    ) -> Result<Self> {
        ensure_config!(config.splits > 0, "splits must be > 0");
        ensure_config!(
            table.len() == num_samples,
            "Pseudo label table has {} rows but the dataset has {} samples",
            table.len(),
            num_samples
        );
        if let Some(columns) = table.num_columns() {
            ensure_config!(
                columns == num_classes,
                "Pseudo label table has {} columns but the dataset has {} classes",
                columns,
                num_classes
            );
        }
        let mode = Self::mode_for(&table, config)?;

        let split_indices = (config.splits > 1).then(|| {
            let mut permutation: Vec<usize> = (0..table.len()).collect();
            match config.seed {
                Some(seed) => permutation.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => with_worker_rng(|rng| permutation.shuffle(rng)),
            }
            permutation
                .into_iter()
                .map(|p| p % config.splits)
                .collect()
        });

        log::info!(
            "PseudoLabelAssigner: {} samples, mode {:?}, {} split(s), seeded={}",
            table.len(),
            mode,
            config.splits,
            config.seed.is_some()
        );
        Ok(Self {
            table,
            mode,
            seed: config.seed,
            num_classes,
            split_indices,
            splits: config.splits,
        })
    }

    /// Loads the table from tensor `tensor_name` of a safetensors file.
    pub fn from_path(
        path: impl AsRef<Path>,
        tensor_name: &str,
        num_samples: usize,
        num_classes: usize,
        config: &PseudoLabelConfig,
    ) -> Result<Self> {
        let table = LabelTable::from_safetensors(path, tensor_name)?;
        Self::new(table, num_samples, num_classes, config)
    }

    fn mode_for(table: &LabelTable, config: &PseudoLabelConfig) -> Result<LabelMode> {
        if let Some(k) = config.topk {
            ensure_config!(
                config.threshold.is_none(),
                "threshold with sampled pseudo labels is not supported"
            );
            let Some(columns) = table.num_columns() else {
                return Err(SamplingError::configuration(
                    "topk requires a 2-D table of scores",
                )
                .into());
            };
            ensure_config!(
                k > 0 && k <= columns,
                "topk must be in [1, {}], but got topk={}",
                columns,
                k
            );
            if let Some(temperature) = config.temperature {
                ensure_config!(
                    temperature > 0.0,
                    "temperature must be > 0, but got temperature={}",
                    temperature
                );
            }
            return Ok(LabelMode::TopK {
                k,
                temperature: config.temperature,
            });
        }

        ensure_config!(
            config.temperature.is_none(),
            "temperature is only used together with topk"
        );
        match (table.num_columns(), config.threshold) {
            (None, None) => Ok(LabelMode::Stored),
            (None, Some(_)) => Err(SamplingError::configuration(
                "provided pseudo labels have no probabilities, a threshold cannot be applied",
            )
            .into()),
            (Some(_), None) => Ok(LabelMode::Argmax),
            (Some(_), Some(threshold)) => Ok(LabelMode::Threshold(threshold)),
        }
    }

    pub fn mode(&self) -> LabelMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Size of the (split) class space.
    pub fn num_classes(&self) -> usize {
        self.splits * self.num_classes
    }

    pub fn splits(&self) -> usize {
        self.splits
    }

    /// Split of sample `index`, 0 without splitting.
    pub fn split_of(&self, index: usize) -> usize {
        self.split_indices
            .as_ref()
            .and_then(|splits| splits.get(index).copied())
            .unwrap_or(0)
    }

    /// Label of sample `index`, drawing from `rng` in stochastic modes.
    ///
    /// With a fixed seed the per-sample generator `seed + index` is used and
    /// `rng` is ignored.
    pub fn label_with<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<i64> {
        ensure_index(index, self.len())?;
        let label = match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                self.raw_label(index, &mut rng)?
            }
            None => self.raw_label(index, rng)?,
        };
        if label == IGNORE_LABEL {
            return Ok(label);
        }
        Ok(label + (self.split_of(index) * self.num_classes) as i64)
    }

    /// Label of sample `index` drawn with the worker RNG.
    pub fn label(&self, index: usize) -> Result<i64> {
        with_worker_rng(|rng| self.label_with(index, rng))
    }

    /// All labels at once. Only defined for unsplit 1-D tables.
    pub fn all_labels(&self) -> Result<Vec<i64>> {
        if self.splits > 1 {
            return Err(SamplingError::unsupported(
                "all_labels is not defined for a split class space",
            )
            .into());
        }
        match &self.table.values {
            Values::Hard(labels) => Ok(labels.iter().map(|&v| v as i64).collect()),
            Values::Scores { .. } => Err(SamplingError::unsupported(
                "all_labels is not defined for a 2-D score table",
            )
            .into()),
        }
    }

    fn raw_label<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<i64> {
        let row = || {
            self.table
                .row(index)
                .ok_or_else(|| anyhow!("Row {} missing from score table", index))
        };
        let label = match self.mode {
            LabelMode::Stored => self
                .table
                .hard_label(index)
                .ok_or_else(|| anyhow!("Label {} missing from label table", index))?
                as i64,
            LabelMode::Argmax => argmax(row()?) as i64,
            LabelMode::Threshold(threshold) => {
                let probs = softmax(row()?);
                let best = argmax(&probs);
                if probs[best] > threshold {
                    best as i64
                } else {
                    IGNORE_LABEL
                }
            }
            LabelMode::TopK { k, temperature } => {
                let top = top_k(row()?, k);
                let choice = match temperature {
                    Some(t) if t.is_infinite() => rng.random_range(0..k),
                    Some(t) => {
                        let scaled: Vec<f32> = top.iter().map(|&(_, s)| s / t).collect();
                        draw(&softmax(&scaled), rng, index)?
                    }
                    None => {
                        let weights: Vec<f32> = top.iter().map(|&(_, s)| s).collect();
                        draw(&weights, rng, index)?
                    }
                };
                top[choice].0 as i64
            }
        };
        Ok(label)
    }
}

fn ensure_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(anyhow!(
            "Index {} out of bounds for pseudo label table of size {}",
            index,
            len
        ));
    }
    Ok(())
}

/// First maximum wins.
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// `(column, score)` of the `k` highest scores, ties by column order.
fn top_k(row: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

/// One single-trial draw proportional to `weights`.
fn draw<R: Rng + ?Sized>(weights: &[f32], rng: &mut R, index: usize) -> Result<usize> {
    let distribution = WeightedIndex::new(weights)
        .with_context(|| format!("Top-k scores of sample {} are not valid weights", index))?;
    Ok(distribution.sample(rng))
}

/// Wraps a dataset and attaches the pseudo label as the `"class"` feature.
pub struct PseudoLabelDataset<D> {
    dataset: D,
    assigner: PseudoLabelAssigner,
}

impl<D: Dataset<Item = Sample>> PseudoLabelDataset<D> {
    pub fn new(dataset: D, assigner: PseudoLabelAssigner) -> Result<Self> {
        ensure_config!(
            dataset.len() == assigner.len(),
            "Dataset has {} samples but the pseudo label table has {} rows",
            dataset.len(),
            assigner.len()
        );
        Ok(Self { dataset, assigner })
    }

    pub fn assigner(&self) -> &PseudoLabelAssigner {
        &self.assigner
    }

    pub fn num_classes(&self) -> usize {
        self.assigner.num_classes()
    }
}

impl<D: Dataset<Item = Sample>> Dataset for PseudoLabelDataset<D> {
    type Item = Sample;

    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let sample = self.dataset.get(index)?;
        let label = self
            .assigner
            .label(index)
            .with_context(|| format!("Failed to assign pseudo label to sample {}", index))?;
        Ok(sample.with_class(label))
    }
}
