pub mod core;
pub mod norm;

pub use core::{Chain, Transform};
pub use norm::{ImageRangeNorm, Normalize};

use crate::sample::Sample;
use anyhow::{anyhow, Context, Result};
use tch::Tensor;

/// Applies a tensor transform to one feature of a [`Sample`], leaving the
/// other features untouched.
///
/// ```ignore
/// let to_model_range = OnFeature::new("image", ImageRangeNorm);
/// let sample = to_model_range.apply(sample)?;
/// ```
#[derive(Debug)]
pub struct OnFeature<T> {
    feature: String,
    transform: T,
}

impl<T> OnFeature<T> {
    pub fn new(feature: impl Into<String>, transform: T) -> Self {
        Self {
            feature: feature.into(),
            transform,
        }
    }
}

impl<T: Transform<Tensor, Tensor>> Transform<Sample, Sample> for OnFeature<T> {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let tensor = sample
            .features
            .remove(&self.feature)
            .ok_or_else(|| anyhow!("Feature {} not found", self.feature))?;
        let tensor = self
            .transform
            .apply(tensor)
            .with_context(|| format!("Failed to transform feature '{}'", self.feature))?;
        Ok(sample.with_feature(self.feature.clone(), tensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn transforms_only_the_named_feature() -> Result<()> {
        let image = Tensor::ones(&[3, 2, 2], (Kind::Float, Device::Cpu));
        let sample = Sample::from_single("image", image).with_class(4);

        let pipeline = OnFeature::new("image", ImageRangeNorm)
            .then(OnFeature::new("image", Normalize::new(&[1.0; 3], &[2.0; 3])?));
        let out = pipeline.apply(sample)?;

        assert_eq!(out.class()?, 4);
        let image = out.get("image")?;
        assert_eq!(image.size(), vec![3, 2, 2]);
        assert_eq!(image.mean(Kind::Float).double_value(&[]), 0.0);
        Ok(())
    }

    #[test]
    fn missing_feature_is_an_error() {
        let sample = Sample::from_single("text", Tensor::from_slice(&[1i64]));
        assert!(OnFeature::new("image", ImageRangeNorm).apply(sample).is_err());
    }
}
