use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use tch::{Kind, Tensor};

/// Feature name under which class labels are stored.
pub const CLASS_FEATURE: &str = "class";

/// A single data example: a mapping from feature names (e.g. `"image"`,
/// `"class"`) to tensors.
///
/// Samples are fetched on loader worker threads and handed back to the main
/// thread. A `Sample` owns its tensors and is never mutated concurrently.
#[derive(Debug)]
pub struct Sample {
    pub features: HashMap<String, Tensor>,
}

unsafe impl Send for Sample {}
unsafe impl Sync for Sample {}

/// Shallow clone: the tensors share storage with the original.
impl Clone for Sample {
    fn clone(&self) -> Self {
        Self {
            features: self
                .features
                .iter()
                .map(|(name, tensor)| (name.clone(), tensor.shallow_clone()))
                .collect(),
        }
    }
}

impl Sample {
    pub fn new(features: HashMap<String, Tensor>) -> Self {
        Self { features }
    }

    /// Creates a `Sample` with one feature. Chain [`with_feature`](Self::with_feature)
    /// to add more.
    pub fn from_single(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            features: HashMap::from([(name.into(), tensor)]),
        }
    }

    /// Adds or overwrites a feature.
    pub fn with_feature(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.features.insert(name.into(), tensor);
        self
    }

    /// Adds or overwrites the class label as an `Int64` tensor of shape `[1]`.
    pub fn with_class(self, class: i64) -> Self {
        self.with_feature(CLASS_FEATURE, Tensor::from_slice(&[class]))
    }

    pub fn get(&self, feature: &str) -> Result<&Tensor> {
        self.features
            .get(feature)
            .ok_or_else(|| anyhow!("Feature {} not found", feature))
    }

    /// Reads the class label written by [`with_class`](Self::with_class).
    pub fn class(&self) -> Result<i64> {
        let tensor = self.get(CLASS_FEATURE)?;
        let values: Vec<i64> = tensor
            .to_kind(Kind::Int64)
            .flatten(0, -1)
            .try_into()
            .context("Class feature is not convertible to i64")?;
        match values.as_slice() {
            [class] => Ok(*class),
            other => Err(anyhow!(
                "Class feature must hold exactly one value, but holds {}",
                other.len()
            )),
        }
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod sample_tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn builds_and_reads_features() -> Result<()> {
        let image = Tensor::zeros(&[3, 2, 2], (Kind::Float, Device::Cpu));
        let sample = Sample::from_single("image", image).with_class(7);

        assert_eq!(sample.get("image")?.size(), &[3, 2, 2]);
        assert_eq!(sample.class()?, 7);
        assert!(sample.get("missing").is_err());

        let mut features: Vec<_> = sample.features().collect();
        features.sort_unstable();
        assert_eq!(features, vec!["class", "image"]);
        Ok(())
    }

    #[test]
    fn class_requires_a_single_value() {
        let sample = Sample::from_single(CLASS_FEATURE, Tensor::from_slice(&[1i64, 2]));
        assert!(sample.class().is_err());
        assert!(Sample::from_single("x", Tensor::from_slice(&[1i64])).class().is_err());
    }

    #[test]
    fn clone_shares_storage() -> Result<()> {
        let sample = Sample::from_single("x", Tensor::from_slice(&[1.0f32, 2.0]));
        let cloned = sample.clone();
        assert_eq!(cloned.get("x")?.data_ptr(), sample.get("x")?.data_ptr());
        Ok(())
    }
}
