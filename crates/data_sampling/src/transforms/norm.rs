//! Image normalization with exact inverses.
//!
//! Both transforms expect float tensors. [`ImageRangeNorm`] works on any
//! shape; [`Normalize`] expects `[C, H, W]`.

use super::Transform;
use anyhow::{ensure, Context, Result};
use tch::Tensor;

/// Maps images from `[0, 1]` to `[-1, 1]`.
///
/// ```text
/// normalize:    y = (x - 0.5) / 0.5
/// denormalize:  x = y * 0.5 + 0.5
/// ```
///
/// `denormalize(apply(x)) == x` holds bit-for-bit whenever `x - 0.5` is
/// exactly representable, e.g. for 8-bit pixel values divided by 256.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRangeNorm;

impl ImageRangeNorm {
    pub fn denormalize(&self, tensor: &Tensor) -> Tensor {
        tensor * 0.5 + 0.5
    }

    /// In-place variant of [`denormalize`](Self::denormalize).
    pub fn denormalize_inplace(&self, tensor: &mut Tensor) {
        *tensor *= 0.5;
        *tensor += 0.5;
    }
}

impl Transform<Tensor, Tensor> for ImageRangeNorm {
    fn apply(&self, tensor: Tensor) -> Result<Tensor> {
        ensure!(
            tensor.is_floating_point(),
            "ImageRangeNorm expects a floating point tensor, got {:?}",
            tensor.kind()
        );
        Ok((tensor - 0.5) / 0.5)
    }
}

/// Per-channel standardization of `[C, H, W]` tensors.
///
/// ```text
/// output[c, h, w] = (input[c, h, w] - mean[c]) / std[c]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self> {
        ensure!(!mean.is_empty(), "Normalization mean cannot be empty");
        ensure!(
            mean.len() == std.len(),
            "mean has {} channels but std has {}",
            mean.len(),
            std.len()
        );
        ensure!(
            std.iter().all(|&s| s > 0.0),
            "Normalization std must be positive, got {:?}",
            std
        );
        Ok(Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    pub fn imagenet() -> Self {
        Self {
            mean: vec![0.485, 0.456, 0.406],
            std: vec![0.229, 0.224, 0.225],
        }
    }

    pub fn cifar10() -> Self {
        Self {
            mean: vec![0.4914, 0.4822, 0.4465],
            std: vec![0.247, 0.243, 0.261],
        }
    }

    pub fn cifar100() -> Self {
        Self {
            mean: vec![0.5071, 0.4867, 0.4408],
            std: vec![0.2675, 0.2565, 0.2761],
        }
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    /// `(mean, std)` reshaped to `[C, 1, 1]` in the kind of `tensor`.
    fn statistics(&self, tensor: &Tensor) -> Result<(Tensor, Tensor)> {
        let (channels, _, _) = tensor
            .size3()
            .context("Input must be a 3D tensor [C, H, W]")?;
        ensure!(
            channels as usize == self.mean.len(),
            "Channel count mismatch: input has {} channels but normalization expects {}",
            channels,
            self.mean.len()
        );
        let shape = [channels, 1, 1];
        Ok((
            Tensor::from_slice(&self.mean)
                .reshape(&shape)
                .to_kind(tensor.kind()),
            Tensor::from_slice(&self.std)
                .reshape(&shape)
                .to_kind(tensor.kind()),
        ))
    }

    /// `input = output * std + mean`
    pub fn denormalize(&self, tensor: &Tensor) -> Result<Tensor> {
        let (mean, std) = self.statistics(tensor)?;
        Ok(tensor * std + mean)
    }
}

impl Transform<Tensor, Tensor> for Normalize {
    fn apply(&self, tensor: Tensor) -> Result<Tensor> {
        let (mean, std) = self.statistics(&tensor)?;
        Ok((tensor - mean) / std)
    }
}
