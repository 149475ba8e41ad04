use crate::error::{ensure_config, SamplingError};
use anyhow::{Context, Result};
use bytemuck::{pod_read_unaligned, try_cast_slice, Pod};
use safetensors::{
    tensor::{Dtype, TensorView},
    SafeTensors,
};
use std::{fs, path::PathBuf};

/// Reads named tensors from a safetensors file as `f32` values.
///
/// ```ignore
/// let source = SafetensorsSource::new("pseudo_labels.safetensors");
/// let (shape, values) = source.load_f32("scores")?;
/// ```
#[derive(Debug, Clone)]
pub struct SafetensorsSource {
    path: PathBuf,
}

impl SafetensorsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Vec<u8>> {
        ensure_config!(
            self.path.exists(),
            "'{}' does not exist",
            self.path.display()
        );
        fs::read(&self.path)
            .with_context(|| format!("Failed to read safetensors file: {}", self.path.display()))
    }

    /// Names of all tensors in the file, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let bytes = self.read()?;
        let safetensors = SafeTensors::deserialize(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        let mut names: Vec<String> = safetensors.names().into_iter().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Loads tensor `name` as its shape and row-major `f32` values.
    pub fn load_f32(&self, name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
        let bytes = self.read()?;
        let safetensors = SafeTensors::deserialize(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        let view = safetensors.tensor(name).map_err(|e| {
            SamplingError::configuration(format!(
                "Tensor '{}' not found in {}: {}",
                name,
                self.path.display(),
                e
            ))
        })?;
        let values = f32_values(&view)
            .with_context(|| format!("Failed to convert tensor '{}'", name))?;
        Ok((view.shape().to_vec(), values))
    }
}

fn decode<T: Pod>(raw: &[u8]) -> Vec<T> {
    match try_cast_slice::<u8, T>(raw) {
        Ok(values) => values.to_vec(),
        Err(_) => raw
            .chunks_exact(std::mem::size_of::<T>())
            .map(pod_read_unaligned::<T>)
            .collect(),
    }
}

/// Supported dtypes: U8, I32, I64, F32, F64.
fn f32_values(view: &TensorView<'_>) -> Result<Vec<f32>> {
    let raw = view.data();
    let values = match view.dtype() {
        Dtype::F32 => decode::<f32>(raw),
        Dtype::F64 => decode::<f64>(raw).into_iter().map(|v| v as f32).collect(),
        Dtype::I32 => decode::<i32>(raw).into_iter().map(|v| v as f32).collect(),
        Dtype::I64 => decode::<i64>(raw).into_iter().map(|v| v as f32).collect(),
        Dtype::U8 => raw.iter().map(|&v| v as f32).collect(),
        other => {
            return Err(SamplingError::configuration(format!(
                "Unsupported dtype '{:?}'. Supported dtypes: U8, I32, I64, F32, F64",
                other
            ))
            .into())
        }
    };
    Ok(values)
}
