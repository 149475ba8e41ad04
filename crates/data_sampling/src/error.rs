//! src/error.rs
//!
//! Error taxonomy for the sampling subsystem.
//!
//! Public APIs return `anyhow::Result`. Failures that callers may want to
//! tell apart are raised as a [`SamplingError`] inside the `anyhow::Error`:
//!
//! ```ignore
//! match InterleavedSampler::builder(sampler, 0).build() {
//!     Err(e) if matches!(e.downcast_ref(), Some(SamplingError::Configuration(_))) => { ... }
//!     _ => { ... }
//! }
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplingError {
    /// Invalid constructor arguments. Raised at construction, never during iteration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request is well-formed but not supported (e.g. resuming mid-epoch).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An internal assertion failed while iterating.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SamplingError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

/// Like `anyhow::ensure!`, but the error is a [`SamplingError::Configuration`].
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(anyhow::Error::new($crate::error::SamplingError::configuration(
                format!($($arg)+),
            )));
        }
    };
}

pub(crate) use ensure_config;

/// Returns the [`SamplingError`] carried by `error`, if any.
pub fn sampling_error(error: &anyhow::Error) -> Option<&SamplingError> {
    error.downcast_ref::<SamplingError>()
}
