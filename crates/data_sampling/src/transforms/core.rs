use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A stateless conversion from `I` to `O`, run on loader worker threads.
///
/// Stages compose with [`then`](Transform::then); the output type of one stage
/// must be the input type of the next.
///
/// ```ignore
/// let pipeline = OnFeature::new("image", ImageRangeNorm)
///     .then(OnFeature::new("image", Normalize::cifar10()));
/// ```
pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: I) -> Result<O>;

    fn then<T, P>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, P>,
        O: Send,
    {
        Chain::new(self, next)
    }
}

/// Two transforms run back to back. `M` is the intermediate type.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _intermediate: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _intermediate: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        let mid = self
            .first
            .apply(input)
            .with_context(|| format!("{} failed", std::any::type_name::<A>()))?;
        self.second.apply(mid).with_context(|| {
            format!(
                "{} failed on the output of {}",
                std::any::type_name::<B>(),
                std::any::type_name::<A>()
            )
        })
    }
}
