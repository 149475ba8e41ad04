//! Thread-local worker identity and random number generator.
//!
//! Loader workers seed their generator from `(base_seed, worker_id, epoch)`
//! when they start, so stochastic code running inside a worker (pseudo-label
//! sampling without a fixed seed) is reproducible. Outside a worker the
//! helpers fall back to the thread RNG.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::cell::RefCell;

thread_local! {
    /// Index of the loader worker running on this thread (0 on the main thread).
    pub static WORKER_ID: RefCell<usize> = const { RefCell::new(0) };

    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// `base_seed + (epoch << 32) + worker_id`
pub fn worker_seed(worker_id: usize, epoch: usize, base_seed: u64) -> u64 {
    base_seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(worker_id as u64)
}

/// Seeds this thread's worker RNG and records `worker_id`.
pub fn init_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) {
    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
    WORKER_RNG.with(|rng| {
        *rng.borrow_mut() = Some(StdRng::seed_from_u64(worker_seed(
            worker_id, epoch, base_seed,
        )));
    })
}

/// Removes the worker RNG so the thread falls back to `rand::rng()`.
pub fn clear_worker_rng() {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = None);
}

/// Runs `f` with the worker RNG, or with the thread RNG outside a worker.
pub fn with_worker_rng<R>(f: impl FnOnce(&mut dyn RngCore) -> R) -> R {
    WORKER_RNG.with(|rng| match rng.borrow_mut().as_mut() {
        Some(rng) => f(rng),
        None => f(&mut rand::rng()),
    })
}
