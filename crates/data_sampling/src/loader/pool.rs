//! Worker pool with deterministic task routing.
//!
//! Every worker owns a bounded task channel, and the caller decides which
//! worker receives a task. All workers share one bounded output channel.
//! Dropping the pool closes the task channels, raises the shutdown flag and
//! joins the threads.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::rng::WORKER_ID;

pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn(worker_id, tasks, outputs, shutdown)`.
    ///
    /// Each task channel holds `buffer_size` tasks; the output channel holds
    /// `buffer_size * num_workers` results.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(usize, Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
            ));
        }
        if buffer_size == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
            ));
        }

        let (output_tx, output_rx) = bounded(buffer_size * num_workers);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);
        let mut task_txs = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded(buffer_size);
            task_txs.push(task_tx);

            let output_tx = output_tx.clone();
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();
            let handle = thread::Builder::new()
                .name(format!("interleaved-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
                    log::debug!("Worker {} started", worker_id);
                    worker_fn(worker_id, task_rx, output_tx, shutdown);
                    log::debug!("Worker {} stopped", worker_id);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_txs,
            output_rx,
            shutdown,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.task_txs.len()
    }

    pub(crate) fn send(&self, worker_id: usize, task: Task) -> Result<()> {
        let tx = self
            .task_txs
            .get(worker_id)
            .ok_or_else(|| anyhow!("No worker with id {}", worker_id))?;
        tx.send(task)
            .map_err(|_| anyhow!("Worker {} is no longer accepting tasks", worker_id))
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Output> {
        self.output_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => anyhow!("No result from workers within {:?}", timeout),
            RecvTimeoutError::Disconnected => anyhow!("All workers have exited"),
        })
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_txs.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_pool(num_workers: usize) -> Result<WorkerPool<u32, (usize, u32)>> {
        WorkerPool::<u32, (usize, u32)>::new(num_workers, 2, |worker_id, tasks, outputs, shutdown| {
            while !shutdown.load(Ordering::Relaxed) {
                match tasks.recv_timeout(Duration::from_millis(10)) {
                    Ok(task) => {
                        let me = WORKER_ID.with(|id| *id.borrow());
                        assert_eq!(me, worker_id);
                        if outputs.send((worker_id, task * 2)).is_err() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    }

    #[test]
    fn routes_tasks_to_the_chosen_worker() -> Result<()> {
        let pool = echo_pool(3)?;
        assert_eq!(pool.num_workers(), 3);
        pool.send(2, 21)?;
        assert_eq!(pool.recv_timeout(Duration::from_secs(5))?, (2, 42));
        pool.send(0, 1)?;
        assert_eq!(pool.recv_timeout(Duration::from_secs(5))?, (0, 2));
        assert!(pool.send(3, 0).is_err());
        Ok(())
    }

    #[test]
    fn rejects_empty_pool_and_times_out() -> Result<()> {
        assert!(echo_pool(0).is_err());
        let pool = echo_pool(1)?;
        assert!(pool.recv_timeout(Duration::from_millis(20)).is_err());
        Ok(())
    }
}
