//! # Worker Pool Module
//!
//! A fixed set of OS threads that run blocking handler invocations off the
//! scheduling loop.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: at most `num_workers` jobs run at once; excess
//!   submissions wait in the queue
//! - **Shared Queue**: one `std::sync::mpsc` channel whose receiver is shared by
//!   all workers behind a mutex, so idle workers pick up jobs in FIFO order
//! - **Panic Containment**: a panicking job never takes its worker down
//! - **Metrics**: queue depth, active jobs, dispatch/completion/panic counts
//!
//! ## Configuration
//!
//! - `SAGEMAKER_INFERENCE_WORKERS`: number of worker threads
//!   (default: `min(32, cpus + 4)`)

use crate::environment::Environment;
use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound on the default pool size
pub const MAX_DEFAULT_WORKERS: usize = 32;

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Name prefix for worker threads
    pub thread_name: String,
}

impl WorkerPoolConfig {
    /// Create a configuration with `num_workers` threads (at least one)
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            thread_name: "brrtserve-worker".to_string(),
        }
    }

    /// Pool sized by the resolved environment
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self::new(env.workers)
    }

    /// `min(32, cpus + 4)`
    #[must_use]
    pub fn default_workers() -> usize {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus + 4).min(MAX_DEFAULT_WORKERS)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(Self::default_workers())
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Jobs submitted but not yet picked up by a worker
    pub queue_depth: AtomicUsize,
    /// Jobs currently running
    pub active: AtomicUsize,
    /// Total jobs submitted
    pub dispatched_count: AtomicU64,
    /// Total jobs finished, including panicked ones
    pub completed_count: AtomicU64,
    /// Total jobs that panicked
    pub panicked_count: AtomicU64,
}

impl WorkerPoolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.dispatched_count.fetch_sub(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_start(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self, panicked: bool) {
        if panicked {
            self.panicked_count.fetch_add(1, Ordering::Relaxed);
        }
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current queue depth
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Get number of running jobs
    pub fn get_active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Get total dispatched count
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    /// Get total completed count
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    /// Get total panicked count
    pub fn get_panicked_count(&self) -> u64 {
        self.panicked_count.load(Ordering::Relaxed)
    }
}

/// Returned by [`WorkerPool::submit`] once the pool has shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("worker pool is shut down")
    }
}

impl std::error::Error for PoolClosed {}

/// A fixed-size pool of OS threads fed by one FIFO queue
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// `None` once shut down
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    /// Spawn the pool's threads.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned. Threads spawned
    /// before the failure are shut down.
    pub fn new(config: WorkerPoolConfig) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let metrics = Arc::new(WorkerPoolMetrics::new());

        info!(
            num_workers = config.num_workers,
            thread_name = %config.thread_name,
            "Creating worker pool"
        );

        let pool = Self {
            config,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(Vec::new()),
            metrics,
        };

        for worker_id in 0..pool.config.num_workers {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&pool.metrics);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", pool.config.thread_name, worker_id))
                .spawn(move || worker_loop(worker_id, &rx, &metrics));

            match spawned {
                Ok(handle) => pool
                    .workers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle),
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to spawn worker thread");
                    // Dropping `pool` shuts down the workers spawned so far
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Queue `job` for execution on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`PoolClosed`] if the pool has been shut down.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(PoolClosed);
        };

        self.metrics.record_dispatch();
        if sender.send(Box::new(job)).is_err() {
            self.metrics.record_rejected();
            error!("Worker pool channel disconnected");
            return Err(PoolClosed);
        }
        Ok(())
    }

    /// Stop accepting work and wait for queued jobs to finish.
    ///
    /// Idempotent. Must not be called from a worker thread.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }
        info!(
            completed = self.metrics.get_completed_count(),
            "Worker pool shut down"
        );
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Get metrics for this worker pool
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    /// Get configuration for this worker pool
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, rx: &Mutex<Receiver<Job>>, metrics: &WorkerPoolMetrics) {
    debug!(worker_id, "Worker thread started");
    loop {
        // The lock is released before the job runs
        let job = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = job else {
            break;
        };

        metrics.record_start();
        let panicked = catch_unwind(AssertUnwindSafe(job)).is_err();
        if panicked {
            error!(worker_id, "Job panicked on worker thread");
        }
        metrics.record_completion(panicked);
    }
    debug!(worker_id, "Worker thread exiting");
}
