use super::{panic_message, InvocationOutcome};
use crate::error::InvocationError;
use crate::handler::{BlockingFn, BoundHandler, InvocationRequest};
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};
use may::sync::mpsc;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Runs a blocking handler on the worker pool
pub struct BlockingOffload {
    // Dropped first: the pool joins its threads before the handler's unit is released
    pool: WorkerPool,
    func: BlockingFn,
    handler: BoundHandler,
}

impl BlockingOffload {
    /// # Errors
    ///
    /// Returns an error if the worker pool threads cannot be spawned.
    pub fn new(handler: BoundHandler, func: BlockingFn, config: WorkerPoolConfig) -> io::Result<Self> {
        Ok(Self {
            pool: WorkerPool::new(config)?,
            func,
            handler,
        })
    }

    pub fn handler(&self) -> &BoundHandler {
        &self.handler
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Submit the call and park the current coroutine until a worker replies.
    pub fn invoke(&self, request: InvocationRequest) -> InvocationOutcome {
        let request_id = request.request_id;
        let func = self.func;
        let (reply_tx, reply_rx) = mpsc::channel::<InvocationOutcome>();

        let submitted = self.pool.submit(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(|| func(request))) {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(InvocationError::Raised(e.to_string())),
                Err(payload) => {
                    let message = panic_message(&*payload);
                    error!(request_id = %request_id, panic_message = %message, "Handler panicked");
                    Err(InvocationError::Panicked(message))
                }
            };
            // The requester only goes away if its coroutine was cancelled
            let _ = reply_tx.send(outcome);
        });

        if submitted.is_err() {
            error!(request_id = %request_id, "Worker pool is shut down");
            return Err(InvocationError::PoolUnavailable);
        }

        debug!(
            request_id = %request_id,
            queue_depth = self.pool.metrics().get_queue_depth(),
            "Waiting for worker reply"
        );
        reply_rx
            .recv()
            .unwrap_or(Err(InvocationError::PoolUnavailable))
    }
}
