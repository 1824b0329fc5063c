//! # Dispatcher Module
//!
//! Runs each invocation through the execution strategy chosen for the bound
//! handler at startup.
//!
//! ## Strategies
//!
//! - [`BlockingOffload`]: blocking handlers run on a [`WorkerPool`](crate::worker_pool::WorkerPool)
//!   thread. The request coroutine parks on a `may` channel until the worker
//!   replies, so the scheduling loop keeps accepting and serving other requests.
//! - [`DirectAwait`]: suspendable handlers are polled on the request coroutine
//!   itself. A pending future parks the coroutine until its waker fires.
//!
//! The strategy is selected exactly once from the handler's [`ExecutionKind`]
//! and never changes afterwards.
//!
//! ## Failure
//!
//! A handler error or panic becomes an [`InvocationError`] for that request
//! only. Nothing escapes into the scheduling loop.

mod direct;
mod offload;

pub use direct::{drive, DirectAwait};
pub use offload::BlockingOffload;

use crate::error::InvocationError;
use crate::handler::{
    classify, BoundHandler, ExecutionKind, HandlerEntry, InvocationRequest, InvocationResponse,
};
use crate::worker_pool::{WorkerPoolConfig, WorkerPoolMetrics};
use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Result of one invocation
pub type InvocationOutcome = Result<InvocationResponse, InvocationError>;

/// Execution strategy for the process's bound handler
pub enum DispatchStrategy {
    BlockingOffload(BlockingOffload),
    DirectAwait(DirectAwait),
}

impl DispatchStrategy {
    /// Select the strategy matching `handler`'s calling convention.
    ///
    /// The worker pool is only created for blocking handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool threads cannot be spawned.
    pub fn for_handler(handler: BoundHandler, pool: WorkerPoolConfig) -> io::Result<Self> {
        let kind = classify(&handler);
        info!(handler = %handler.reference(), kind = %kind, "Classified inference handler");

        let strategy = match handler.entry() {
            HandlerEntry::Blocking(func) => {
                DispatchStrategy::BlockingOffload(BlockingOffload::new(handler, func, pool)?)
            }
            HandlerEntry::Suspendable(func) => {
                DispatchStrategy::DirectAwait(DirectAwait::new(handler, func))
            }
        };
        Ok(strategy)
    }

    /// The execution kind this strategy serves; fixed by the variant
    #[must_use]
    pub fn kind(&self) -> ExecutionKind {
        match self {
            DispatchStrategy::BlockingOffload(_) => ExecutionKind::Blocking,
            DispatchStrategy::DirectAwait(_) => ExecutionKind::Suspendable,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &BoundHandler {
        match self {
            DispatchStrategy::BlockingOffload(s) => s.handler(),
            DispatchStrategy::DirectAwait(s) => s.handler(),
        }
    }

    /// Invoke the handler with `request` and wait for its outcome.
    ///
    /// Called on the request's coroutine.
    pub fn invoke(&self, request: InvocationRequest) -> InvocationOutcome {
        let request_id = request.request_id;
        let kind = self.kind();
        debug!(
            request_id = %request_id,
            kind = %kind,
            body_size_bytes = request.body.len(),
            "Dispatching invocation"
        );

        let start = Instant::now();
        let outcome = match self {
            DispatchStrategy::BlockingOffload(s) => s.invoke(request),
            DispatchStrategy::DirectAwait(s) => s.invoke(request),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(response) => info!(
                request_id = %request_id,
                kind = %kind,
                latency_ms,
                response_size_bytes = response.body.len(),
                "Invocation complete"
            ),
            Err(e) => error!(
                request_id = %request_id,
                kind = %kind,
                latency_ms,
                status = e.status(),
                error = %e,
                "Invocation failed"
            ),
        }
        outcome
    }

    /// Worker pool metrics, for the blocking strategy
    #[must_use]
    pub fn pool_metrics(&self) -> Option<&Arc<WorkerPoolMetrics>> {
        match self {
            DispatchStrategy::BlockingOffload(s) => Some(s.pool().metrics()),
            DispatchStrategy::DirectAwait(_) => None,
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
