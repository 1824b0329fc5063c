//! # Server Module
//!
//! The HTTP front end: `GET /ping` for liveness and `POST /invocations`
//! forwarded to the process's [`DispatchStrategy`].
//!
//! Connections are accepted by `may_minihttp` and each is served on its own
//! coroutine on the scheduling loop. Only the blocking strategy ever leaves
//! the loop, and it does so through the worker pool.
//!
//! | Method | Path | Success | Failure |
//! |---|---|---|---|
//! | GET | `/ping` | 200, empty body | never |
//! | POST | `/invocations` | 200, handler body | 500 handler error or panic, 503 pool gone |
//!
//! Other methods on these paths get 405; other paths get 404.

mod listener;
mod request;
mod response;
mod service;

pub use listener::ServerHandle;
pub use request::{parse_invocation, REQUEST_ID_HEADER};
pub use response::{
    invocation_error_body, write_invocation_error, write_invocation_response, write_json_error,
    DEFAULT_CONTENT_TYPE,
};
pub use service::{ping_endpoint, InferenceService, INVOCATIONS_PATH, PING_PATH};

use crate::dispatcher::DispatchStrategy;
use crate::environment::{Environment, DEFAULT_STACK_SIZE};
use crate::error::ServerError;
use crate::handler::BoundHandler;
use crate::worker_pool::WorkerPoolConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// One server per process, bound to one port
///
/// [`start`](Self::start) configures the `may` runtime with a single scheduler
/// worker before the accept loop is spawned, so every connection and every
/// suspendable handler shares one scheduling loop.
pub struct RequestServer {
    strategy: Arc<DispatchStrategy>,
    addr: SocketAddr,
    stack_size: usize,
}

impl RequestServer {
    /// Classify `handler` and build its strategy; listens on all interfaces
    /// at the configured port.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` if the worker pool cannot be created.
    pub fn new(handler: BoundHandler, env: &Environment) -> Result<Self, ServerError> {
        let strategy =
            DispatchStrategy::for_handler(handler, WorkerPoolConfig::from_environment(env))?;
        Ok(Self::with_strategy(
            strategy,
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, env.port)),
        )
        .with_stack_size(env.stack_size))
    }

    /// Server for an already built strategy, with the default coroutine stack size
    #[must_use]
    pub fn with_strategy(strategy: DispatchStrategy, addr: SocketAddr) -> Self {
        Self {
            strategy: Arc::new(strategy),
            addr,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    #[must_use]
    pub fn with_address(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Coroutine stack size applied by [`start`](Self::start)
    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn strategy(&self) -> &Arc<DispatchStrategy> {
        &self.strategy
    }

    /// Configure the runtime, bind and start accepting connections.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` if the port cannot be bound.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        configure_runtime(self.stack_size);
        let service = InferenceService::new(Arc::clone(&self.strategy));
        let handle = listener::listen(service, self.addr)?;
        info!(
            address = %self.addr,
            handler = %self.strategy.handler().reference(),
            kind = %self.strategy.kind(),
            "Inference server listening"
        );
        Ok(handle)
    }

    /// Start and block until the accept loop exits.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` if the port cannot be bound or the accept loop dies.
    pub fn serve(self) -> Result<(), ServerError> {
        self.start()?.join()
    }
}

/// One scheduler worker and the given coroutine stack size.
///
/// Takes effect only before the first coroutine is spawned.
pub fn configure_runtime(stack_size: usize) {
    may::config().set_workers(1);
    may::config().set_stack_size(stack_size);
    debug!(workers = 1, stack_size, "Configured coroutine runtime");
}
