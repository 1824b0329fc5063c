//! # brrtserve
//!
//! **brrtserve** is a minimal prediction-serving front end built on the `may`
//! coroutine runtime. At startup it loads one user-supplied inference handler,
//! exposes it over two fixed HTTP routes, and dispatches every invocation
//! through the execution strategy that matches the handler's calling
//! convention.
//!
//! ## Overview
//!
//! - **[`handler`]** - Handler references, unit loading, classification
//! - **[`dispatcher`]** - Blocking-Offload and Direct-Await strategies
//! - **[`worker_pool`]** - OS threads for blocking handlers
//! - **[`server`]** - `GET /ping` and `POST /invocations` on `may_minihttp`
//! - **[`environment`]** - `SAGEMAKER_INFERENCE_*` configuration
//! - **[`installer`]** - Requirements installation before loading
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`app`]** - Startup orchestration
//! - **[`cli`]** - The `brrtserve` command line
//!
//! ## Execution Model
//!
//! The `may` runtime runs with a single scheduler worker: that thread is the
//! scheduling loop. Every connection is served on its own coroutine on it.
//!
//! - A **blocking** handler (`fn(InvocationRequest) -> HandlerResult`) runs on
//!   a worker pool thread. The request coroutine parks on a `may` channel until
//!   the worker replies.
//! - A **suspendable** handler (an `async fn`) is polled on the request
//!   coroutine. While its future is pending the coroutine is parked and the
//!   loop serves other connections.
//!
//! The strategy is chosen once, before the first request, and never changes.
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as InferenceService<br/>(may_minihttp)
//!     participant Strategy as DispatchStrategy
//!     participant Pool as WorkerPool
//!     participant Handler as User handler
//!
//!     Client->>Server: POST /invocations
//!     Server->>Server: parse_invocation<br/>(headers, body)
//!     Server->>Strategy: invoke(request)
//!
//!     alt Blocking
//!         Strategy->>Pool: submit(job)
//!         Pool->>Handler: handler(request)
//!         Handler-->>Pool: HandlerResult
//!         Pool-->>Strategy: may channel reply
//!     else Suspendable
//!         Strategy->>Handler: poll future on request coroutine
//!         Handler-->>Strategy: Pending (coroutine parks)
//!         Handler-->>Strategy: Ready(HandlerResult)
//!     end
//!
//!     Strategy-->>Server: InvocationResponse or InvocationError
//!     Server-->>Client: 200 handler body / 500 / 503 JSON
//! ```
//!
//! ## Writing a Handler
//!
//! A handler unit is a `cdylib` that depends on this crate:
//!
//! ```rust,ignore
//! use brrtserve::{export_handler, HandlerResult, InvocationRequest, InvocationResponse};
//!
//! fn handler(req: InvocationRequest) -> HandlerResult {
//!     let input: serde_json::Value = req.json()?;
//!     Ok(InvocationResponse::json(&input)?)
//! }
//!
//! export_handler!(handler_entry, blocking handler);
//! ```
//!
//! Built as `libinference.so` and placed in the base directory, it is served
//! with `SAGEMAKER_INFERENCE_CODE=inference.handler_entry`. See
//! `demos/echo_handler` for both calling conventions.
//!
//! ## Running
//!
//! ```bash
//! SAGEMAKER_INFERENCE_BASE_DIRECTORY=/opt/ml/model \
//! SAGEMAKER_INFERENCE_CODE=inference.handler \
//! SAGEMAKER_INFERENCE_PORT=8080 \
//!     brrtserve serve
//!
//! curl -s localhost:8080/ping
//! curl -s -X POST --data-binary @input.json localhost:8080/invocations
//! ```

pub mod app;
pub mod cli;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod handler;
pub mod installer;
pub mod logging;
pub mod server;
pub mod worker_pool;

pub use app::InferenceServer;
pub use dispatcher::DispatchStrategy;
pub use environment::Environment;
pub use error::{InvocationError, ServerError};
pub use futures::future::BoxFuture;
pub use handler::{
    classify, yield_now, BoundHandler, CodeLocator, ExecutionKind, ExportedHandler, HandlerEntry,
    HandlerError, HandlerReference, HandlerResult, InvocationRequest, InvocationResponse,
    RequestId,
};
pub use server::{RequestServer, ServerHandle};
