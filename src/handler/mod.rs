//! # Handler Module
//!
//! Discovery, binding and classification of the user's inference handler.
//!
//! A handler is configured as a `<module>.<symbol>` reference. The
//! [`CodeLocator`] loads the unit named `<module>` from the code directory and
//! binds the [`ExportedHandler`] it exports under `<symbol>`. The resulting
//! [`BoundHandler`] is classified exactly once by [`classify`], which decides
//! how every request will be dispatched.
//!
//! ## Handler units
//!
//! A unit is a `cdylib` crate depending on this crate:
//!
//! ```rust,ignore
//! use brrtserve::{export_handler, HandlerResult, InvocationRequest, InvocationResponse};
//!
//! fn predict(req: InvocationRequest) -> HandlerResult {
//!     Ok(InvocationResponse::new(req.body))
//! }
//!
//! export_handler!(handler, blocking predict);
//! ```

mod classify;
mod entry;
mod locator;
mod reference;
pub mod search_path;

pub use classify::{classify, ExecutionKind};
pub use entry::{
    yield_now, BlockingFn, ExportedHandler, HandlerEntry, HandlerError, HandlerResult, HeaderVec,
    InvocationRequest, InvocationResponse, RequestId, SuspendableFn, YieldNow,
    HANDLER_ABI_VERSION, HANDLER_MAGIC, MAX_INLINE_HEADERS,
};
pub use locator::{BoundHandler, CodeLocator, CodeUnit, NativeLoader, UnitLoader};
pub use reference::{HandlerReference, REFERENCE_SEPARATOR};
