//! Types shared between the server and handler units.
//!
//! A handler unit is compiled against this crate and exports one
//! [`ExportedHandler`] static per handler with [`export_handler!`](crate::export_handler).
//! Units and the server must be built with the same toolchain and the same
//! version of this crate: the entry carries Rust-ABI function pointers.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use ulid::Ulid;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the request path
///
/// Names are lowercased `Arc<str>` so repeated names clone in O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// What a handler raises
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler produces
pub type HandlerResult = Result<InvocationResponse, HandlerError>;

/// Calling convention of a blocking handler: the result is usable on return.
pub type BlockingFn = fn(InvocationRequest) -> HandlerResult;

/// Calling convention of a suspendable handler: the result is a deferred computation.
pub type SuspendableFn = fn(InvocationRequest) -> BoxFuture<'static, HandlerResult>;

/// Magic number stamped on every exported handler ("BRRTSERV")
pub const HANDLER_MAGIC: u64 = 0x4252_5254_5345_5256;

/// Bumped whenever [`HandlerEntry`] or the request/response types change shape
pub const HANDLER_ABI_VERSION: u32 = 1;

/// Strongly typed request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Reuse the caller's id when it parses, otherwise generate one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.trim().parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(RequestId)
    }
}

/// Inbound invocation, passed to the handler unmodified
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Correlation id, also attached to every log event for this request
    pub request_id: RequestId,
    /// HTTP headers with lowercase names
    pub headers: HeaderVec,
    /// Raw request body
    pub body: Vec<u8>,
}

impl InvocationRequest {
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id: RequestId::new(),
            headers: HeaderVec::new(),
            body: body.into(),
        }
    }

    /// Append a header; the name is lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Handler output, written back unmodified
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationResponse {
    pub body: Vec<u8>,
    /// Sent as `Content-Type`; `application/octet-stream` when absent
    pub content_type: Option<String>,
}

impl InvocationResponse {
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(body.into().into_bytes()).with_content_type("text/plain; charset=utf-8")
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?).with_content_type("application/json"))
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Declared calling convention of a user handler
#[derive(Clone, Copy)]
pub enum HandlerEntry {
    Blocking(BlockingFn),
    Suspendable(SuspendableFn),
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HandlerEntry::Blocking(func) => {
                write!(f, "HandlerEntry::Blocking({:p})", *func as *const ())
            }
            HandlerEntry::Suspendable(func) => {
                write!(f, "HandlerEntry::Suspendable({:p})", *func as *const ())
            }
        }
    }
}

/// The static a handler unit exports under the handler's symbol name
///
/// The header fields let the loader reject symbols that were not produced by
/// [`export_handler!`](crate::export_handler) or that come from an incompatible build.
#[repr(C)]
pub struct ExportedHandler {
    pub magic: u64,
    pub abi_version: u32,
    pub entry: HandlerEntry,
}

impl ExportedHandler {
    #[must_use]
    pub const fn new(entry: HandlerEntry) -> Self {
        Self {
            magic: HANDLER_MAGIC,
            abi_version: HANDLER_ABI_VERSION,
            entry,
        }
    }

    /// The entry, if the header matches this build
    #[must_use]
    pub fn checked_entry(&self) -> Option<HandlerEntry> {
        (self.magic == HANDLER_MAGIC && self.abi_version == HANDLER_ABI_VERSION)
            .then_some(self.entry)
    }
}

/// Export a handler from a handler unit.
///
/// ```rust,ignore
/// use brrtserve::{export_handler, HandlerResult, InvocationRequest, InvocationResponse};
///
/// fn predict(req: InvocationRequest) -> HandlerResult {
///     Ok(InvocationResponse::new(req.body))
/// }
///
/// async fn predict_async(req: InvocationRequest) -> HandlerResult {
///     brrtserve::yield_now().await;
///     Ok(InvocationResponse::new(req.body))
/// }
///
/// export_handler!(handler, blocking predict);
/// export_handler!(handler_async, suspendable predict_async);
/// ```
///
/// The unit is then served with `SAGEMAKER_INFERENCE_CODE=<crate>.handler`.
#[macro_export]
macro_rules! export_handler {
    ($symbol:ident, blocking $func:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::ExportedHandler =
            $crate::ExportedHandler::new($crate::HandlerEntry::Blocking($func));
    };
    ($symbol:ident, suspendable $func:path) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::ExportedHandler =
            $crate::ExportedHandler::new($crate::HandlerEntry::Suspendable(
                |request: $crate::InvocationRequest|
                 -> $crate::BoxFuture<'static, $crate::HandlerResult> {
                    ::std::boxed::Box::pin($func(request))
                },
            ));
    };
}

/// Suspend once, letting other work on the scheduling loop run.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
