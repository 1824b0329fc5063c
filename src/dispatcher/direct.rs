use super::{panic_message, InvocationOutcome};
use crate::error::InvocationError;
use crate::handler::{BoundHandler, InvocationRequest, SuspendableFn};
use may::sync::mpsc;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};
use tracing::error;

/// Runs a suspendable handler on the request coroutine
pub struct DirectAwait {
    func: SuspendableFn,
    handler: BoundHandler,
}

impl DirectAwait {
    #[must_use]
    pub fn new(handler: BoundHandler, func: SuspendableFn) -> Self {
        Self { func, handler }
    }

    pub fn handler(&self) -> &BoundHandler {
        &self.handler
    }

    /// Poll the handler's future to completion on the current coroutine.
    pub fn invoke(&self, request: InvocationRequest) -> InvocationOutcome {
        let request_id = request.request_id;
        let func = self.func;

        // The call itself happens inside the first poll so a panic while
        // building the future is caught too
        match drive(async move { func(request).await }) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(InvocationError::Raised(e.to_string())),
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(request_id = %request_id, panic_message = %message, "Handler panicked");
                Err(InvocationError::Panicked(message))
            }
        }
    }
}

/// Wakes a parked coroutine by sending on its channel
struct CoroutineWaker {
    tx: Mutex<mpsc::Sender<()>>,
}

impl Wake for CoroutineWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let _ = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(());
    }
}

/// Drive `future` to completion on the current coroutine.
///
/// While the future is pending the coroutine is parked on a `may` channel, so
/// the scheduling loop runs other coroutines until the future's waker fires.
/// Called from a plain thread it blocks that thread instead.
///
/// A panic during any poll is returned as `Err` with the panic payload.
pub fn drive<F: Future>(future: F) -> std::thread::Result<F::Output> {
    let (tx, rx) = mpsc::channel::<()>();
    let waker = Waker::from(Arc::new(CoroutineWaker { tx: Mutex::new(tx) }));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))? {
            Poll::Ready(output) => return Ok(output),
            Poll::Pending => {
                // A future that woke itself still gives the loop a turn
                if may::coroutine::is_coroutine() {
                    may::coroutine::yield_now();
                }
                // `waker` holds a sender, so the channel cannot disconnect here
                let _ = rx.recv();
                while rx.try_recv().is_ok() {}
            }
        }
    }
}
