//! Accept loop for the scheduling loop.
//!
//! The listener is one `may` coroutine accepting on the configured port. Every
//! accepted connection gets its own coroutine on the same single scheduler
//! worker, so nothing here ever blocks an OS thread.

use crate::error::ServerError;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Header slots per request; proxies in front of the endpoint add several
const MAX_REQUEST_HEADERS: usize = 32;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Start accepting on `addr` with `service` cloned per connection.
pub(crate) fn listen<S>(service: S, addr: SocketAddr) -> Result<ServerHandle, ServerError>
where
    S: HttpService + Clone + Send + Sync + 'static,
{
    let accept_loop = HttpServerWithHeaders::<_, MAX_REQUEST_HEADERS>(service)
        .start(addr)
        .map_err(ServerError::ServerStartFailure)?;
    debug!(address = %addr, "Accept loop started");
    Ok(ServerHandle { addr, accept_loop })
}

/// A running request server
///
/// Dropping the handle leaves the server running; call
/// [`shutdown`](Self::shutdown) to stop accepting.
pub struct ServerHandle {
    addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the server was asked to listen on
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until a TCP connect to the server succeeds.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` with `TimedOut` if `timeout` elapses first.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), ServerError> {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            if TcpStream::connect(self.addr).is_ok() {
                debug!(address = %self.addr, attempts, "Server accepting connections");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(address = %self.addr, attempts, "Server never became ready");
                return Err(ServerError::ServerStartFailure(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("server at {} not accepting after {:?}", self.addr, timeout),
                )));
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }

    /// Stop accepting new connections and wait for the accept loop to exit.
    ///
    /// In-flight requests keep their own coroutines and are not drained.
    pub fn shutdown(self) {
        // SAFETY: `may` cancellation unwinds the coroutine at its next yield
        // point. The accept loop owns only the listening socket, which closes
        // as it unwinds.
        unsafe {
            self.accept_loop.coroutine().cancel();
        }
        if self.accept_loop.join().is_err() {
            debug!(address = %self.addr, "Accept loop ended by cancellation");
        }
    }

    /// Block until the accept loop exits.
    ///
    /// # Errors
    ///
    /// `ServerStartFailure` if the accept loop panicked.
    pub fn join(self) -> Result<(), ServerError> {
        self.accept_loop.join().map_err(|_| {
            ServerError::ServerStartFailure(io::Error::new(
                io::ErrorKind::Other,
                "server accept loop panicked",
            ))
        })
    }
}
