#![allow(dead_code)]

pub mod test_server {
    use brrtserve::{BoundHandler, Environment, RequestServer, ServerHandle};
    use std::net::{SocketAddr, TcpListener};
    use std::time::Duration;

    pub fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    /// Running server, stopped on drop
    ///
    /// `RequestServer::start` puts the `may` runtime on one scheduler worker.
    pub struct TestServer {
        handle: Option<ServerHandle>,
        addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(handler: BoundHandler, workers: usize) -> Self {
            let env = Environment {
                workers,
                ..Environment::default()
            };
            let addr = free_addr();
            let handle = RequestServer::new(handler, &env)
                .unwrap()
                .with_address(addr)
                .start()
                .unwrap();
            handle.wait_ready(Duration::from_secs(2)).unwrap();
            Self {
                handle: Some(handle),
                addr,
            }
        }

        pub fn addr(&self) -> SocketAddr {
            self.addr
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.shutdown();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    #[derive(Debug)]
    pub struct HttpResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl HttpResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn body_str(&self) -> String {
            String::from_utf8_lossy(&self.body).to_string()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Send one HTTP/1.1 request on a fresh connection and read the full response.
    pub fn send_request(
        addr: SocketAddr,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> HttpResponse {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
        for (name, value) in headers {
            req.push_str(&format!("{name}: {value}\r\n"));
        }
        req.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        stream.write_all(req.as_bytes()).unwrap();
        stream.write_all(body).unwrap();

        let mut buf = Vec::new();
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let mut tmp = [0u8; 1024];
            let n = stream.read(&mut tmp).unwrap();
            assert!(n > 0, "connection closed before response headers");
            buf.extend_from_slice(&tmp[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buf[header_end..].to_vec();
        while body.len() < content_length {
            let mut tmp = [0u8; 4096];
            let n = stream.read(&mut tmp).unwrap();
            assert!(n > 0, "connection closed before full body");
            body.extend_from_slice(&tmp[..n]);
        }
        body.truncate(content_length);

        HttpResponse {
            status,
            headers,
            body,
        }
    }

    pub fn ping(addr: SocketAddr) -> HttpResponse {
        send_request(addr, "GET", "/ping", &[], b"")
    }

    pub fn invoke(addr: SocketAddr, body: &[u8]) -> HttpResponse {
        send_request(addr, "POST", "/invocations", &[], body)
    }
}

/// In-memory handler units served from placeholder files
pub mod fixtures {
    use brrtserve::handler::{CodeUnit, HandlerEntry, UnitLoader};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    pub struct StaticUnit {
        entries: HashMap<String, HandlerEntry>,
    }

    impl StaticUnit {
        pub fn with(mut self, symbol: &str, entry: HandlerEntry) -> Self {
            self.entries.insert(symbol.to_string(), entry);
            self
        }
    }

    impl CodeUnit for StaticUnit {
        fn entry(&self, symbol: &str) -> Option<HandlerEntry> {
            self.entries.get(symbol).copied()
        }
    }

    /// Resolves module names to [`StaticUnit`]s and counts loads
    #[derive(Default)]
    pub struct StaticLoader {
        units: HashMap<String, Arc<StaticUnit>>,
        pub loads: Arc<AtomicUsize>,
    }

    impl StaticLoader {
        pub fn with_unit(mut self, module: &str, unit: StaticUnit) -> Self {
            self.units.insert(module.to_string(), Arc::new(unit));
            self
        }

        pub fn load_count(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.loads)
        }
    }

    impl UnitLoader for StaticLoader {
        fn load(&self, _path: &Path, module_name: &str) -> Result<Arc<dyn CodeUnit>, String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.units
                .get(module_name)
                .map(|unit| Arc::clone(unit) as Arc<dyn CodeUnit>)
                .ok_or_else(|| format!("no unit registered for `{module_name}`"))
        }
    }

    /// Code directory holding a placeholder unit file per module
    pub fn code_dir_with(modules: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for module in modules {
            std::fs::write(dir.path().join(libloading::library_filename(module)), b"").unwrap();
        }
        dir
    }
}

/// Handlers shared by the integration tests
pub mod handlers {
    use brrtserve::{
        yield_now, BoundHandler, BoxFuture, HandlerEntry, HandlerReference, HandlerResult,
        InvocationRequest, InvocationResponse,
    };
    use futures::channel::oneshot;
    use std::sync::Mutex;
    use std::time::Duration;

    pub fn bind(reference: &str, entry: HandlerEntry) -> BoundHandler {
        BoundHandler::linked(HandlerReference::parse(reference).unwrap(), entry)
    }

    /// Echo, or fail/panic when asked to by the body
    pub fn echo(req: InvocationRequest) -> HandlerResult {
        match req.body.as_slice() {
            b"fail" => Err("handler was asked to fail".into()),
            b"panic" => panic!("handler was asked to panic"),
            _ => {
                let response = InvocationResponse::new(req.body.clone());
                Ok(match req.content_type() {
                    Some(ct) => response.with_content_type(ct),
                    None => response,
                })
            }
        }
    }

    pub fn slow_echo(req: InvocationRequest) -> HandlerResult {
        std::thread::sleep(Duration::from_millis(300));
        Ok(InvocationResponse::new(req.body))
    }

    pub fn echo_async(req: InvocationRequest) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move {
            yield_now().await;
            if req.body == b"fail" {
                return Err("handler was asked to fail".into());
            }
            Ok(InvocationResponse::text(req.body_str()?.to_uppercase()))
        })
    }

    static GATE: Mutex<Option<oneshot::Sender<()>>> = Mutex::new(None);
    pub static EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    /// `wait` suspends until a later `release` request opens the gate
    pub fn gated(req: InvocationRequest) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move {
            match req.body.as_slice() {
                b"wait" => {
                    let (tx, rx) = oneshot::channel();
                    *GATE.lock().unwrap() = Some(tx);
                    EVENTS.lock().unwrap().push("suspended");
                    rx.await?;
                    EVENTS.lock().unwrap().push("resumed");
                    Ok(InvocationResponse::new(b"resumed".to_vec()))
                }
                b"release" => {
                    let gate = GATE.lock().unwrap().take();
                    EVENTS.lock().unwrap().push("released");
                    if let Some(tx) = gate {
                        let _ = tx.send(());
                    }
                    Ok(InvocationResponse::new(b"released".to_vec()))
                }
                _ => Ok(InvocationResponse::empty()),
            }
        })
    }

    pub fn gate_is_armed() -> bool {
        GATE.lock().unwrap().is_some()
    }
}
