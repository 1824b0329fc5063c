use super::request::parse_invocation;
use super::response::{write_invocation_error, write_invocation_response, write_json_error};
use crate::dispatcher::DispatchStrategy;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// Liveness route
pub const PING_PATH: &str = "/ping";
/// Invocation route
pub const INVOCATIONS_PATH: &str = "/invocations";

/// The two-route inference service
///
/// Cloned once per connection by the transport; all clones share the strategy.
#[derive(Clone)]
pub struct InferenceService {
    strategy: Arc<DispatchStrategy>,
}

impl InferenceService {
    #[must_use]
    pub fn new(strategy: Arc<DispatchStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &Arc<DispatchStrategy> {
        &self.strategy
    }

    fn invocations(&self, req: Request, res: &mut Response) -> io::Result<()> {
        let request = match parse_invocation(req) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Failed to read invocation body");
                write_json_error(res, 400, json!({ "error": "Failed to read request body" }));
                return Ok(());
            }
        };

        let request_id = request.request_id;
        match self.strategy.invoke(request) {
            Ok(response) => write_invocation_response(res, response),
            Err(e) => write_invocation_error(res, &e, request_id),
        }
        Ok(())
    }
}

/// `GET /ping`: 200 with an empty body
pub fn ping_endpoint(res: &mut Response) -> io::Result<()> {
    res.status_code(200, "OK");
    res.body_vec(Vec::new());
    Ok(())
}

impl HttpService for InferenceService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let path = req.path().split('?').next().unwrap_or("/").to_string();

        match (method.as_str(), path.as_str()) {
            ("GET", PING_PATH) => ping_endpoint(res),
            ("POST", INVOCATIONS_PATH) => self.invocations(req, res),
            (_, PING_PATH | INVOCATIONS_PATH) => {
                debug!(method = %method, path = %path, "Method not allowed");
                write_json_error(
                    res,
                    405,
                    json!({ "error": "Method Not Allowed", "method": method, "path": path }),
                );
                Ok(())
            }
            _ => {
                debug!(method = %method, path = %path, "No route");
                write_json_error(
                    res,
                    404,
                    json!({ "error": "Not Found", "method": method, "path": path }),
                );
                Ok(())
            }
        }
    }
}
