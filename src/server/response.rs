use crate::error::InvocationError;
use crate::handler::{InvocationResponse, RequestId};
use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Content type used when a handler does not set one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const DEFAULT_CONTENT_TYPE_HEADER: &str = "Content-Type: application/octet-stream";
const JSON_CONTENT_TYPE_HEADER: &str = "Content-Type: application/json";

/// Distinct handler content types kept as header lines
const MAX_INTERNED_CONTENT_TYPES: usize = 64;

// `Response::header` takes `&'static str`
static CONTENT_TYPE_HEADERS: Lazy<Mutex<HashMap<String, &'static str>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// `Content-Type` header line for `content_type`.
///
/// Lines are interned; once the table is full, or for values that cannot be
/// sent as a header, the default content type is used.
pub(crate) fn content_type_header(content_type: &str) -> &'static str {
    match content_type {
        DEFAULT_CONTENT_TYPE => return DEFAULT_CONTENT_TYPE_HEADER,
        "application/json" => return JSON_CONTENT_TYPE_HEADER,
        _ => {}
    }
    if content_type.is_empty() || content_type.contains(['\r', '\n']) {
        return DEFAULT_CONTENT_TYPE_HEADER;
    }

    let mut headers = CONTENT_TYPE_HEADERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(line) = headers.get(content_type) {
        return line;
    }
    if headers.len() >= MAX_INTERNED_CONTENT_TYPES {
        return DEFAULT_CONTENT_TYPE_HEADER;
    }
    let line: &'static str = Box::leak(format!("Content-Type: {content_type}").into_boxed_str());
    headers.insert(content_type.to_string(), line);
    line
}

/// Write a handler's response with status 200.
pub fn write_invocation_response(res: &mut Response, response: InvocationResponse) {
    res.status_code(200, status_reason(200));
    res.header(content_type_header(
        response.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
    ));
    res.body_vec(response.body);
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header(JSON_CONTENT_TYPE_HEADER);
    res.body_vec(body.to_string().into_bytes());
}

/// Failure body for a failed invocation
#[must_use]
pub fn invocation_error_body(error: &InvocationError, request_id: RequestId) -> Value {
    json!({
        "error": error.to_string(),
        "request_id": request_id.to_string(),
    })
}

pub fn write_invocation_error(res: &mut Response, error: &InvocationError, request_id: RequestId) {
    write_json_error(res, error.status(), invocation_error_body(error, request_id));
}
