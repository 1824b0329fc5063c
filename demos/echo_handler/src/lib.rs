//! Demo handler unit.
//!
//! Build with `cargo build -p echo_handler`, copy the resulting
//! `libecho_handler.so` into the code directory and start the server with
//! `SAGEMAKER_INFERENCE_CODE=echo_handler.handler`.

use brrtserve::{export_handler, yield_now, HandlerResult, InvocationRequest, InvocationResponse};
use serde::Serialize;

#[derive(Serialize)]
struct Echo<'a> {
    request_id: String,
    content_type: Option<&'a str>,
    size: usize,
    payload: serde_json::Value,
}

fn echo(req: &InvocationRequest) -> HandlerResult {
    // Non-JSON bodies are echoed as a string
    let payload = req
        .json::<serde_json::Value>()
        .or_else(|_| req.body_str().map(|s| serde_json::Value::String(s.to_string())))?;
    Ok(InvocationResponse::json(&Echo {
        request_id: req.request_id.to_string(),
        content_type: req.content_type(),
        size: req.body.len(),
        payload,
    })?)
}

fn predict(req: InvocationRequest) -> HandlerResult {
    echo(&req)
}

async fn predict_async(req: InvocationRequest) -> HandlerResult {
    yield_now().await;
    echo(&req)
}

export_handler!(handler, blocking predict);
export_handler!(handler_async, suspendable predict_async);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_json_body() {
        let req = InvocationRequest::new(br#"{"x":1}"#.to_vec())
            .with_header("Content-Type", "application/json");
        let resp = predict(req).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["payload"]["x"], 1);
        assert_eq!(body["content_type"], "application/json");
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_echo_text_body() {
        let resp = predict(InvocationRequest::new(b"hello".to_vec())).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["payload"], "hello");
        assert_eq!(body["size"], 5);
    }

    #[test]
    fn test_binary_body_is_an_error() {
        assert!(predict(InvocationRequest::new(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_exported_entries_pass_header_check() {
        assert!(handler.checked_entry().is_some());
        assert!(handler_async.checked_entry().is_some());
    }
}
