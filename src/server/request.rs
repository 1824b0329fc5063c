use crate::handler::{HeaderVec, InvocationRequest, RequestId};
use may_minihttp::Request;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;

/// Header carrying a caller-supplied request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Decode an invocation from the raw request.
///
/// Headers are read before the body, which consumes the request. The body is
/// passed through unmodified.
pub fn parse_invocation(req: Request) -> io::Result<InvocationRequest> {
    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                Arc::from(h.name.to_ascii_lowercase()),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();
    let request_id = RequestId::from_header_or_new(
        headers
            .iter()
            .find(|(name, _)| name.as_ref() == REQUEST_ID_HEADER)
            .map(|(_, value)| value.as_str()),
    );

    let mut body = Vec::new();
    req.body().read_to_end(&mut body)?;

    debug!(
        request_id = %request_id,
        header_count = headers.len(),
        body_size_bytes = body.len(),
        "Invocation request parsed"
    );

    Ok(InvocationRequest {
        request_id,
        headers,
        body,
    })
}
