//! Reverse-proxy forwarding path.
//!
//! Stateless per request: the caller runs selection first, this module only
//! replays the request against the chosen backend and hands back the pieces
//! the client response is built from. Backend redirects are surfaced, never
//! followed, and a failed backend is reported as-is; the next request gets a
//! fresh selection instead of an in-request failover.

use std::time::Duration;
use tracing::debug;

use crate::ids::RequestId;
use crate::server::request::ParsedRequest;

/// Total budget for one backend round trip.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Response headers that are hop-by-hop or re-derived by the transport.
const STRIPPED_RESPONSE_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

/// Request headers the client connection owns; everything else is relayed.
const STRIPPED_REQUEST_HEADERS: [&str; 2] = ["host", "content-length"];

/// What came back from the backend, already filtered for relaying.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Replay `req` against `http://ip:port` and collect the response.
///
/// The original path and query string are forwarded verbatim; the request id
/// is attached as `X-Request-Id` so backend logs stay correlatable.
pub fn forward(
    req: &ParsedRequest,
    ip: &str,
    port: u16,
    request_id: RequestId,
) -> Result<BackendResponse, String> {
    let url = format!("http://{}:{}{}", ip, port, req.raw_path);

    let client = reqwest::blocking::Client::builder()
        .timeout(BACKEND_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| e.to_string())?;

    let method = reqwest::Method::from_bytes(req.method.as_str().as_bytes())
        .map_err(|e| e.to_string())?;

    let mut builder = client.request(method, &url);
    for (name, value) in &req.headers {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header("x-request-id", request_id.to_string());
    if !req.body.is_empty() {
        builder = builder.body(req.body.clone());
    }

    let resp = builder.send().map_err(|e| e.to_string())?;
    let status = resp.status().as_u16();
    let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .filter(|(name, _)| !STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();
    let body = resp.bytes().map_err(|e| e.to_string())?.to_vec();

    debug!(
        request_id = %request_id,
        backend = %url,
        status = status,
        body_bytes = body.len(),
        "backend response relayed"
    );

    Ok(BackendResponse {
        status,
        headers,
        body,
    })
}
