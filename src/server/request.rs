//! HTTP request parsing shared by the controller and agent services.
//!
//! The body is kept as raw bytes so the reverse proxy can relay it verbatim;
//! the JSON control-plane handlers parse it on demand.

use http::Method;
use may_minihttp::Request;
use smallvec::SmallVec;
use std::io::Read;
use tracing::debug;

/// Header storage, stack-allocated for the common case of <=16 headers.
pub type HeaderVec = SmallVec<[(String, String); 16]>;
/// Query parameter storage, stack-allocated for <=8 params.
pub type ParamVec = SmallVec<[(String, String); 8]>;

/// Parsed HTTP request data used by both services.
#[derive(Debug, PartialEq)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Path plus query string exactly as received; the proxy forwards this
    pub raw_path: String,
    /// HTTP headers (lowercase keys)
    pub headers: HeaderVec,
    /// Parsed query string parameters
    pub query_params: ParamVec,
    /// Raw request body bytes
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Get a header by name (case-insensitive)
    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name
    #[inline]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON, if there is one.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}

/// Parse query string parameters from a URL path.
///
/// Extracts everything after the `?` character and URL-decodes parameter
/// names and values.
pub fn parse_query_params(path: &str) -> ParamVec {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    } else {
        ParamVec::new()
    }
}

/// Parse an incoming HTTP request into a [`ParsedRequest`].
///
/// # Returns
///
/// `Ok(ParsedRequest)` for a valid request, or `Err(invalid_method_string)`
/// when the HTTP method cannot be parsed.
pub fn parse_request(req: Request) -> Result<ParsedRequest, String> {
    // Reject invalid HTTP methods instead of defaulting to GET
    let method_str = req.method();
    let method: Method = method_str.parse().map_err(|_| method_str.to_string())?;
    let raw_path = req.path().to_string();
    let path = raw_path
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let query_params = parse_query_params(&raw_path);

    let mut body = Vec::new();
    let _ = req.body().read_to_end(&mut body);

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        query_count = query_params.len(),
        body_bytes = body.len(),
        "HTTP request parsed"
    );

    Ok(ParsedRequest {
        method,
        path,
        raw_path,
        headers,
        query_params,
        body,
    })
}
