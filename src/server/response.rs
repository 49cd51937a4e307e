use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Intern table for dynamic response headers.
///
/// may_minihttp requires header values with 'static lifetime; interning leaks
/// each distinct `Name: value` line exactly once instead of once per request.
static HEADER_INTERN: Lazy<RwLock<HashMap<String, &'static str>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn intern_header(name: &str, value: &str) -> &'static str {
    let line = format!("{name}: {value}");
    if let Some(existing) = HEADER_INTERN
        .read()
        .expect("header interner poisoned")
        .get(&line)
        .copied()
    {
        return existing;
    }
    // Re-check under the write lock to avoid leaking duplicates in a race.
    let mut write = HEADER_INTERN.write().expect("header interner poisoned");
    if let Some(existing) = write.get(&line).copied() {
        return existing;
    }
    let leaked: &'static str = Box::leak(line.into_boxed_str());
    write.insert(leaked.to_string(), leaked);
    leaked
}

pub fn write_json(res: &mut Response, status: u16, body: &Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec()));
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    write_json(res, status, &body);
}

pub fn write_plain_text(res: &mut Response, status: u16, body: String) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: text/plain");
    res.body_vec(body.into_bytes());
}

/// Status line plus pre-filtered headers plus raw body, as relayed by the
/// reverse proxy. Headers go through the interner.
pub fn write_relayed(res: &mut Response, status: u16, headers: &[(String, String)], body: Vec<u8>) {
    res.status_code(status as usize, status_reason(status));
    for (name, value) in headers {
        res.header(intern_header(name, value));
    }
    res.body_vec(body);
}
