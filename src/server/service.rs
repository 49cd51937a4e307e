use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::{info, info_span, warn};

use super::request::{parse_request, ParsedRequest};
use super::response::{
    intern_header, write_json, write_json_error, write_plain_text, write_relayed,
};
use crate::history::{HistoryStore, RECENT_LIMIT};
use crate::ids::RequestId;
use crate::metrics::ControllerMetrics;
use crate::proxy;
use crate::selection::{select_best, Selection};
use crate::state::ControllerState;

/// HTTP service of the mesh controller.
///
/// Serves the operator API under `/api/`, the ambient `/health` and
/// `/metrics` endpoints, and, when proxy mode is on, forwards every other
/// request to the best node of the moment.
pub struct ControllerService {
    pub state: Arc<ControllerState>,
    pub history: Arc<HistoryStore>,
    pub metrics: Arc<ControllerMetrics>,
    /// When false, non-API paths answer 404 (best-node hint deployments).
    pub proxy_enabled: bool,
}

impl Clone for ControllerService {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            history: Arc::clone(&self.history),
            metrics: Arc::clone(&self.metrics),
            proxy_enabled: self.proxy_enabled,
        }
    }
}

impl ControllerService {
    pub fn new(
        state: Arc<ControllerState>,
        history: Arc<HistoryStore>,
        metrics: Arc<ControllerMetrics>,
        proxy_enabled: bool,
    ) -> Self {
        Self {
            state,
            history,
            metrics,
            proxy_enabled,
        }
    }

    fn api_stats(&self, res: &mut Response) {
        let (nodes, panic) = self.state.snapshot();
        write_json(res, 200, &json!({ "nodes": nodes, "panic": panic }));
    }

    fn api_history(&self, res: &mut Response, node: &str, req: &ParsedRequest) {
        // Callers may ask for fewer points; the ceiling stays at 50.
        let limit = req
            .get_query_param("limit")
            .and_then(|v| v.parse::<usize>().ok())
            .map_or(RECENT_LIMIT, |n| n.min(RECENT_LIMIT));
        match self.history.recent_samples(node, limit) {
            Ok(points) => write_json(res, 200, &json!(points)),
            Err(error) => {
                warn!(node = %node, error = %error, "history read failed");
                write_json_error(res, 500, json!({ "error": "History unavailable" }));
            }
        }
    }

    fn api_get_best(&self, res: &mut Response) {
        self.metrics.inc_selection();
        match select_best(&self.state) {
            Selection::Target { ip, port } => {
                write_json(res, 200, &json!({ "ip": ip, "port": port }));
            }
            Selection::Panic { redirect_url } => {
                write_json(res, 200, &json!({ "panic": true, "redirect_url": redirect_url }));
            }
            Selection::Unavailable => {
                self.metrics.inc_selection_unavailable();
                write_json_error(res, 503, json!({ "error": "No servers available" }));
            }
        }
    }

    fn api_control_maintenance(&self, res: &mut Response, req: &ParsedRequest) {
        let Some(body) = req.json_body() else {
            write_json_error(res, 400, json!({ "error": "Invalid JSON body" }));
            return;
        };
        let (Some(node), Some(enabled)) = (
            body.get("node").and_then(|v| v.as_str()),
            body.get("enabled").and_then(|v| v.as_bool()),
        ) else {
            write_json_error(res, 400, json!({ "error": "Expected {node, enabled}" }));
            return;
        };

        if self.state.set_maintenance(node, enabled) {
            info!(node = %node, enabled = enabled, "maintenance toggled");
            write_json(res, 200, &json!({ "success": true }));
        } else {
            write_json_error(res, 404, json!({ "error": "Node not found" }));
        }
    }

    fn api_control_panic(&self, res: &mut Response, req: &ParsedRequest) {
        let Some(body) = req.json_body() else {
            write_json_error(res, 400, json!({ "error": "Invalid JSON body" }));
            return;
        };
        let enabled = body
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let url = body
            .get("url")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let panic = self.state.set_panic(enabled, url);
        info!(enabled = panic.enabled, redirect_url = %panic.redirect_url, "panic mode updated");
        write_json(res, 200, &json!({ "success": true, "state": panic }));
    }

    fn proxy_request(&self, res: &mut Response, req: &ParsedRequest) {
        let request_id = RequestId::from_header_or_new(req.get_header("x-request-id"));
        match select_best(&self.state) {
            Selection::Unavailable => {
                self.metrics.inc_selection_unavailable();
                write_plain_text(res, 503, "No servers available".to_string());
            }
            Selection::Panic { redirect_url } => {
                res.status_code(302, "Found");
                res.header(intern_header("Location", &redirect_url));
                res.body_vec(Vec::new());
            }
            Selection::Target { ip, port } => {
                self.metrics.inc_proxied_request();
                match proxy::forward(req, &ip, port, request_id) {
                    Ok(backend) => {
                        write_relayed(res, backend.status, &backend.headers, backend.body);
                    }
                    Err(error) => {
                        self.metrics.inc_backend_error();
                        warn!(
                            request_id = %request_id,
                            backend = %format!("{ip}:{port}"),
                            error = %error,
                            "backend request failed"
                        );
                        write_plain_text(res, 502, format!("Bad gateway: {error}"));
                    }
                }
            }
        }
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) -> io::Result<()> {
    write_json(res, 200, &json!({ "status": "ok" }));
    Ok(())
}

impl HttpService for ControllerService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = match parse_request(req) {
            Ok(parsed) => parsed,
            Err(invalid_method) => {
                write_json_error(
                    res,
                    400,
                    json!({
                        "error": "Bad Request",
                        "message": format!("Invalid HTTP method: {invalid_method}")
                    }),
                );
                return Ok(());
            }
        };

        let span = info_span!("http_request", method = %parsed.method, path = %parsed.path);
        let _enter = span.enter();

        self.metrics.inc_top_level_request();

        if parsed.method == Method::GET && parsed.path == "/health" {
            return health_endpoint(res);
        }
        if parsed.method == Method::GET && parsed.path == "/metrics" {
            res.status_code(200, "OK");
            res.header("Content-Type: text/plain");
            res.body_vec(self.metrics.render().into_bytes());
            return Ok(());
        }

        if parsed.method == Method::GET && parsed.path == "/api/stats" {
            self.api_stats(res);
        } else if parsed.method == Method::GET && parsed.path == "/api/get-best" {
            self.api_get_best(res);
        } else if parsed.method == Method::GET && parsed.path.starts_with("/api/history/") {
            let node = parsed.path.trim_start_matches("/api/history/").to_string();
            self.api_history(res, &node, &parsed);
        } else if parsed.method == Method::POST && parsed.path == "/api/control/maintenance" {
            self.api_control_maintenance(res, &parsed);
        } else if parsed.method == Method::POST && parsed.path == "/api/control/panic" {
            self.api_control_panic(res, &parsed);
        } else if self.proxy_enabled && !parsed.path.starts_with("/api/") {
            self.proxy_request(res, &parsed);
        } else {
            write_json_error(
                res,
                404,
                json!({
                    "error": "Not Found",
                    "method": parsed.method.to_string(),
                    "path": parsed.path
                }),
            );
        }
        Ok(())
    }
}
