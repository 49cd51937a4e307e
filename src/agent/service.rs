//! The agent's HTTP surface: live stats plus session tracking.
//!
//! `current_users` is a process-lifetime atomic; connect does a single
//! compare-and-swap so concurrent requests can never push the counter past
//! `max_users`, and disconnect saturates at zero.

use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sysinfo::{Components, System};
use tracing::{debug, info_span};

use super::profile::AgentProfile;
use crate::server::request::parse_request;
use crate::server::response::{write_json, write_json_error};

/// HTTP service of one node agent.
pub struct AgentService {
    profile: Arc<AgentProfile>,
    users: Arc<AtomicU64>,
    sys: Arc<Mutex<System>>,
    watts: Option<f64>,
}

impl Clone for AgentService {
    fn clone(&self) -> Self {
        Self {
            profile: Arc::clone(&self.profile),
            users: Arc::clone(&self.users),
            sys: Arc::clone(&self.sys),
            watts: self.watts,
        }
    }
}

impl AgentService {
    pub fn new(profile: AgentProfile, watts: Option<f64>) -> Self {
        Self {
            profile: Arc::new(profile),
            users: Arc::new(AtomicU64::new(0)),
            sys: Arc::new(Mutex::new(System::new())),
            watts,
        }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn current_users(&self) -> u64 {
        self.users.load(Ordering::SeqCst)
    }

    /// Claim one user slot; `false` when the node is full. The test and the
    /// increment are a single atomic operation.
    pub fn connect(&self) -> bool {
        let max = self.profile.max_users;
        self.users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v < max {
                    Some(v + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Release one user slot, saturating at zero.
    pub fn disconnect(&self) {
        let _ = self
            .users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    fn stats_payload(&self) -> serde_json::Value {
        let (cpu_load, ram_usage) = {
            let mut sys = self
                .sys
                .lock()
                .expect("system info Mutex poisoned - critical error");
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let total = sys.total_memory();
            let ram_usage = if total == 0 {
                0.0
            } else {
                sys.used_memory() as f64 / total as f64 * 100.0
            };
            (f64::from(sys.global_cpu_usage()), ram_usage)
        };

        json!({
            "name": self.profile.server_name,
            "region": self.profile.region,
            "max_users": self.profile.max_users,
            "current_users": self.current_users(),
            "cpu_load": cpu_load,
            "ram_usage": ram_usage,
            "temperature": max_component_temperature(),
            "watts": self.watts,
            "location": self.profile.location,
            "status": "online",
        })
    }
}

/// Hottest sensor on the machine, if any sensor is readable at all.
fn max_component_temperature() -> Option<f64> {
    let components = Components::new_with_refreshed_list();
    components
        .iter()
        .filter_map(|c| c.temperature())
        .fold(None, |acc: Option<f32>, t| {
            Some(acc.map_or(t, |a| a.max(t)))
        })
        .map(f64::from)
}

impl HttpService for AgentService {
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

        let span = info_span!("agent_request", method = %parsed.method, path = %parsed.path);
        let _enter = span.enter();

        if parsed.method == Method::GET && parsed.path == "/stats" {
            write_json(res, 200, &self.stats_payload());
        } else if parsed.method == Method::GET && parsed.path == "/health" {
            write_json(res, 200, &json!({ "status": "ok" }));
        } else if parsed.method == Method::POST && parsed.path == "/connect" {
            if self.connect() {
                debug!(current_users = self.current_users(), "user connected");
                write_json(
                    res,
                    200,
                    &json!({ "status": "connected", "server": self.profile.server_name }),
                );
            } else {
                write_json_error(res, 503, json!({ "status": "full" }));
            }
        } else if parsed.method == Method::POST && parsed.path == "/disconnect" {
            self.disconnect();
            debug!(current_users = self.current_users(), "user disconnected");
            write_json(res, 200, &json!({ "status": "disconnected" }));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn service(max_users: u64) -> AgentService {
        AgentService::new(
            AgentProfile {
                server_name: "LYON-NODE-001".into(),
                region: "EU".into(),
                max_users,
                port: 5001,
                location: None,
            },
            None,
        )
    }

    #[test]
    fn connect_stops_at_capacity() {
        let svc = service(3);
        assert!(svc.connect());
        assert!(svc.connect());
        assert!(svc.connect());
        assert!(!svc.connect());
        assert_eq!(svc.current_users(), 3);
    }

    #[test]
    fn disconnect_saturates_at_zero() {
        let svc = service(3);
        svc.disconnect();
        assert_eq!(svc.current_users(), 0);
        assert!(svc.connect());
        svc.disconnect();
        svc.disconnect();
        assert_eq!(svc.current_users(), 0);
    }

    #[test]
    fn concurrent_connects_admit_exactly_max() {
        let svc = service(25);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..10 {
                    if svc.connect() {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let admitted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
        assert_eq!(svc.current_users(), 25);
    }

    #[test]
    fn stats_payload_reports_identity_and_bounds() {
        let svc = service(50);
        assert!(svc.connect());
        let payload = svc.stats_payload();
        assert_eq!(payload["name"], "LYON-NODE-001");
        assert_eq!(payload["max_users"], 50);
        assert_eq!(payload["current_users"], 1);
        assert_eq!(payload["status"], "online");
        let cpu = payload["cpu_load"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&cpu));
        let ram = payload["ram_usage"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&ram));
    }
}
