//! Mesh data model and shared controller state.
//!
//! The controller owns a single [`ControllerState`] value: the live status row
//! per node, the per-node operator settings, and the global panic flag. All
//! access goes through one short-lived `RwLock` so a status row is always read
//! and written as a whole. The monitor loop is the only writer of status rows;
//! the control-plane handlers are the only writers of settings and panic
//! state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::NodeConfig;

/// Sentinel latency reported for a node that did not answer its probe.
pub const UNREACHABLE_PING_MS: f64 = 9999.0;

/// Geographic position published by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub city: String,
}

/// Dynamic status of one node, fully overwritten on every poll outcome.
///
/// `ip` and `web_port` are copied from the static node descriptor so the
/// selection result can be served without a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub ip: String,
    pub web_port: u16,
    pub alive: bool,
    pub ping_ms: f64,
    pub current_users: u64,
    pub max_users: u64,
    pub cpu_load: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub last_updated_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub maintenance: bool,
}

impl NodeStatus {
    /// Status row for a node whose probe failed this tick.
    ///
    /// The `maintenance` field is filled in from the operator settings when
    /// the row is committed; it defaults to `false` here.
    pub fn unreachable(node: &NodeConfig, error: String, timestamp: i64) -> Self {
        Self {
            ip: node.ip.clone(),
            web_port: node.web_port,
            alive: false,
            ping_ms: UNREACHABLE_PING_MS,
            current_users: 0,
            max_users: 0,
            cpu_load: 0.0,
            temperature_c: None,
            watts: None,
            location: None,
            last_updated_ts: timestamp,
            last_error: Some(error),
            maintenance: false,
        }
    }
}

/// Per-node operator settings.
///
/// Created lazily the first time the monitor loop commits a row for a node,
/// mutated only through the control plane, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSettings {
    pub maintenance: bool,
    pub weight: f64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            maintenance: false,
            weight: 1.0,
        }
    }
}

/// Global panic override: when enabled, every selection becomes a redirect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanicState {
    pub enabled: bool,
    pub redirect_url: String,
}

struct StateInner {
    status: HashMap<String, NodeStatus>,
    settings: HashMap<String, NodeSettings>,
    panic: PanicState,
}

/// Shared state of one controller process.
pub struct ControllerState {
    nodes: Vec<NodeConfig>,
    inner: RwLock<StateInner>,
}

impl ControllerState {
    pub fn new(nodes: Vec<NodeConfig>, default_panic_url: String) -> Self {
        Self {
            nodes,
            inner: RwLock::new(StateInner {
                status: HashMap::new(),
                settings: HashMap::new(),
                panic: PanicState {
                    enabled: false,
                    redirect_url: default_panic_url,
                },
            }),
        }
    }

    /// Static node descriptors in configuration order.
    ///
    /// Selection ties are broken by this order, so it must stay stable for
    /// the controller's lifetime.
    pub fn nodes(&self) -> &[NodeConfig] {
        &self.nodes
    }

    /// Commit the outcome of one poll tick.
    ///
    /// Every row swaps in atomically under a single write lock; a settings
    /// entry is created on a node's first appearance, and each committed row
    /// mirrors the current maintenance flag.
    pub fn commit_tick(&self, rows: Vec<(String, NodeStatus)>) {
        let mut guard = self
            .inner
            .write()
            .expect("controller state RwLock poisoned - critical error");
        let inner = &mut *guard;
        for (name, mut status) in rows {
            let settings = inner.settings.entry(name.clone()).or_default();
            status.maintenance = settings.maintenance;
            inner.status.insert(name, status);
        }
    }

    /// Consistent view of the status map and panic state in one acquisition.
    pub fn snapshot(&self) -> (HashMap<String, NodeStatus>, PanicState) {
        let inner = self
            .inner
            .read()
            .expect("controller state RwLock poisoned - critical error");
        (inner.status.clone(), inner.panic.clone())
    }

    pub fn status_snapshot(&self) -> HashMap<String, NodeStatus> {
        self.snapshot().0
    }

    /// Toggle maintenance for a known node. Returns `false` when the node has
    /// never been seen by the monitor loop.
    pub fn set_maintenance(&self, node: &str, enabled: bool) -> bool {
        let mut guard = self
            .inner
            .write()
            .expect("controller state RwLock poisoned - critical error");
        let inner = &mut *guard;
        match inner.settings.get_mut(node) {
            Some(settings) => {
                settings.maintenance = enabled;
                // Keep the visible status row in step so the very next
                // selection already observes the toggle.
                if let Some(status) = inner.status.get_mut(node) {
                    status.maintenance = enabled;
                }
                true
            }
            None => false,
        }
    }

    /// Update panic mode, optionally replacing the redirect target.
    pub fn set_panic(&self, enabled: bool, url: Option<String>) -> PanicState {
        let mut inner = self
            .inner
            .write()
            .expect("controller state RwLock poisoned - critical error");
        inner.panic.enabled = enabled;
        if let Some(url) = url {
            inner.panic.redirect_url = url;
        }
        inner.panic.clone()
    }
}
