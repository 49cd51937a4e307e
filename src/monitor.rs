//! The controller's monitor loop.
//!
//! Every tick the monitor fans out one `/stats` probe per configured node,
//! each on its own short-lived thread bounded by the probe timeout, then
//! commits all outcomes to the shared state in a single atomic swap and
//! appends the successful samples to the history store. Ticks stay on
//! schedule; a tick that overruns the period starts the next one immediately.

use serde::Deserialize;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, NodeConfig};
use crate::history::{HistorySample, HistoryStore, RETENTION_SECS};
use crate::metrics::ControllerMetrics;
use crate::state::{ControllerState, Location, NodeStatus};

/// Body of a successful agent `/stats` response.
///
/// Missing numeric fields default to zero, a missing `max_users` defaults to
/// 100, so a sparse payload still produces a usable status row.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentStatsPayload {
    #[serde(default)]
    pub current_users: u64,
    #[serde(default = "default_max_users")]
    pub max_users: u64,
    #[serde(default)]
    pub cpu_load: f64,
    #[serde(default, alias = "temp")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub watts: Option<f64>,
    #[serde(default)]
    pub location: Option<Location>,
}

fn default_max_users() -> u64 {
    100
}

type ProbeOutcome = Result<(f64, AgentStatsPayload), String>;

/// Periodic poller owning the cadence and probe timeout.
pub struct Monitor {
    state: Arc<ControllerState>,
    history: Arc<HistoryStore>,
    metrics: Arc<ControllerMetrics>,
    period: Duration,
    probe_timeout: Duration,
}

impl Monitor {
    pub fn new(
        state: Arc<ControllerState>,
        history: Arc<HistoryStore>,
        metrics: Arc<ControllerMetrics>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            state,
            history,
            metrics,
            period: Duration::from_secs(config.poll_interval_secs),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    /// Run the loop forever on a dedicated OS thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("mesh-monitor".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn monitor thread")
    }

    fn run(self) {
        info!(
            period_secs = self.period.as_secs(),
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            nodes = self.state.nodes().len(),
            "monitor loop started"
        );
        let mut next_tick = Instant::now();
        loop {
            next_tick += self.period;
            self.run_tick(unix_now());
            let now = Instant::now();
            match next_tick.checked_duration_since(now) {
                Some(wait) => thread::sleep(wait),
                // Overrun: start the next tick immediately and re-anchor the
                // schedule instead of bursting to catch up.
                None => next_tick = now,
            }
        }
    }

    /// One full poll pass; public so tests can drive ticks synchronously.
    pub fn run_tick(&self, timestamp: i64) {
        let outcomes = self.probe_all();

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut samples = Vec::new();
        let mut failures = 0u64;

        for (node, outcome) in outcomes {
            match outcome {
                Ok((ping_ms, payload)) => {
                    debug!(
                        node = %node.name,
                        ping_ms = ping_ms,
                        users = payload.current_users,
                        cpu_load = payload.cpu_load,
                        "probe ok"
                    );
                    samples.push(HistorySample {
                        timestamp,
                        node_name: node.name.clone(),
                        cpu_load: payload.cpu_load,
                        ping_ms,
                        users: payload.current_users,
                    });
                    rows.push((
                        node.name.clone(),
                        NodeStatus {
                            ip: node.ip.clone(),
                            web_port: node.web_port,
                            alive: true,
                            ping_ms,
                            current_users: payload.current_users,
                            max_users: payload.max_users,
                            cpu_load: payload.cpu_load,
                            temperature_c: payload.temperature,
                            watts: payload.watts,
                            location: payload.location,
                            last_updated_ts: timestamp,
                            last_error: None,
                            maintenance: false,
                        },
                    ));
                }
                Err(error) => {
                    failures += 1;
                    warn!(node = %node.name, error = %error, "probe failed");
                    rows.push((node.name.clone(), NodeStatus::unreachable(&node, error, timestamp)));
                }
            }
        }

        self.state.commit_tick(rows);

        // History I/O runs after the state lock is released; a failed write
        // skips the samples without failing the tick.
        let appended = samples.len() as u64;
        match self.history.append_batch(&samples) {
            Ok(()) => self.metrics.inc_samples_appended(appended),
            Err(error) => warn!(error = %error, "history append failed, samples skipped"),
        }

        self.metrics.inc_poll_tick();
        self.metrics.inc_poll_failures(failures);

        if timestamp % 3600 == 0 {
            match self.history.sweep_older_than(timestamp - RETENTION_SECS) {
                Ok(removed) => info!(removed, "history retention sweep"),
                Err(error) => warn!(error = %error, "history retention sweep failed"),
            }
        }
    }

    /// Probe every node concurrently; results come back in configured order.
    fn probe_all(&self) -> Vec<(NodeConfig, ProbeOutcome)> {
        let (tx, rx) = mpsc::channel();
        for (idx, node) in self.state.nodes().iter().cloned().enumerate() {
            let tx = tx.clone();
            let timeout = self.probe_timeout;
            thread::spawn(move || {
                let outcome = probe_node(&node, timeout);
                let _ = tx.send((idx, node, outcome));
            });
        }
        drop(tx);

        let mut results: Vec<(usize, NodeConfig, ProbeOutcome)> = rx.iter().collect();
        results.sort_by_key(|(idx, _, _)| *idx);
        results
            .into_iter()
            .map(|(_, node, outcome)| (node, outcome))
            .collect()
    }
}

/// Issue one `GET /stats` against a node's agent, measuring wall time in ms
/// across the full response.
fn probe_node(node: &NodeConfig, timeout: Duration) -> ProbeOutcome {
    let url = format!("http://{}:{}/stats", node.ip, node.agent_port);
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())?;

    let start = Instant::now();
    let resp = client.get(&url).send().map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("unexpected status {}", resp.status()));
    }
    let bytes = resp.bytes().map_err(|e| e.to_string())?;
    let ping_ms = (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

    let payload: AgentStatsPayload =
        serde_json::from_slice(&bytes).map_err(|e| format!("invalid stats payload: {e}"))?;
    Ok((ping_ms, payload))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
