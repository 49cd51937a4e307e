//! Controller counters exported in Prometheus text format at `/metrics`.
//!
//! All counters are atomics updated without locks from the monitor thread and
//! the request coroutines.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for one controller process.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    top_level_requests: AtomicU64,
    poll_ticks: AtomicU64,
    poll_failures: AtomicU64,
    samples_appended: AtomicU64,
    selections: AtomicU64,
    selections_unavailable: AtomicU64,
    proxied_requests: AtomicU64,
    backend_errors: AtomicU64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_top_level_request(&self) {
        self.top_level_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poll_tick(&self) {
        self.poll_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poll_failures(&self, n: u64) {
        self.poll_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_samples_appended(&self, n: u64) {
        self.samples_appended.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_selection(&self) {
        self.selections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_selection_unavailable(&self) {
        self.selections_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proxied_request(&self) {
        self.proxied_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poll_ticks(&self) -> u64 {
        self.poll_ticks.load(Ordering::Relaxed)
    }

    pub fn poll_failures(&self) -> u64 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    pub fn top_level_requests(&self) -> u64 {
        self.top_level_requests.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut body = String::with_capacity(2048);

        body.push_str("# HELP loadmesh_requests_total Total number of received HTTP requests\n");
        body.push_str("# TYPE loadmesh_requests_total counter\n");
        body.push_str(&format!(
            "loadmesh_requests_total {}\n",
            self.top_level_requests.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_poll_ticks_total Completed monitor ticks\n");
        body.push_str("# TYPE loadmesh_poll_ticks_total counter\n");
        body.push_str(&format!(
            "loadmesh_poll_ticks_total {}\n",
            self.poll_ticks.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_poll_failures_total Probes that failed or timed out\n");
        body.push_str("# TYPE loadmesh_poll_failures_total counter\n");
        body.push_str(&format!(
            "loadmesh_poll_failures_total {}\n",
            self.poll_failures.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_history_samples_total Samples appended to the history store\n");
        body.push_str("# TYPE loadmesh_history_samples_total counter\n");
        body.push_str(&format!(
            "loadmesh_history_samples_total {}\n",
            self.samples_appended.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_selections_total Best-node selections answered\n");
        body.push_str("# TYPE loadmesh_selections_total counter\n");
        body.push_str(&format!(
            "loadmesh_selections_total {}\n",
            self.selections.load(Ordering::Relaxed)
        ));

        body.push_str(
            "# HELP loadmesh_selections_unavailable_total Selections with no eligible node\n",
        );
        body.push_str("# TYPE loadmesh_selections_unavailable_total counter\n");
        body.push_str(&format!(
            "loadmesh_selections_unavailable_total {}\n",
            self.selections_unavailable.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_proxied_requests_total Requests forwarded to a backend\n");
        body.push_str("# TYPE loadmesh_proxied_requests_total counter\n");
        body.push_str(&format!(
            "loadmesh_proxied_requests_total {}\n",
            self.proxied_requests.load(Ordering::Relaxed)
        ));

        body.push_str("# HELP loadmesh_backend_errors_total Backend connections that failed after selection\n");
        body.push_str("# TYPE loadmesh_backend_errors_total counter\n");
        body.push_str(&format!(
            "loadmesh_backend_errors_total {}\n",
            self.backend_errors.load(Ordering::Relaxed)
        ));

        body
    }
}
