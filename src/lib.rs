//! # loadmesh
//!
//! **loadmesh** is a small mesh load balancer built on the `may` coroutine
//! runtime: a controller that continuously polls a fleet of node agents,
//! scores them by liveness, latency, and utilization, answers "best node"
//! queries, and optionally reverse-proxies HTTP traffic to the winner. Each
//! node runs an agent that benchmarks its own capacity once at startup and
//! publishes live utilization.
//!
//! ## Architecture
//!
//! - **[`config`]** - YAML configuration for both roles
//! - **[`state`]** - mesh data model and the controller's shared state
//! - **[`monitor`]** - the 3-second poll loop with per-node probe fan-out
//! - **[`selection`]** - panic-aware, latency/load-scored node selection
//! - **[`history`]** - rolling 24h time series in embedded SQLite
//! - **[`proxy`]** - per-request forwarding to the selected backend
//! - **[`server`]** - HTTP plumbing shared by controller and agent
//! - **[`agent`]** - capacity benchmark, persisted profile, stats service
//! - **[`metrics`]** - Prometheus text counters for the controller
//! - **[`cli`]** - `loadmesh controller` / `loadmesh agent`
//!
//! ## Runtime considerations
//!
//! Request handling runs in `may` coroutines (configure stack size through
//! `LOADMESH_STACK_SIZE`); the monitor loop and its probes use dedicated OS
//! threads so a slow agent never stalls request handling. Outbound HTTP is
//! blocking `reqwest` with explicit per-call timeouts.

pub mod agent;
pub mod cli;
pub mod config;
pub mod history;
pub mod ids;
pub mod metrics;
pub mod monitor;
pub mod proxy;
pub mod runtime_config;
pub mod selection;
pub mod server;
pub mod state;

pub use config::{AgentConfig, ControllerConfig, NodeConfig};
pub use selection::{select_best, Selection};
pub use state::{ControllerState, NodeStatus, PanicState};
