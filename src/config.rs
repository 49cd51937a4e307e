//! Configuration files for both roles, loaded from YAML.
//!
//! The controller reads the mesh topology (`mesh.yaml`), the agent reads its
//! own identity and benchmark endpoints (`agent.yaml`). Node descriptors are
//! immutable for the lifetime of a controller process.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::state::Location;

/// Static descriptor of one worker node, controller-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Logical name, unique within the mesh.
    pub name: String,
    pub ip: String,
    /// Port the agent serves `/stats` on.
    pub agent_port: u16,
    /// Port user traffic is forwarded to.
    pub web_port: u16,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_history_db() -> PathBuf {
    PathBuf::from("mesh_history.db")
}

fn default_panic_url() -> String {
    "https://google.com".to_string()
}

/// Controller configuration (`mesh.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub nodes: Vec<NodeConfig>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_history_db")]
    pub history_db: PathBuf,
    /// Default panic-mode redirect target; operators can replace it at
    /// runtime through the control plane.
    #[serde(default = "default_panic_url")]
    pub panic_url: String,
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read controller config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse controller config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.nodes.is_empty() {
            bail!("controller config declares no nodes");
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                bail!("duplicate node name '{}'", node.name);
            }
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Optional throughput probe endpoints used by the capacity benchmark.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchmarkEndpoints {
    pub download_url: Option<String>,
    pub upload_url: Option<String>,
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("profile.yaml")
}

/// Agent configuration (`agent.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub city: String,
    pub node_index: u32,
    pub region: String,
    pub port: u16,
    #[serde(default = "default_profile_path")]
    pub profile: PathBuf,
    #[serde(default)]
    pub location: Option<Location>,
    /// Rated power draw, published through `/stats` as-is.
    #[serde(default)]
    pub watts: Option<f64>,
    #[serde(default)]
    pub benchmark: BenchmarkEndpoints,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read agent config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse agent config {}", path.display()))?;
        if config.city.is_empty() {
            bail!("agent config requires a non-empty city");
        }
        Ok(config)
    }

    /// Logical server name, `<CITY>-NODE-<NNN>`.
    pub fn server_name(&self) -> String {
        format!("{}-NODE-{:03}", self.city.to_uppercase(), self.node_index)
    }
}
