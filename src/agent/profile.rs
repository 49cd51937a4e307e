//! Persisted capacity profile.
//!
//! Generated once, the first time an agent starts on a machine, and reused on
//! every restart after that; deleting the file forces a fresh benchmark.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::benchmark;
use crate::config::AgentConfig;
use crate::state::Location;

const LEGACY_AGENT_PORT: u16 = 5000;
const LEGACY_AGENT_PORT_REPLACEMENT: u16 = 5001;

/// Immutable identity and capacity of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub server_name: String,
    pub region: String,
    pub max_users: u64,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl AgentProfile {
    /// Read a persisted profile, `None` when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let mut profile: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse profile {}", path.display()))?;
        // Deployments that predate the agent/web port split persisted 5000
        // here; rewrite it to the actual agent port.
        if profile.port == LEGACY_AGENT_PORT {
            profile.port = LEGACY_AGENT_PORT_REPLACEMENT;
        }
        Ok(Some(profile))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).context("failed to serialize profile")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write profile {}", path.display()))?;
        Ok(())
    }

    /// Run the capacity benchmark and assemble a fresh profile.
    pub fn generate(config: &AgentConfig) -> Self {
        let max_users = benchmark::estimate_max_users(&config.benchmark);
        Self {
            server_name: config.server_name(),
            region: config.region.clone(),
            max_users,
            port: config.port,
            location: config.location.clone(),
        }
    }

    /// The startup path: reuse a persisted profile or benchmark and persist.
    pub fn load_or_generate(config: &AgentConfig) -> anyhow::Result<Self> {
        if let Some(profile) = Self::load(&config.profile)? {
            info!(
                server_name = %profile.server_name,
                max_users = profile.max_users,
                "loaded persisted capacity profile"
            );
            return Ok(profile);
        }
        let profile = Self::generate(config);
        profile.save(&config.profile)?;
        info!(
            server_name = %profile.server_name,
            max_users = profile.max_users,
            profile = %config.profile.display(),
            "generated and persisted capacity profile"
        );
        Ok(profile)
    }
}
