//! Best-node selection.
//!
//! A pure function of the current status snapshot: panic mode short-circuits
//! everything, then live, non-maintenance, non-full nodes compete on
//! `ping_ms + cpu_load * 2` (lower wins). One percent of CPU load costs two
//! milliseconds of equivalent latency, biasing away from hot nodes even when
//! they are nearer.

use serde::Serialize;

use crate::state::{ControllerState, NodeStatus};

/// Milliseconds of equivalent latency per percent of CPU load.
pub const CPU_LOAD_WEIGHT: f64 = 2.0;

/// Outcome of one selection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Selection {
    /// Best eligible node; traffic goes to `ip:port`.
    Target { ip: String, port: u16 },
    /// Panic mode is on; every client is redirected.
    Panic { redirect_url: String },
    /// No node is eligible right now.
    Unavailable,
}

/// Scoring function; lower is better.
pub fn score(status: &NodeStatus) -> f64 {
    status.ping_ms + status.cpu_load * CPU_LOAD_WEIGHT
}

/// A node can receive traffic iff it answered its last probe, is not in
/// maintenance, and has a free user slot.
pub fn eligible(status: &NodeStatus) -> bool {
    status.alive && !status.maintenance && status.current_users < status.max_users
}

/// Pick the best node for the next client.
///
/// Ties resolve to the node that appears first in the configured node list,
/// so repeated calls over an identical snapshot return the same target.
pub fn select_best(state: &ControllerState) -> Selection {
    let (status, panic) = state.snapshot();
    if panic.enabled {
        return Selection::Panic {
            redirect_url: panic.redirect_url,
        };
    }

    let mut best: Option<(f64, &NodeStatus)> = None;
    for node in state.nodes() {
        let Some(row) = status.get(&node.name) else {
            continue;
        };
        if !eligible(row) {
            continue;
        }
        let row_score = score(row);
        if best.map_or(true, |(best_score, _)| row_score < best_score) {
            best = Some((row_score, row));
        }
    }

    match best {
        Some((_, row)) => Selection::Target {
            ip: row.ip.clone(),
            port: row.web_port,
        },
        None => Selection::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn node(name: &str, ip: &str) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            ip: ip.to_string(),
            agent_port: 5001,
            web_port: 8000,
        }
    }

    fn status(node: &NodeConfig, ping: f64, load: f64) -> NodeStatus {
        NodeStatus {
            ip: node.ip.clone(),
            web_port: node.web_port,
            alive: true,
            ping_ms: ping,
            current_users: 0,
            max_users: 100,
            cpu_load: load,
            temperature_c: None,
            watts: None,
            location: None,
            last_updated_ts: 0,
            last_error: None,
            maintenance: false,
        }
    }

    fn mesh(rows: Vec<(NodeConfig, NodeStatus)>) -> ControllerState {
        let nodes: Vec<NodeConfig> = rows.iter().map(|(n, _)| n.clone()).collect();
        let state = ControllerState::new(nodes, "https://example".into());
        state.commit_tick(
            rows.into_iter()
                .map(|(n, s)| (n.name, s))
                .collect::<Vec<_>>(),
        );
        state
    }

    #[test]
    fn load_outweighs_proximity() {
        // A scores 10 + 20*2 = 50, B scores 30 + 0*2 = 30.
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let sa = status(&a, 10.0, 20.0);
        let sb = status(&b, 30.0, 0.0);
        let state = mesh(vec![(a, sa), (b, sb)]);
        assert_eq!(
            select_best(&state),
            Selection::Target {
                ip: "10.0.0.2".into(),
                port: 8000
            }
        );
    }

    #[test]
    fn cpu_weighting_dominates_close_node() {
        // A scores 5 + 50*2 = 105, B scores 80 + 5*2 = 90.
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let sa = status(&a, 5.0, 50.0);
        let sb = status(&b, 80.0, 5.0);
        let state = mesh(vec![(a, sa), (b, sb)]);
        assert_eq!(
            select_best(&state),
            Selection::Target {
                ip: "10.0.0.2".into(),
                port: 8000
            }
        );
    }

    #[test]
    fn full_node_is_skipped() {
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let mut sa = status(&a, 1.0, 0.0);
        sa.current_users = 100;
        sa.max_users = 100;
        let mut sb = status(&b, 50.0, 10.0);
        sb.current_users = 10;
        let state = mesh(vec![(a, sa), (b, sb)]);
        assert_eq!(
            select_best(&state),
            Selection::Target {
                ip: "10.0.0.2".into(),
                port: 8000
            }
        );
    }

    #[test]
    fn ties_resolve_to_configured_order() {
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let sa = status(&a, 10.0, 10.0);
        let sb = status(&b, 10.0, 10.0);
        let state = mesh(vec![(a, sa), (b, sb)]);
        assert_eq!(
            select_best(&state),
            Selection::Target {
                ip: "10.0.0.1".into(),
                port: 8000
            }
        );
    }

    #[test]
    fn panic_overrides_every_node() {
        let a = node("a", "10.0.0.1");
        let sa = status(&a, 1.0, 0.0);
        let state = mesh(vec![(a, sa)]);
        state.set_panic(true, Some("https://example".into()));
        assert_eq!(
            select_best(&state),
            Selection::Panic {
                redirect_url: "https://example".into()
            }
        );
    }

    #[test]
    fn dead_and_maintenance_nodes_leave_nothing() {
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let mut sa = status(&a, 10.0, 0.0);
        sa.alive = false;
        let sb = status(&b, 10.0, 0.0);
        let state = mesh(vec![(a, sa), (b.clone(), sb)]);
        state.set_maintenance("b", true);
        assert_eq!(select_best(&state), Selection::Unavailable);
    }

    #[test]
    fn selection_is_deterministic() {
        let a = node("a", "10.0.0.1");
        let b = node("b", "10.0.0.2");
        let sa = status(&a, 12.0, 3.0);
        let sb = status(&b, 14.0, 2.0);
        let state = mesh(vec![(a, sa), (b, sb)]);
        let first = select_best(&state);
        let second = select_best(&state);
        assert_eq!(first, second);
    }
}
