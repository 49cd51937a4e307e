//! Rolling 24-hour time series of poll samples, backed by embedded SQLite.
//!
//! One table, no indexes; the two read paths are "most recent 50 for a node"
//! and the hourly retention delete. Connections are opened per operation and
//! dropped immediately so no handle ever crosses a thread boundary.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Samples older than this are removed by the retention sweep.
pub const RETENTION_SECS: i64 = 86_400;

/// Upper bound on rows returned by [`HistoryStore::recent_samples`].
pub const RECENT_LIMIT: usize = 50;

/// One appended measurement, produced once per successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySample {
    pub timestamp: i64,
    pub node_name: String,
    pub cpu_load: f64,
    pub ping_ms: f64,
    pub users: u64,
}

/// Read shape served by `/api/history/<node>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub time: i64,
    pub load: f64,
    pub ping: f64,
}

/// Handle on the history database file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.path)
    }

    /// Create the schema if the file is new.
    pub fn init(&self) -> rusqlite::Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS history \
             (timestamp INTEGER, node_name TEXT, cpu_load REAL, ping REAL, users INTEGER)",
            [],
        )?;
        Ok(())
    }

    /// Append all samples of one tick inside a single transaction.
    pub fn append_batch(&self, samples: &[HistorySample]) -> rusqlite::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO history VALUES (?1, ?2, ?3, ?4, ?5)")?;
            for sample in samples {
                stmt.execute(params![
                    sample.timestamp,
                    sample.node_name,
                    sample.cpu_load,
                    sample.ping_ms,
                    sample.users as i64,
                ])?;
            }
        }
        tx.commit()
    }

    /// The most recent `limit` samples for a node, oldest-first.
    pub fn recent_samples(&self, node: &str, limit: usize) -> rusqlite::Result<Vec<HistoryPoint>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, cpu_load, ping FROM history \
             WHERE node_name = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![node, limit as i64], |row| {
                Ok(HistoryPoint {
                    time: row.get(0)?,
                    load: row.get(1)?,
                    ping: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        points.reverse();
        Ok(points)
    }

    /// Delete samples strictly older than `cutoff`; returns the row count.
    pub fn sweep_older_than(&self, cutoff: i64) -> rusqlite::Result<usize> {
        let conn = self.open()?;
        conn.execute("DELETE FROM history WHERE timestamp < ?1", params![cutoff])
    }
}
