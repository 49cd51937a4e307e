//! Multi-resource capacity estimator.
//!
//! Runs once at agent startup when no persisted profile exists. Four axes are
//! probed (CPU, RAM, network, disk) and folded into a single `max_users`
//! figure through a weighted harmonic mean: any single scarce axis drags the
//! estimate down without fully dominating it, and a hard cap from the
//! non-oversubscribable resources (RAM, uplink) bounds the result from above.

use anyhow::Context;
use std::hint::black_box;
use std::io::Write;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::{info, warn};

use crate::config::BenchmarkEndpoints;

/// Emitted when any part of the benchmark fails; startup continues.
pub const FALLBACK_MAX_USERS: u64 = 20;

/// Sustained-load window for the CPU probe.
const CPU_WINDOW: Duration = Duration::from_millis(1500);
/// Multiply-ops per core that one user is assumed to cost.
const OPS_PER_USER_PER_CORE: f64 = 250_000.0;
/// CPU is oversubscribable under burst.
const CPU_SOFT_FACTOR: f64 = 2.5;

/// The OS keeps this much RAM for itself.
const RAM_RESERVE_GB: f64 = 2.0;
const USERS_PER_USABLE_GB: f64 = 40.0;

/// Per-user bandwidth budget.
const NET_KBS_PER_USER: f64 = 3.0;
const NET_HEADROOM: f64 = 0.8;
const NET_FALLBACK_CAPACITY: f64 = 100.0;

const IO_SCRATCH_BYTES: usize = 50 * 1024 * 1024;
/// Write throughput one user is assumed to consume, in KiB/s.
const IO_KIBS_PER_USER: f64 = 20.0;

/// Raw per-axis capacities, each already floored at 10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceCapacities {
    pub cpu: f64,
    pub ram: f64,
    pub net: f64,
    pub io: f64,
}

/// Fold the four axes into the final `max_users`.
///
/// Disk and network are clamped against the working set (`io <= ram*3`,
/// `net <= ram*2`) before the harmonic mean; the hard cap keeps the soft CPU
/// factor from allowing totals RAM or uplink cannot actually carry.
pub fn combine(caps: ResourceCapacities) -> u64 {
    let cpu_soft = caps.cpu * CPU_SOFT_FACTOR;
    let ram = caps.ram;
    let io = caps.io.min(ram * 3.0);
    let net = caps.net.min(ram * 2.0);
    let hard_cap = ram.min(net);

    let weighted = 1.0 / (0.45 / cpu_soft + 0.30 / ram + 0.20 / net + 0.05 / io);
    weighted.round().min(hard_cap).max(10.0) as u64
}

/// Run the full benchmark; on any failure fall back to a conservative figure.
pub fn estimate_max_users(endpoints: &BenchmarkEndpoints) -> u64 {
    match measure(endpoints) {
        Ok(caps) => {
            let max_users = combine(caps);
            info!(
                cpu = caps.cpu,
                ram = caps.ram,
                net = caps.net,
                io = caps.io,
                max_users = max_users,
                "capacity benchmark complete"
            );
            max_users
        }
        Err(error) => {
            warn!(
                error = %error,
                fallback = FALLBACK_MAX_USERS,
                "capacity benchmark failed"
            );
            FALLBACK_MAX_USERS
        }
    }
}

fn measure(endpoints: &BenchmarkEndpoints) -> anyhow::Result<ResourceCapacities> {
    let cpu = cpu_capacity()?;
    let mut sys = System::new();
    sys.refresh_memory();
    let ram = ram_capacity(&sys);
    let net = net_capacity(endpoints);
    let io = io_capacity()?;
    Ok(ResourceCapacities { cpu, ram, net, io })
}

/// One sustained f64-multiply worker per logical core for the whole window;
/// total ops divided by core count yields the per-core figure.
fn cpu_capacity() -> anyhow::Result<f64> {
    let cores = std::thread::available_parallelism()
        .context("could not determine core count")?
        .get();
    let deadline = Instant::now() + CPU_WINDOW;

    let mut workers = Vec::with_capacity(cores);
    for _ in 0..cores {
        workers.push(std::thread::spawn(move || {
            let mut x = 1.000_000_1_f64;
            let mut ops: u64 = 0;
            while Instant::now() < deadline {
                for _ in 0..4096 {
                    x = black_box(x * 1.000_000_001);
                }
                ops += 4096;
            }
            black_box(x);
            ops
        }));
    }

    let total_ops: u64 = workers.into_iter().map(|w| w.join().unwrap_or(0)).sum();
    let ops_per_core = total_ops as f64 / cores as f64;
    Ok((ops_per_core / OPS_PER_USER_PER_CORE * cores as f64)
        .round()
        .max(10.0))
}

fn ram_capacity(sys: &System) -> f64 {
    let total_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
    ((total_gb - RAM_RESERVE_GB) * USERS_PER_USABLE_GB)
        .round()
        .max(10.0)
}

/// Download/upload throughput against the configured endpoints, converted to
/// kB/s with the upload side weighted 5:1. Unconfigured or failed probes fall
/// back to a flat 100.
fn net_capacity(endpoints: &BenchmarkEndpoints) -> f64 {
    match measure_throughput(endpoints) {
        Ok((down_mbps, up_mbps)) => {
            let down_kbs = down_mbps * 125.0;
            let up_kbs = up_mbps * 125.0;
            (((up_kbs * 5.0 + down_kbs) / 6.0) / NET_KBS_PER_USER * NET_HEADROOM)
                .round()
                .max(10.0)
        }
        Err(error) => {
            warn!(error = %error, fallback = NET_FALLBACK_CAPACITY, "throughput probe skipped");
            NET_FALLBACK_CAPACITY
        }
    }
}

fn measure_throughput(endpoints: &BenchmarkEndpoints) -> anyhow::Result<(f64, f64)> {
    let download_url = endpoints
        .download_url
        .as_ref()
        .context("no download endpoint configured")?;
    let upload_url = endpoints
        .upload_url
        .as_ref()
        .context("no upload endpoint configured")?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let start = Instant::now();
    let bytes = client
        .get(download_url)
        .send()?
        .error_for_status()?
        .bytes()?;
    let down_mbps = bytes.len() as f64 * 8.0 / 1e6 / start.elapsed().as_secs_f64();

    let payload = vec![0u8; 5 * 1024 * 1024];
    let payload_bits = payload.len() as f64 * 8.0;
    let start = Instant::now();
    client
        .post(upload_url)
        .body(payload)
        .send()?
        .error_for_status()?;
    let up_mbps = payload_bits / 1e6 / start.elapsed().as_secs_f64();

    Ok((down_mbps, up_mbps))
}

/// Sequential 50 MiB write to a scratch file; the file lives only for the
/// duration of the probe.
fn io_capacity() -> anyhow::Result<f64> {
    let path = std::env::temp_dir().join(format!("loadmesh_bench_{}.tmp", std::process::id()));

    let result = (|| -> anyhow::Result<f64> {
        let chunk = vec![0u8; 1024 * 1024];
        let start = Instant::now();
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("could not create scratch file {}", path.display()))?;
        for _ in 0..(IO_SCRATCH_BYTES / chunk.len()) {
            file.write_all(&chunk)?;
        }
        file.sync_all()?;
        let secs = start.elapsed().as_secs_f64();
        let mib_per_sec = (IO_SCRATCH_BYTES as f64 / (1024.0 * 1024.0)) / secs;
        Ok((mib_per_sec * 1024.0 / IO_KIBS_PER_USER).round().max(10.0))
    })();

    let _ = std::fs::remove_file(&path);
    result
}
