//! Environment-driven runtime tuning.
//!
//! `LOADMESH_STACK_SIZE` sets the stack size for request-handling coroutines,
//! in decimal or `0x` hexadecimal. The default of `0x4000` (16 KB) is enough
//! for the controller's JSON handlers; raise it if proxied responses are
//! processed with deep call chains.

use std::env;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000)
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = match env::var("LOADMESH_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x4000)
                } else {
                    val.parse().unwrap_or(0x4000)
                }
            }
            Err(_) => 0x4000,
        };
        RuntimeConfig { stack_size }
    }
}
