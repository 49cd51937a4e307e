//! Command-line interface: `loadmesh controller` and `loadmesh agent`.

mod commands;

pub use commands::{run_cli, Cli, Commands};
