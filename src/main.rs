//! Entry point for the acquisition daemon.
//!
//! No mandatory positional arguments: an optional first argument
//! overrides the config file path, otherwise it's resolved from
//! `$CONFIG_DIR/acq.cfg` (falling back to `cfg/acq.cfg`). `RUST_LOG`
//! controls log verbosity and defaults to `info` when unset.

use std::path::PathBuf;

use beamacq::supervisor;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_override = std::env::args_os().nth(1).map(PathBuf::from);
    std::process::exit(supervisor::run(config_override));
}
