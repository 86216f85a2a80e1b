//! CLI argument definitions for evfwd-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use evfwd_core::config::ForwarderConfig;

/// Input path meaning "read from standard input".
pub const STDIN_INPUT: &str = "-";

/// Default interval between periodic status reports.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

/// Event forwarder daemon.
///
/// Reads newline-delimited, already serialized events and forwards them
/// in bundles to the configured destination.
#[derive(Parser, Debug)]
#[command(name = "evfwd-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to evfwd.toml configuration file.
    #[arg(short, long, default_value = "/etc/evfwd/evfwd.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Event input, one record per line. `-` reads standard input.
    #[arg(short, long, default_value = STDIN_INPUT)]
    pub input: String,

    /// Routing key attached to every record read from the input.
    #[arg(long)]
    pub routing_key: Option<String>,

    /// Seconds between status reports.
    #[arg(long, default_value_t = DEFAULT_STATUS_INTERVAL_SECS)]
    pub status_interval_secs: u64,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    ///
    /// Call after environment overrides and before validation.
    pub fn apply_overrides(&self, config: &mut ForwarderConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }

    /// Whether the input is standard input.
    pub fn reads_stdin(&self) -> bool {
        self.input == STDIN_INPUT
    }
}
