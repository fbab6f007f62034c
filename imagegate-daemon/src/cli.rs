//! CLI argument definitions for imagegate-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Imagegate container image gate daemon.
///
/// Runs the scan coordinator and exposes the HTTP API used by
/// CI pipelines and the `imagegate` CLI.
#[derive(Parser, Debug)]
#[command(name = "imagegate-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to imagegate.toml configuration file.
    #[arg(short, long, default_value = "/etc/imagegate/imagegate.toml")]
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

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
