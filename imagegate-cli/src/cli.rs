//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's
//! derive macros. It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Imagegate -- container image vulnerability scan gate.
///
/// Use `imagegate <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "imagegate", version, about, long_about = None)]
pub struct Cli {
    /// Path to the imagegate.toml configuration file.
    #[arg(short, long, default_value = "imagegate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a one-shot image scan and gate evaluation.
    Scan(ScanArgs),

    /// Manage vulnerability exceptions.
    Exceptions(ExceptionsArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Check daemon and gate status.
    Status(StatusArgs),
}

// ---- scan ----

/// Run a one-shot scan on a container image.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image name, e.g. `nginx` or `registry.example.com/app`.
    pub image: String,

    /// Image tag (default: latest).
    #[arg(long)]
    pub tag: Option<String>,

    /// Override the scanner backend (trivy, clair).
    #[arg(long)]
    pub backend: Option<String>,

    /// Override the gate threshold (low, medium, high, critical).
    #[arg(long)]
    pub threshold: Option<String>,
}

// ---- exceptions ----

/// Manage vulnerability exceptions.
#[derive(Args, Debug)]
pub struct ExceptionsArgs {
    #[command(subcommand)]
    pub action: ExceptionsAction,
}

#[derive(Subcommand, Debug)]
pub enum ExceptionsAction {
    /// List exceptions currently in effect.
    List {
        /// Include revoked and expired exceptions.
        #[arg(long)]
        all: bool,
    },
    /// Approve a new exception for a CVE.
    Approve {
        /// CVE identifier, e.g. CVE-2024-1234.
        cve_id: String,

        /// Restrict the exception to one image (default: global).
        #[arg(long)]
        image: Option<String>,

        /// Justification for accepting the risk.
        #[arg(long)]
        reason: String,

        /// Name of the approver.
        #[arg(long)]
        approved_by: String,

        /// Expire the exception after this many days (default: no expiry).
        #[arg(long)]
        expires_in_days: Option<u64>,
    },
    /// Revoke an exception by its ID.
    Revoke {
        /// Exception ID as shown by `exceptions list`.
        exception_id: String,
    },
}

// ---- config ----

/// Manage imagegate configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, scanner, gate, api, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- status ----

/// Display daemon liveness and gate configuration.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show detailed configuration values.
    #[arg(short, long)]
    pub verbose: bool,
}
