//! `imagegate status` command handler

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

use imagegate_core::config::ImagegateConfig;
use imagegate_gate::store::ExceptionStore;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;

    let exceptions = ExceptionStore::load(&config.gate.exceptions_path).await?;
    let active_exceptions = exceptions.active_count(SystemTime::now()).await;

    let report = build_status_report(&config, active_exceptions, args.verbose);
    writer.render(&report)?;

    Ok(())
}

fn build_status_report(
    config: &ImagegateConfig,
    active_exceptions: usize,
    verbose: bool,
) -> StatusReport {
    let (daemon_running, pid) = check_daemon_status(&config.general.pid_file);

    StatusReport {
        daemon_running,
        pid,
        scanner_backend: config.scanner.backend.clone(),
        gate_threshold: config.gate.severity_threshold.clone(),
        api_enabled: config.api.enabled,
        api_bind: config.api.bind.clone(),
        active_exceptions,
        details: if verbose {
            Some(StatusDetails {
                trivy_path: config.scanner.trivy_path.clone(),
                clairctl_path: config.scanner.clairctl_path.clone(),
                scan_timeout_secs: config.scanner.scan_timeout_secs,
                exceptions_path: config.gate.exceptions_path.clone(),
                pid_file: config.general.pid_file.clone(),
                metrics_enabled: config.metrics.enabled,
                metrics_bind: config.metrics.bind.clone(),
            })
        } else {
            None
        },
    }
}

/// Check whether the daemon is running by reading the PID file and
/// probing the process.
fn check_daemon_status(pid_file: &str) -> (bool, Option<u32>) {
    let pid_path = std::path::Path::new(pid_file);

    if !pid_path.exists() {
        debug!(pid_file, "pid file does not exist");
        return (false, None);
    }

    let pid_content = match std::fs::read_to_string(pid_path) {
        Ok(content) => content,
        Err(e) => {
            warn!(pid_file, error = %e, "failed to read pid file");
            return (false, None);
        }
    };

    let pid = match pid_content.trim().parse::<u32>() {
        Ok(p) => p,
        Err(e) => {
            warn!(pid_file, error = %e, "failed to parse pid");
            return (false, None);
        }
    };

    if is_process_alive(pid) {
        (true, Some(pid))
    } else {
        (false, Some(pid))
    }
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use std::io::ErrorKind;

    // Send signal 0 to check if process exists
    // SAFETY: kill(2) with signal 0 is safe and does not affect the target process
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };

    if result == 0 {
        true
    } else {
        let err = std::io::Error::last_os_error();
        match err.kind() {
            ErrorKind::PermissionDenied => true, // Process exists but we can't signal it
            _ => false,
        }
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    warn!("process liveness check not supported on this platform");
    false
}

#[derive(Serialize)]
pub struct StatusReport {
    pub daemon_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub scanner_backend: String,
    pub gate_threshold: String,
    pub api_enabled: bool,
    pub api_bind: String,
    pub active_exceptions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

#[derive(Serialize)]
pub struct StatusDetails {
    pub trivy_path: String,
    pub clairctl_path: String,
    pub scan_timeout_secs: u64,
    pub exceptions_path: String,
    pub pid_file: String,
    pub metrics_enabled: bool,
    pub metrics_bind: String,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.daemon_running {
            writeln!(
                w,
                "Daemon: {} (pid: {})",
                "running".green().bold(),
                self.pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_owned()),
            )?;
        } else {
            writeln!(w, "Daemon: {}", "not running".red().bold())?;
        }

        writeln!(w)?;
        writeln!(w, "Scanner backend: {}", self.scanner_backend)?;
        writeln!(w, "Gate threshold: {}", self.gate_threshold)?;
        writeln!(
            w,
            "API: {} ({})",
            if self.api_enabled { "enabled" } else { "disabled" },
            self.api_bind,
        )?;
        writeln!(w, "Active exceptions: {}", self.active_exceptions)?;

        if let Some(details) = &self.details {
            writeln!(w)?;
            writeln!(w, "{}", "Details:".bold())?;
            writeln!(w, "  trivy: {}", details.trivy_path)?;
            writeln!(w, "  clairctl: {}", details.clairctl_path)?;
            writeln!(w, "  scan timeout: {}s", details.scan_timeout_secs)?;
            writeln!(w, "  exceptions file: {}", details.exceptions_path)?;
            writeln!(w, "  pid file: {}", details.pid_file)?;
            writeln!(
                w,
                "  metrics: {} ({})",
                if details.metrics_enabled {
                    "enabled"
                } else {
                    "disabled"
                },
                details.metrics_bind,
            )?;
        }

        Ok(())
    }
}
