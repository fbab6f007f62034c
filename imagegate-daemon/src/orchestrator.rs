//! Daemon orchestration -- assembly, lifecycle, and the main event loop.
//!
//! The [`Orchestrator`] loads configuration, builds the scan coordinator
//! with its exception store and scanner backend, starts the HTTP API and
//! metrics exporter, and manages graceful shutdown on `SIGTERM`/`SIGINT`.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (so coordinator metrics are captured from the start)
//! 2. Exception store (gate decisions need it)
//! 3. Scan coordinator
//! 4. HTTP API server
//!
//! # Shutdown Order
//!
//! 1. HTTP API (stop accepting new scans)
//! 2. Scan coordinator
//! 3. Audit/uptime background tasks

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use imagegate_core::config::ImagegateConfig;
use imagegate_core::event::ScanEvent;
use imagegate_core::pipeline::Pipeline;
use imagegate_coordinator::{ScanCoordinator, ScanCoordinatorBuilder};
use imagegate_gate::store::ExceptionStore;
use imagegate_scanner::{AnyBackend, ClairBackend, TrivyBackend};

use crate::api::{self, AppState};
use crate::metrics_server;

/// The main daemon orchestrator.
///
/// Owns the scan coordinator until [`Orchestrator::run`] starts it and
/// hands a shared handle to the API server.
#[derive(Debug)]
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: ImagegateConfig,
    /// Scan coordinator (started in `run`).
    coordinator: ScanCoordinator<AnyBackend>,
    /// Scan event receiver for the audit log task.
    event_rx: Option<mpsc::Receiver<ScanEvent>>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = ImagegateConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when config has already been loaded.
    pub async fn build_from_config(config: ImagegateConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before any coordinator activity
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_daemon_metrics();
        }

        tracing::info!(
            path = config.gate.exceptions_path.as_str(),
            "loading exception store"
        );
        let exceptions = Arc::new(
            ExceptionStore::load(&config.gate.exceptions_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load exception store: {}", e))?,
        );

        let backend = make_backend(&config);
        tracing::info!(
            backend = config.scanner.backend.as_str(),
            threshold = config.gate.severity_threshold.as_str(),
            timeout_secs = config.scanner.scan_timeout_secs,
            "initializing scan coordinator"
        );
        let (coordinator, event_rx) = ScanCoordinatorBuilder::new()
            .backend(backend)
            .config(config.clone())
            .exception_store(exceptions)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build scan coordinator: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(16);

        Ok(Self {
            config,
            coordinator,
            event_rx,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &ImagegateConfig {
        &self.config
    }

    /// Start all components and block until a shutdown signal arrives.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(mut self) -> Result<()> {
        // Write PID file if configured
        if !self.config.general.pid_file.is_empty() {
            write_pid_file(Path::new(&self.config.general.pid_file))?;
        }

        if let Err(e) = self.coordinator.start().await {
            Self::cleanup_pid_file(&self.config);
            return Err(anyhow::anyhow!("failed to start scan coordinator: {}", e));
        }
        let coordinator = Arc::new(self.coordinator);

        // HTTP API server
        let mut api_task = None;
        if self.config.api.enabled {
            let state = Arc::new(AppState {
                coordinator: Arc::clone(&coordinator),
                start_time: self.start_time,
            });
            let app = api::router(state);

            let listener = match tokio::net::TcpListener::bind(&self.config.api.bind).await {
                Ok(listener) => listener,
                Err(e) => {
                    // Rollback: coordinator is running, stop it before bailing
                    if let Err(stop_err) = coordinator.shutdown().await {
                        tracing::error!(error = %stop_err, "rollback stop also failed");
                    }
                    Self::cleanup_pid_file(&self.config);
                    return Err(anyhow::anyhow!(
                        "failed to bind API listener on {}: {}",
                        self.config.api.bind,
                        e
                    ));
                }
            };
            tracing::info!(bind = self.config.api.bind.as_str(), "HTTP API listening");

            let mut shutdown_rx = self.shutdown_tx.subscribe();
            api_task = Some(tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "API server terminated with error");
                }
            }));
        }

        // Scan event audit log task
        let mut audit_task = self.event_rx.take().map(|event_rx| {
            let shutdown_rx = self.shutdown_tx.subscribe();
            spawn_scan_event_logger(event_rx, shutdown_rx)
        });

        // Uptime updater task
        let mut uptime_task = if self.config.metrics.enabled {
            let shutdown_rx = self.shutdown_tx.subscribe();
            Some(spawn_uptime_updater(self.start_time, shutdown_rx))
        } else {
            None
        };

        // Main event loop
        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = api_task.take() {
            let _ = task.await;
        }
        if let Some(task) = audit_task.take() {
            let _ = task.await;
        }
        if let Some(task) = uptime_task.take() {
            let _ = task.await;
        }

        if let Err(e) = coordinator.shutdown().await {
            tracing::error!(error = %e, "failed to stop scan coordinator");
        }

        Self::cleanup_pid_file(&self.config);
        Ok(())
    }

    fn cleanup_pid_file(config: &ImagegateConfig) {
        if !config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&config.general.pid_file));
        }
    }
}

/// Build the scanner backend selected in configuration.
///
/// `validate()` has already constrained `scanner.backend` to
/// `trivy` or `clair`.
fn make_backend(config: &ImagegateConfig) -> AnyBackend {
    match config.scanner.backend.as_str() {
        "clair" => AnyBackend::Clair(ClairBackend::new(config.scanner.clairctl_path.clone())),
        _ => AnyBackend::Trivy(TrivyBackend::new(config.scanner.trivy_path.clone())),
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with restrictive permissions (0o700)
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Spawn a background task that logs terminal scan events.
///
/// Every scan that reaches a terminal state produces a [`ScanEvent`];
/// this task writes them to the structured log for audit purposes.
fn spawn_scan_event_logger(
    mut event_rx: mpsc::Receiver<ScanEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event_result = event_rx.recv() => {
                    match event_result {
                        Some(event) => {
                            tracing::info!(
                                event_id = %event.id,
                                trace_id = %event.metadata.trace_id,
                                scan_id = %event.scan_id,
                                image = %event.image_ref,
                                status = %event.status,
                                counts = %event.counts,
                                fail_build = event.decision.as_ref().map(|d| d.should_fail_build),
                                error = event.error.as_deref(),
                                "scan completed"
                            );
                        }
                        None => {
                            tracing::debug!("scan event channel closed, exiting audit logger");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("scan event audit logger shutting down");
                    break;
                }
            }
        }
    })
}

/// Record daemon-level metrics (build info).
///
/// Should be called once during orchestrator initialization.
fn record_daemon_metrics() {
    use imagegate_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use imagegate_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
