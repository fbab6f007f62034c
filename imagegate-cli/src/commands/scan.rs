//! `imagegate scan` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use imagegate_core::config::ScannerConfig;
use imagegate_core::error::{ImagegateError, ScanError};
use imagegate_core::pipeline::Pipeline;
use imagegate_core::types::{GateDecision, GateThreshold, ScanRequest, ScanResult, ScanStatus};
use imagegate_coordinator::ScanCoordinatorBuilder;
use imagegate_gate::store::ExceptionStore;
use imagegate_scanner::{AnyBackend, ClairBackend, TrivyBackend};

use crate::cli::ScanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `scan` command.
///
/// Runs one scan to completion, renders the report, and maps the outcome
/// to an exit code: a terminal `FAILED`/`TIMEOUT` scan is a command error,
/// a failing gate verdict is exit code 4.
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut config = super::load_config(config_path).await?;

    if let Some(backend) = &args.backend {
        config.scanner.backend = backend.clone();
    }
    if let Some(threshold) = &args.threshold {
        if GateThreshold::from_str_loose(threshold).is_none() {
            return Err(CliError::Command(format!(
                "invalid threshold: {} (expected: low, medium, high, critical)",
                threshold
            )));
        }
        config.gate.severity_threshold = threshold.clone();
    }

    let backend = make_backend(&config.scanner)?;

    info!(
        image = %args.image,
        tag = args.tag.as_deref().unwrap_or("latest"),
        backend = %config.scanner.backend,
        "starting one-shot scan"
    );

    let exceptions = Arc::new(ExceptionStore::load(&config.gate.exceptions_path).await?);
    let (mut coordinator, _events) = ScanCoordinatorBuilder::new()
        .backend(backend)
        .config(config)
        .exception_store(exceptions)
        .build()?;

    coordinator.start().await?;

    let request = ScanRequest::new(args.image, args.tag);
    let outcome = coordinator.submit(request).await.map_err(|e| match e {
        ImagegateError::Scan(ScanError::Unavailable(msg)) => CliError::ScannerUnavailable(msg),
        ImagegateError::Scan(err @ ScanError::InvalidImage { .. }) => {
            CliError::Command(err.to_string())
        }
        other => CliError::Core(other),
    })?;

    coordinator.stop().await?;

    let report = build_scan_report(&outcome.scan, &outcome.decision);
    writer.render(&report)?;

    if outcome.scan.status != ScanStatus::Success {
        return Err(CliError::Command(format!(
            "scan ended with status {}: {}",
            outcome.scan.status,
            outcome.scan.error.as_deref().unwrap_or("unknown error"),
        )));
    }
    if outcome.decision.should_fail_build {
        return Err(CliError::GateFailed(format!(
            "threshold {} exceeded ({})",
            outcome.decision.threshold, outcome.decision.effective_counts,
        )));
    }

    Ok(())
}

/// Instantiate the configured scanner backend.
fn make_backend(scanner: &ScannerConfig) -> Result<AnyBackend, CliError> {
    match scanner.backend.as_str() {
        "trivy" => Ok(AnyBackend::Trivy(TrivyBackend::new(
            scanner.trivy_path.clone(),
        ))),
        "clair" => Ok(AnyBackend::Clair(ClairBackend::new(
            scanner.clairctl_path.clone(),
        ))),
        other => Err(CliError::Config(format!(
            "unknown scanner backend: {} (expected: trivy, clair)",
            other
        ))),
    }
}

fn build_scan_report(scan: &ScanResult, decision: &GateDecision) -> ScanReport {
    let counts = scan.severity_counts();

    let findings = scan
        .vulnerabilities
        .iter()
        .map(|v| FindingEntry {
            cve_id: v.cve_id.clone(),
            package: v.package_name.clone(),
            version: v.package_version.clone(),
            severity: v.severity.to_string(),
            cvss_score: v.cvss_score,
            fixed_version: v.fixed_version.clone(),
        })
        .collect();

    ScanReport {
        scan_id: scan.id.clone(),
        image: scan.image_ref(),
        status: scan.status.to_string(),
        backend: scan.scanner_backend.clone(),
        scanner_version: scan.scanner_version.clone(),
        duration_secs: scan.duration_secs,
        error: scan.error.clone(),
        vulnerabilities: VulnSummary {
            critical: counts.critical,
            high: counts.high,
            medium: counts.medium,
            low: counts.low,
            unknown: counts.unknown,
            total: counts.total(),
        },
        gate: GateSummary {
            verdict: if decision.should_fail_build {
                "FAIL".to_owned()
            } else {
                "PASS".to_owned()
            },
            threshold: decision.threshold.to_string(),
            excepted_count: decision.excepted_count,
            effective_counts: VulnSummary {
                critical: decision.effective_counts.critical,
                high: decision.effective_counts.high,
                medium: decision.effective_counts.medium,
                low: decision.effective_counts.low,
                unknown: decision.effective_counts.unknown,
                total: decision.effective_counts.total(),
            },
        },
        findings,
    }
}

#[derive(Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub image: String,
    pub status: String,
    pub backend: String,
    pub scanner_version: String,
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub vulnerabilities: VulnSummary,
    pub gate: GateSummary,
    pub findings: Vec<FindingEntry>,
}

#[derive(Serialize, Default)]
pub struct VulnSummary {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub unknown: u64,
    pub total: u64,
}

#[derive(Serialize)]
pub struct GateSummary {
    pub verdict: String,
    pub threshold: String,
    pub excepted_count: u64,
    pub effective_counts: VulnSummary,
}

#[derive(Serialize)]
pub struct FindingEntry {
    pub cve_id: String,
    pub package: String,
    pub version: String,
    pub severity: String,
    pub cvss_score: Option<f64>,
    pub fixed_version: Option<String>,
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scan: {}", self.image.bold())?;
        writeln!(
            w,
            "Scanner: {} {} | Status: {} | Duration: {}",
            self.backend,
            self.scanner_version,
            self.status,
            self.duration_secs
                .map(|d| format!("{:.1}s", d))
                .unwrap_or_else(|| "-".to_owned()),
        )?;
        if let Some(error) = &self.error {
            writeln!(w, "Error: {}", error.red())?;
        }
        writeln!(w)?;

        let vuln_str = format!(
            "{} total (C:{} H:{} M:{} L:{} U:{})",
            self.vulnerabilities.total,
            self.vulnerabilities.critical,
            self.vulnerabilities.high,
            self.vulnerabilities.medium,
            self.vulnerabilities.low,
            self.vulnerabilities.unknown,
        );
        if self.vulnerabilities.total > 0 {
            writeln!(w, "Vulnerabilities: {}", vuln_str.yellow())?;
        } else {
            writeln!(w, "Vulnerabilities: {}", vuln_str.green())?;
        }

        if !self.findings.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{:<18} {:<10} {:<25} {:<15} {:<6} Fixed",
                "CVE", "Severity", "Package", "Version", "CVSS"
            )?;
            writeln!(w, "{}", "-".repeat(90))?;

            for f in &self.findings {
                let severity_colored = match f.severity.as_str() {
                    "CRITICAL" => f.severity.red().bold(),
                    "HIGH" => f.severity.red(),
                    "MEDIUM" => f.severity.yellow(),
                    "LOW" => f.severity.normal(),
                    "UNKNOWN" => f.severity.dimmed(),
                    _ => f.severity.normal(),
                };
                writeln!(
                    w,
                    "{:<18} {:<10} {:<25} {:<15} {:<6} {}",
                    f.cve_id,
                    severity_colored,
                    f.package,
                    f.version,
                    f.cvss_score
                        .map(|s| format!("{:.1}", s))
                        .unwrap_or_else(|| "-".to_owned()),
                    f.fixed_version.as_deref().unwrap_or("N/A"),
                )?;
            }
        }

        writeln!(w)?;
        let verdict_colored = if self.gate.verdict == "PASS" {
            self.gate.verdict.green().bold()
        } else {
            self.gate.verdict.red().bold()
        };
        writeln!(
            w,
            "Gate: {} (threshold: {}, excepted: {})",
            verdict_colored, self.gate.threshold, self.gate.excepted_count,
        )?;

        Ok(())
    }
}
