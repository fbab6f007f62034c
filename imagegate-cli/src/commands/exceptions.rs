//! `imagegate exceptions` command handler

use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::info;

use imagegate_core::error::{GateError, ImagegateError};
use imagegate_core::types::Exception;
use imagegate_gate::store::{ExceptionStore, NewException};

use crate::cli::{ExceptionsAction, ExceptionsArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `exceptions` command.
///
/// Operates directly on the exception store file referenced by the
/// configuration. `approve` and `revoke` persist immediately.
pub async fn execute(
    args: ExceptionsArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let store = ExceptionStore::load(&config.gate.exceptions_path).await?;

    match args.action {
        ExceptionsAction::List { all } => execute_list(&store, all, writer).await,
        ExceptionsAction::Approve {
            cve_id,
            image,
            reason,
            approved_by,
            expires_in_days,
        } => {
            execute_approve(
                &store,
                NewException {
                    cve_id,
                    image_name: image,
                    reason,
                    approved_by,
                    expires_at: expires_in_days
                        .map(|days| SystemTime::now() + Duration::from_secs(days * 86_400)),
                },
                writer,
            )
            .await
        }
        ExceptionsAction::Revoke { exception_id } => {
            execute_revoke(&store, &exception_id, writer).await
        }
    }
}

async fn execute_list(
    store: &ExceptionStore,
    all: bool,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let now = SystemTime::now();
    let entries: Vec<ExceptionEntry> = store
        .snapshot()
        .await
        .into_iter()
        .filter(|e| all || e.is_valid_at(now))
        .map(|e| ExceptionEntry::from_exception(&e, now))
        .collect();

    writer.render(&ExceptionListReport { entries })?;
    Ok(())
}

async fn execute_approve(
    store: &ExceptionStore,
    new: NewException,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(cve_id = %new.cve_id, scope = new.image_name.as_deref().unwrap_or("*"), "approving exception");

    let exception = store.approve(new).await.map_err(|e| match e {
        ImagegateError::Gate(GateError::InvalidException(msg)) => CliError::Command(msg),
        other => CliError::Core(other),
    })?;

    let now = SystemTime::now();
    writer.render(&ExceptionEntry::from_exception(&exception, now))?;
    Ok(())
}

async fn execute_revoke(
    store: &ExceptionStore,
    exception_id: &str,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(exception_id, "revoking exception");

    let revoked = store.revoke(exception_id).await.map_err(|e| match e {
        ImagegateError::Gate(err @ GateError::ExceptionNotFound { .. }) => {
            CliError::Command(err.to_string())
        }
        other => CliError::Core(other),
    })?;

    let now = SystemTime::now();
    writer.render(&ExceptionEntry::from_exception(&revoked, now))?;
    Ok(())
}

#[derive(Serialize)]
pub struct ExceptionListReport {
    pub entries: Vec<ExceptionEntry>,
}

#[derive(Serialize)]
pub struct ExceptionEntry {
    pub id: String,
    pub cve_id: String,
    /// `*` means the exception applies to every image.
    pub scope: String,
    pub reason: String,
    pub approved_by: String,
    /// active, revoked, or expired.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_days: Option<u64>,
}

impl ExceptionEntry {
    fn from_exception(exception: &Exception, now: SystemTime) -> Self {
        let status = if !exception.is_active {
            "revoked"
        } else if exception.is_valid_at(now) {
            "active"
        } else {
            "expired"
        };

        let expires_in_days = exception
            .expires_at
            .and_then(|expiry| expiry.duration_since(now).ok())
            .map(|remaining| remaining.as_secs() / 86_400);

        Self {
            id: exception.id.clone(),
            cve_id: exception.cve_id.clone(),
            scope: exception
                .image_name
                .clone()
                .unwrap_or_else(|| "*".to_owned()),
            reason: exception.reason.clone(),
            approved_by: exception.approved_by.clone(),
            status: status.to_owned(),
            expires_in_days,
        }
    }
}

impl Render for ExceptionListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.entries.is_empty() {
            writeln!(w, "{}", "No exceptions.".dimmed())?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<38} {:<18} {:<20} {:<10} {:<8} Approved by",
            "ID", "CVE", "Scope", "Status", "Expires"
        )?;
        writeln!(w, "{}", "-".repeat(110))?;

        for entry in &self.entries {
            let status_colored = match entry.status.as_str() {
                "active" => entry.status.green(),
                "revoked" => entry.status.red(),
                "expired" => entry.status.yellow(),
                _ => entry.status.normal(),
            };
            writeln!(
                w,
                "{:<38} {:<18} {:<20} {:<10} {:<8} {}",
                entry.id,
                entry.cve_id,
                entry.scope,
                status_colored,
                entry
                    .expires_in_days
                    .map(|d| format!("{}d", d))
                    .unwrap_or_else(|| "never".to_owned()),
                entry.approved_by,
            )?;
        }

        Ok(())
    }
}

impl Render for ExceptionEntry {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Exception: {}", self.id.bold())?;
        writeln!(w, "  CVE: {}", self.cve_id)?;
        writeln!(w, "  Scope: {}", self.scope)?;
        writeln!(w, "  Status: {}", self.status)?;
        writeln!(w, "  Reason: {}", self.reason)?;
        writeln!(w, "  Approved by: {}", self.approved_by)?;
        if let Some(days) = self.expires_in_days {
            writeln!(w, "  Expires in: {}d", days)?;
        }
        Ok(())
    }
}
