//! CLI-specific error types and exit code mapping

use imagegate_core::error::ImagegateError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The scanner backend binary is not available.
    #[error("scanner not available: {0}")]
    ScannerUnavailable(String),

    /// The gate evaluated the scan and rejected the image.
    #[error("gate failed: {0}")]
    GateFailed(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from imagegate-core.
    #[error("{0}")]
    Core(#[from] ImagegateError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                 |
    /// |------|-----------------------------------------|
    /// | 0    | Success                                 |
    /// | 1    | General / command error                 |
    /// | 2    | Configuration error                     |
    /// | 3    | Scanner backend unavailable             |
    /// | 4    | Gate rejected the image (build blocker) |
    /// | 10   | IO error                                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::ScannerUnavailable(_) => 3,
            Self::GateFailed(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
