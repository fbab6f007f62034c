//! Command handlers -- one module per subcommand

use std::path::Path;

use imagegate_core::config::ImagegateConfig;
use imagegate_core::error::{ConfigError, ImagegateError};

use crate::error::CliError;

pub mod config;
pub mod exceptions;
pub mod scan;
pub mod status;

/// Load the effective configuration for a subcommand.
///
/// A missing file is not an error: the CLI falls back to defaults plus
/// environment overrides, same as the daemon.
pub(crate) async fn load_config(path: &Path) -> Result<ImagegateConfig, CliError> {
    match ImagegateConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(ImagegateError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = ImagegateConfig::default();
            config.apply_env_overrides();
            config
                .validate()
                .map_err(|e| CliError::Config(e.to_string()))?;
            Ok(config)
        }
        Err(e) => Err(CliError::Config(e.to_string())),
    }
}
