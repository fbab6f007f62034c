use anyhow::Result;
use clap::Parser;

use imagegate_core::config::ImagegateConfig;
use imagegate_core::error::{ConfigError, ImagegateError};
use imagegate_daemon::cli::DaemonCli;
use imagegate_daemon::logging;
use imagegate_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 파일이 없으면 기본값 + 환경변수로 기동
    let mut config = match ImagegateConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(ImagegateError::Config(ConfigError::FileNotFound { .. })) => {
            eprintln!(
                "config file {} not found, using defaults",
                cli.config.display()
            );
            let mut config = ImagegateConfig::default();
            config.apply_env_overrides();
            config
        }
        Err(e) => return Err(anyhow::anyhow!("failed to load config: {}", e)),
    };

    // CLI 인자가 최우선
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = config.scanner.backend.as_str(),
        "imagegate-daemon starting"
    );

    let orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("imagegate-daemon shut down");
    Ok(())
}
