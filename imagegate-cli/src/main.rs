use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;

mod cli;
mod commands;
mod error;
mod output;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 로그는 stderr로 -- stdout은 명령 출력 전용
    let log_level = cli.log_level.as_deref().unwrap_or("warn");
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let writer = OutputWriter::new(cli.output);

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &cli.config, &writer).await,
        Commands::Exceptions(args) => {
            commands::exceptions::execute(args, &cli.config, &writer).await
        }
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Status(args) => commands::status::execute(args, &cli.config, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}
