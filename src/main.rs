use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use govern::cli::commands::{CommandContext, CommandResult};
use govern::cli::{handler_for, Cli, LogLevel};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_tracing(cli.log_level, cli.log_json);

    let repo_root = match std::fs::canonicalize(&cli.repo) {
        Ok(path) => path,
        Err(e) => {
            error!("Repository root {} is not accessible: {}", cli.repo.display(), e);
            return ExitCode::from(2);
        }
    };

    let context = CommandContext::load(repo_root);
    debug!("Running '{}' in {}", cli.command.name(), context.repo_root.display());
    let handler = handler_for(cli.command);

    match handler.execute(&context).await {
        Ok(result) => {
            match &result {
                CommandResult::Success(Some(message)) => eprintln!("{}", message),
                CommandResult::Success(None) => {}
                CommandResult::Warning(message) => warn!("{}", message),
                CommandResult::Blocked(message) => error!("{}", message),
            }
            ExitCode::from(result.exit_code())
        }
        Err(e) => {
            error!("{} failed: {}", handler.name(), e);
            ExitCode::from(2)
        }
    }
}

/// Logs always go to stderr; stdout is reserved for command output.
/// `RUST_LOG` takes precedence over `--log-level` when set.
fn initialize_tracing(log_level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
