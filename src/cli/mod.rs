pub mod app;
pub mod commands;

pub use app::{Cli, Commands, LogLevel, OutputFormat};

use commands::{
    evidence::EvidenceCommand, gate::GateCommand, guard::GuardCommand, tree::TreeCommand,
    watch::WatchCommand, CommandHandler,
};

/// Build the handler for a parsed subcommand
pub fn handler_for(command: Commands) -> Box<dyn CommandHandler> {
    match command {
        Commands::Gate {
            stage,
            rules,
            facts,
            strict,
            format,
            evidence_out,
            platform,
        } => Box::new(GateCommand {
            stage,
            rules,
            facts,
            strict,
            format,
            evidence_out,
            platform,
        }),
        Commands::Evidence { path, format } => Box::new(EvidenceCommand { path, format }),
        Commands::Tree { format } => Box::new(TreeCommand { format }),
        Commands::Guard { once } => Box::new(GuardCommand { once }),
        Commands::Watch {
            stage,
            rules,
            facts,
            platform,
            metrics_dir,
        } => Box::new(WatchCommand {
            stage,
            rules,
            facts,
            platform,
            metrics_dir,
        }),
    }
}
