use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::types::Stage;

/// govern: continuous governance for a development workflow
#[derive(Parser, Debug)]
#[command(name = "govern")]
#[command(version)]
#[command(about = "Stage gates, autonomous re-analysis and an evidence freshness guard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Emit logs as JSON (always on stderr)
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Repository root
    #[arg(long, default_value = ".", global = true)]
    pub repo: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate rules against facts and decide PASS / WARN / BLOCK
    Gate {
        /// Workflow stage (staged, pre-commit, pre-push, ci)
        #[arg(long, default_value = "pre-commit", value_parser = parse_stage)]
        stage: Stage,

        /// Rule file (YAML)
        #[arg(long, default_value = ".govern/rules.yml")]
        rules: PathBuf,

        /// Fact list (JSON)
        #[arg(long, default_value = ".govern/facts.json")]
        facts: PathBuf,

        /// Reject rule files without rules
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write an evidence snapshot derived from the findings
        #[arg(long)]
        evidence_out: Option<PathBuf>,

        /// Platform prefix for rule ids in the evidence snapshot
        #[arg(long, default_value = "backend")]
        platform: String,
    },

    /// Show evidence age and validate the snapshot contract
    Evidence {
        /// Evidence file (defaults to the configured path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show working tree counts against the configured limits
    Tree {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the realtime guard until interrupted
    Guard {
        /// Evaluate both monitors once and exit
        #[arg(long)]
        once: bool,
    },

    /// Re-run the gate whenever its inputs change, refreshing evidence
    Watch {
        /// Workflow stage (staged, pre-commit, pre-push, ci)
        #[arg(long, default_value = "pre-commit", value_parser = parse_stage)]
        stage: Stage,

        /// Rule file (YAML)
        #[arg(long, default_value = ".govern/rules.yml")]
        rules: PathBuf,

        /// Fact list (JSON)
        #[arg(long, default_value = ".govern/facts.json")]
        facts: PathBuf,

        /// Platform prefix for rule ids in the evidence snapshot
        #[arg(long, default_value = "backend")]
        platform: String,

        /// Directory for hook metrics (JSONL)
        #[arg(long)]
        metrics_dir: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Gate { .. } => "gate",
            Commands::Evidence { .. } => "evidence",
            Commands::Tree { .. } => "tree",
            Commands::Guard { .. } => "guard",
            Commands::Watch { .. } => "watch",
        }
    }
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    raw.parse().map_err(|e: crate::GovernError| e.to_string())
}
