pub mod evidence;
pub mod gate;
pub mod guard;
pub mod tree;
pub mod watch;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::settings::Settings;
use crate::Result;

/// Common trait for all command handlers
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult>;

    /// Command name for logging
    fn name(&self) -> &'static str;
}

/// Resolved repository root and settings shared by every command
pub struct CommandContext {
    pub repo_root: PathBuf,
    pub settings: Settings,
}

impl CommandContext {
    pub fn new(repo_root: PathBuf, settings: Settings) -> Self {
        Self {
            repo_root,
            settings,
        }
    }

    /// Load settings for a repository from config files and the environment
    pub fn load(repo_root: PathBuf) -> Self {
        let settings = Settings::load(&repo_root);
        Self::new(repo_root, settings)
    }

    /// Resolve a user-supplied path against the repository root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        }
    }
}

/// Command execution result
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Success with optional message
    Success(Option<String>),
    /// Non-blocking problem
    Warning(String),
    /// The checked condition fails; the caller should stop
    Blocked(String),
}

impl CommandResult {
    /// Convert to exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandResult::Success(_) | CommandResult::Warning(_) => 0,
            CommandResult::Blocked(_) => 1,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CommandResult::Success(message) => message.as_deref(),
            CommandResult::Warning(message) | CommandResult::Blocked(message) => Some(message),
        }
    }
}
