use async_trait::async_trait;
use serde_json::json;

use super::{CommandContext, CommandHandler, CommandResult};
use crate::cli::app::OutputFormat;
use crate::guard::git_tree::{exceeded_limits, GitCli, GitStateProvider};
use crate::{GovernError, Result};

pub struct TreeCommand {
    pub format: OutputFormat,
}

#[async_trait]
impl CommandHandler for TreeCommand {
    async fn execute(&self, context: &CommandContext) -> Result<CommandResult> {
        let limits = context.settings.guard.git_tree_limits;
        let tree = GitCli::new(&context.repo_root)
            .git_tree_state()
            .await
            .map_err(GovernError::Collaborator)?;
        let exceeded = exceeded_limits(&tree, &limits);

        match self.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "tree": tree,
                    "limits": limits,
                    "exceeded": exceeded,
                }))?
            ),
            OutputFormat::Text => {
                println!("Staged:   {:>4} (limit {})", tree.staged, limit_label(limits.staged));
                println!("Unstaged: {:>4} (limit {})", tree.working, limit_label(limits.unstaged));
                println!("Total:    {:>4} (limit {})", tree.unique, limit_label(limits.total));
            }
        }

        Ok(if exceeded.is_empty() {
            CommandResult::Success(None)
        } else {
            CommandResult::Warning(format!("Working tree too large: {}", exceeded.join(", ")))
        })
    }

    fn name(&self) -> &'static str {
        "tree"
    }
}

fn limit_label(limit: u64) -> String {
    if limit == 0 {
        "off".to_string()
    } else {
        limit.to_string()
    }
}
