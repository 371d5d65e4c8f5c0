use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warn => "warn",
            NotifyLevel::Error => "error",
        })
    }
}

/// Extra context attached to a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// Stable category, e.g. `evidence-stale`
    pub kind: Option<String>,
    /// What caused the check, e.g. `poll`
    pub trigger: Option<String>,
}

impl NotifyOptions {
    pub fn kind(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: &str) -> Self {
        self.trigger = Some(trigger.to_string());
        self
    }
}

/// Single user-facing alert seam
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotifyLevel, options: &NotifyOptions);
}

/// Routes notifications to the log at the matching level
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel, options: &NotifyOptions) {
        let kind = options.kind.as_deref().unwrap_or("general");
        let trigger = options.trigger.as_deref().unwrap_or("-");
        match level {
            NotifyLevel::Info => info!(kind, trigger, "{}", message),
            NotifyLevel::Warn => warn!(kind, trigger, "{}", message),
            NotifyLevel::Error => error!(kind, trigger, "{}", message),
        }
    }
}

/// Human-readable duration such as `2m 10s` or `1h 5m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) if seconds == 0 => format!("{}m", minutes),
        (0, _) => format!("{}m {}s", minutes, seconds),
        (_, 0) => format!("{}h", hours),
        _ => format!("{}h {}m", hours, minutes),
    }
}
