//! Runtime settings for the guard and the scheduler.
//!
//! ## Sources (in precedence order)
//!
//! 1. `GOVERN_*` environment variables
//! 2. `.govern/config.yml` in the repository, else `config.yml` in the
//!    user config directory (`~/.config/govern/` on Linux)
//! 3. Built-in defaults
//!
//! Values that fail to parse are logged and ignored, so the next source
//! down the list wins. A zero interval or an all-zero set of limits turns
//! the corresponding monitor off.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{GovernError, Result};

pub const ENV_AUTO_REFRESH: &str = "GOVERN_AUTO_REFRESH";
pub const ENV_EVIDENCE_PATH: &str = "GOVERN_EVIDENCE_PATH";
pub const ENV_REFRESH_SCRIPT: &str = "GOVERN_REFRESH_SCRIPT";
pub const ENV_EVIDENCE_STALE_MS: &str = "GOVERN_EVIDENCE_STALE_MS";
pub const ENV_EVIDENCE_POLL_MS: &str = "GOVERN_EVIDENCE_POLL_MS";
pub const ENV_REMINDER_MS: &str = "GOVERN_REMINDER_MS";
pub const ENV_INACTIVITY_GRACE_MS: &str = "GOVERN_INACTIVITY_GRACE_MS";
pub const ENV_AUTO_REFRESH_COOLDOWN_MS: &str = "GOVERN_AUTO_REFRESH_COOLDOWN_MS";
pub const ENV_REFRESH_TIMEOUT_MS: &str = "GOVERN_REFRESH_TIMEOUT_MS";
pub const ENV_GIT_TREE_STAGED_LIMIT: &str = "GOVERN_GIT_TREE_STAGED_LIMIT";
pub const ENV_GIT_TREE_UNSTAGED_LIMIT: &str = "GOVERN_GIT_TREE_UNSTAGED_LIMIT";
pub const ENV_GIT_TREE_TOTAL_LIMIT: &str = "GOVERN_GIT_TREE_TOTAL_LIMIT";
pub const ENV_GIT_TREE_REMINDER_MS: &str = "GOVERN_GIT_TREE_REMINDER_MS";
pub const ENV_GIT_TREE_INTERVAL_MS: &str = "GOVERN_GIT_TREE_INTERVAL_MS";
pub const ENV_TICK_INTERVAL_MS: &str = "GOVERN_TICK_INTERVAL_MS";

const DEFAULT_EVIDENCE_PATH: &str = ".AI_EVIDENCE.json";
const DEFAULT_REFRESH_SCRIPT: &str = "scripts/update-evidence.sh";

/// Per-category working tree limits. Zero disables a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitTreeLimits {
    pub staged: u64,
    pub unstaged: u64,
    pub total: u64,
}

impl GitTreeLimits {
    /// At least one category has a usable threshold
    pub fn any_enabled(&self) -> bool {
        self.staged > 0 || self.unstaged > 0 || self.total > 0
    }
}

impl Default for GitTreeLimits {
    fn default() -> Self {
        Self {
            staged: 10,
            unstaged: 15,
            total: 20,
        }
    }
}

/// Realtime guard thresholds and intervals
#[derive(Debug, Clone, PartialEq)]
pub struct GuardSettings {
    pub auto_refresh_enabled: bool,
    /// Evidence file, relative paths resolve against the repository root
    pub evidence_path: PathBuf,
    /// Refresh command line; first word is the script
    pub refresh_script: String,
    pub stale_threshold: Duration,
    pub evidence_poll_interval: Duration,
    pub reminder_interval: Duration,
    /// User activity more recent than this silences stale alerts
    pub inactivity_grace: Duration,
    pub auto_refresh_cooldown: Duration,
    pub refresh_timeout: Duration,
    pub git_tree_limits: GitTreeLimits,
    pub git_tree_reminder: Duration,
    pub git_tree_interval: Duration,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            auto_refresh_enabled: true,
            evidence_path: PathBuf::from(DEFAULT_EVIDENCE_PATH),
            refresh_script: DEFAULT_REFRESH_SCRIPT.to_string(),
            stale_threshold: Duration::from_millis(180_000),
            evidence_poll_interval: Duration::from_millis(30_000),
            reminder_interval: Duration::from_millis(300_000),
            inactivity_grace: Duration::from_millis(120_000),
            auto_refresh_cooldown: Duration::from_millis(180_000),
            refresh_timeout: Duration::from_millis(120_000),
            git_tree_limits: GitTreeLimits::default(),
            git_tree_reminder: Duration::from_millis(300_000),
            git_tree_interval: Duration::from_millis(60_000),
        }
    }
}

impl GuardSettings {
    /// Evidence file resolved against the repository root
    pub fn evidence_file(&self, repo_root: &Path) -> PathBuf {
        if self.evidence_path.is_absolute() {
            self.evidence_path.clone()
        } else {
            repo_root.join(&self.evidence_path)
        }
    }

    /// Split the refresh command line into program and arguments.
    ///
    /// Fails when auto-refresh is on and the command line cannot be resolved;
    /// this is the one configuration error surfaced to guard setup.
    pub fn refresh_command(&self, repo_root: &Path) -> Result<Option<(PathBuf, Vec<String>)>> {
        if !self.auto_refresh_enabled {
            return Ok(None);
        }

        let words = shell_words::split(&self.refresh_script).map_err(|e| {
            GovernError::Config(format!(
                "Cannot parse refresh command '{}': {}",
                self.refresh_script, e
            ))
        })?;

        let mut words = words.into_iter();
        let program = words.next().ok_or_else(|| {
            GovernError::Config("Auto-refresh is enabled but no refresh command is set".to_string())
        })?;

        // Bare names like `bash` are left for PATH lookup
        let program = PathBuf::from(program);
        let program = if program.is_absolute() || program.components().count() == 1 {
            program
        } else {
            repo_root.join(program)
        };

        Ok(Some((program, words.collect())))
    }
}

/// Autonomous scheduler settings
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(30_000),
        }
    }
}

/// All runtime settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub guard: GuardSettings,
    pub scheduler: SchedulerSettings,
}

/// Settings file (`.govern/config.yml`); durations in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub auto_refresh: Option<bool>,
    #[serde(default)]
    pub evidence_path: Option<PathBuf>,
    #[serde(default)]
    pub refresh_script: Option<String>,
    #[serde(default)]
    pub evidence_stale_ms: Option<u64>,
    #[serde(default)]
    pub evidence_poll_ms: Option<u64>,
    #[serde(default)]
    pub reminder_ms: Option<u64>,
    #[serde(default)]
    pub inactivity_grace_ms: Option<u64>,
    #[serde(default)]
    pub auto_refresh_cooldown_ms: Option<u64>,
    #[serde(default)]
    pub refresh_timeout_ms: Option<u64>,
    #[serde(default)]
    pub git_tree: Option<GitTreeLimitsFile>,
    #[serde(default)]
    pub git_tree_reminder_ms: Option<u64>,
    #[serde(default)]
    pub git_tree_interval_ms: Option<u64>,
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitTreeLimitsFile {
    #[serde(default)]
    pub staged: Option<u64>,
    #[serde(default)]
    pub unstaged: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: SettingsFile = serde_yaml_ng::from_str(&contents)?;
        Ok(file)
    }

    /// Project file first, then the user-level file
    pub fn discover(repo_root: &Path) -> Option<Self> {
        let project = repo_root.join(".govern").join("config.yml");
        let user = ProjectDirs::from("", "", "govern").map(|dirs| dirs.config_dir().join("config.yml"));

        std::iter::once(project)
            .chain(user)
            .filter(|path| path.exists())
            .find_map(|path| match Self::load(&path) {
                Ok(file) => {
                    debug!("Loaded settings from {:?}", path);
                    Some(file)
                }
                Err(e) => {
                    warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                    None
                }
            })
    }
}

impl Settings {
    /// Resolve settings for a repository from the process environment
    pub fn load(repo_root: &Path) -> Self {
        let file = SettingsFile::discover(repo_root);
        Self::from_sources(file.as_ref(), |key| std::env::var(key).ok())
    }

    /// Resolve settings from an optional file and an environment lookup
    pub fn from_sources<F>(file: Option<&SettingsFile>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(file) = file {
            settings.apply_file(file);
        }
        settings.apply_env(lookup);
        settings
    }

    fn apply_file(&mut self, file: &SettingsFile) {
        let guard = &mut self.guard;
        if let Some(enabled) = file.auto_refresh {
            guard.auto_refresh_enabled = enabled;
        }
        if let Some(path) = &file.evidence_path {
            guard.evidence_path = path.clone();
        }
        if let Some(script) = &file.refresh_script {
            guard.refresh_script = script.clone();
        }
        set_ms(&mut guard.stale_threshold, file.evidence_stale_ms);
        set_ms(&mut guard.evidence_poll_interval, file.evidence_poll_ms);
        set_ms(&mut guard.reminder_interval, file.reminder_ms);
        set_ms(&mut guard.inactivity_grace, file.inactivity_grace_ms);
        set_ms(&mut guard.auto_refresh_cooldown, file.auto_refresh_cooldown_ms);
        set_ms(&mut guard.refresh_timeout, file.refresh_timeout_ms);
        set_ms(&mut guard.git_tree_reminder, file.git_tree_reminder_ms);
        set_ms(&mut guard.git_tree_interval, file.git_tree_interval_ms);
        if let Some(limits) = &file.git_tree {
            if let Some(staged) = limits.staged {
                guard.git_tree_limits.staged = staged;
            }
            if let Some(unstaged) = limits.unstaged {
                guard.git_tree_limits.unstaged = unstaged;
            }
            if let Some(total) = limits.total {
                guard.git_tree_limits.total = total;
            }
        }
        set_ms(&mut self.scheduler.tick_interval, file.tick_interval_ms);
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let guard = &mut self.guard;

        if let Some(raw) = lookup(ENV_AUTO_REFRESH) {
            match parse_flag(&raw) {
                Some(enabled) => guard.auto_refresh_enabled = enabled,
                None => warn!("Ignoring {}={:?}: expected a boolean", ENV_AUTO_REFRESH, raw),
            }
        }
        if let Some(path) = lookup(ENV_EVIDENCE_PATH).filter(|v| !v.trim().is_empty()) {
            guard.evidence_path = PathBuf::from(path);
        }
        if let Some(script) = lookup(ENV_REFRESH_SCRIPT).filter(|v| !v.trim().is_empty()) {
            guard.refresh_script = script;
        }

        env_ms(&lookup, ENV_EVIDENCE_STALE_MS, &mut guard.stale_threshold);
        env_ms(&lookup, ENV_EVIDENCE_POLL_MS, &mut guard.evidence_poll_interval);
        env_ms(&lookup, ENV_REMINDER_MS, &mut guard.reminder_interval);
        env_ms(&lookup, ENV_INACTIVITY_GRACE_MS, &mut guard.inactivity_grace);
        env_ms(&lookup, ENV_AUTO_REFRESH_COOLDOWN_MS, &mut guard.auto_refresh_cooldown);
        env_ms(&lookup, ENV_REFRESH_TIMEOUT_MS, &mut guard.refresh_timeout);
        env_ms(&lookup, ENV_GIT_TREE_REMINDER_MS, &mut guard.git_tree_reminder);
        env_ms(&lookup, ENV_GIT_TREE_INTERVAL_MS, &mut guard.git_tree_interval);
        env_count(&lookup, ENV_GIT_TREE_STAGED_LIMIT, &mut guard.git_tree_limits.staged);
        env_count(&lookup, ENV_GIT_TREE_UNSTAGED_LIMIT, &mut guard.git_tree_limits.unstaged);
        env_count(&lookup, ENV_GIT_TREE_TOTAL_LIMIT, &mut guard.git_tree_limits.total);
        env_ms(&lookup, ENV_TICK_INTERVAL_MS, &mut self.scheduler.tick_interval);
    }
}

fn set_ms(target: &mut Duration, value: Option<u64>) {
    if let Some(ms) = value {
        *target = Duration::from_millis(ms);
    }
}

fn env_ms<F>(lookup: &F, key: &str, target: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match parse_count(&raw) {
            Some(ms) => *target = Duration::from_millis(ms),
            None => warn!("Ignoring {}={:?}: expected milliseconds", key, raw),
        }
    }
}

fn env_count<F>(lookup: &F, key: &str, target: &mut u64)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match parse_count(&raw) {
            Some(value) => *target = value,
            None => warn!("Ignoring {}={:?}: expected a non-negative integer", key, raw),
        }
    }
}

/// Non-negative integer, tolerating surrounding whitespace
pub fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
