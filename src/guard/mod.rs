//! Realtime guard
//!
//! Two independent monitors share one [`GuardRuntimeState`]:
//!
//! - Evidence freshness: polls the evidence snapshot, alerts when it goes
//!   stale while the user is idle, and triggers a cooldown-gated refresh.
//! - Working-tree drift: polls git change counts and alerts when any
//!   configured limit is exceeded, persisting the dirty state.
//!
//! Both axes are debounced by their own reminder interval. Recovery
//! (stale to fresh, dirty to clean) always notifies once.
//!
//! The runtime state lives behind a mutex that is never held across an
//! await point; collaborator calls happen with the lock released.

pub mod clock;
pub mod evidence;
pub mod git_tree;
pub mod notify;
pub mod refresh;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::settings::{GitTreeLimits, GuardSettings};
use crate::state::guard::{elapsed, DirtyTreeRecord, GuardRuntimeState};
use crate::state::store::{GitConfigStore, GuardStateStore, MemoryStateStore};
use crate::timer::TimerHandle;
use crate::Result;

pub use clock::{Clock, ManualClock, SystemClock};
pub use evidence::{read_evidence_timestamp, EvidenceSnapshot};
pub use git_tree::{is_tree_beyond_limit, GitCli, GitStateProvider, GitTreeState};
pub use notify::{format_duration, Notifier, NotifyLevel, NotifyOptions, TracingNotifier};
pub use refresh::{EvidenceRefresher, ScriptRefresher};

pub const KIND_EVIDENCE_STALE: &str = "evidence-stale";
pub const KIND_EVIDENCE_FRESH: &str = "evidence-fresh";
pub const KIND_REFRESH: &str = "evidence-refresh";
pub const KIND_DIRTY_TREE: &str = "git-tree-dirty";
pub const KIND_CLEAN_TREE: &str = "git-tree-clean";

/// Why an auto-refresh did or did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Disabled,
    ScriptMissing,
    EvidenceFresh,
    CoolingDown,
    InFlight,
    Refreshed,
    Failed(String),
}

/// Result of one working-tree evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeStatus {
    Clean(GitTreeState),
    Dirty { state: GitTreeState, notified: bool },
    /// The git collaborator failed; nothing changed
    Unavailable,
}

/// Collaborators the guard talks to
pub struct GuardCollaborators {
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub refresher: Option<Arc<dyn EvidenceRefresher>>,
    pub git: Arc<dyn GitStateProvider>,
    pub store: Arc<dyn GuardStateStore>,
}

impl GuardCollaborators {
    /// Production wiring for a repository checkout.
    ///
    /// Fails only when auto-refresh is enabled and its command line cannot
    /// be resolved.
    pub fn for_repo(repo_root: &Path, settings: &GuardSettings) -> Result<Self> {
        let refresher = settings
            .refresh_command(repo_root)?
            .map(|(program, args)| {
                Arc::new(ScriptRefresher::new(
                    program,
                    args,
                    repo_root,
                    settings.refresh_timeout,
                )) as Arc<dyn EvidenceRefresher>
            });

        let store: Arc<dyn GuardStateStore> = if repo_root.join(".git").exists() {
            Arc::new(GitConfigStore::new(repo_root))
        } else {
            debug!("No .git directory, guard state is kept in memory");
            Arc::new(MemoryStateStore::new())
        };

        Ok(Self {
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            refresher,
            git: Arc::new(GitCli::new(repo_root)),
            store,
        })
    }
}

#[derive(Clone)]
pub struct RealtimeGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    settings: GuardSettings,
    evidence_path: PathBuf,
    collaborators: GuardCollaborators,
    state: Mutex<GuardRuntimeState>,
    evidence_timer: Mutex<Option<TimerHandle>>,
    tree_timer: Mutex<Option<TimerHandle>>,
}

/// Clears the in-flight flag however the refresh future ends
struct InFlight<'a> {
    guard: &'a RealtimeGuard,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let now = self.guard.now();
        let mut state = self.guard.state();
        state.auto_refresh_in_flight = false;
        state.last_auto_refresh = Some(now);
    }
}

impl RealtimeGuard {
    pub fn new(settings: GuardSettings, evidence_path: PathBuf, collaborators: GuardCollaborators) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                settings,
                evidence_path,
                collaborators,
                state: Mutex::new(GuardRuntimeState::new()),
                evidence_timer: Mutex::new(None),
                tree_timer: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &GuardSettings {
        &self.inner.settings
    }

    pub fn evidence_path(&self) -> &Path {
        &self.inner.evidence_path
    }

    /// Copy of the current runtime state
    pub fn snapshot(&self) -> GuardRuntimeState {
        self.state().clone()
    }

    pub fn record_user_activity(&self) {
        let now = self.now();
        self.state().last_user_activity_at = Some(now);
        debug!("User activity recorded at {}", now);
    }

    /// Load persisted dirty-tree state from the store
    pub async fn restore_persisted_state(&self) {
        let store = &self.inner.collaborators.store;
        match store.load_dirty_tree().await {
            Ok(Some(record)) => {
                debug!("Restored dirty-tree state from {} store", store.name());
                self.state().restore_dirty_tree(&record);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load guard state from {}: {:#}", store.name(), e),
        }
    }

    // ---- evidence axis ----

    /// Age of the evidence, `None` when missing or unreadable
    pub fn evidence_age(&self) -> Option<Duration> {
        read_evidence_timestamp(&self.inner.evidence_path).map(|at| elapsed(self.now(), at))
    }

    fn is_stale(&self, age: Option<Duration>) -> bool {
        age.map_or(true, |age| age > self.inner.settings.stale_threshold)
    }

    /// Check evidence freshness and alert or announce recovery.
    ///
    /// `was_stale` overrides the remembered previous state. Returns whether
    /// the evidence is stale now.
    pub fn evaluate_evidence_age(&self, trigger: &str, was_stale: Option<bool>) -> bool {
        let age = self.evidence_age();
        let stale = self.is_stale(age);
        let now = self.now();

        let (was_stale, user_inactive) = {
            let mut state = self.state();
            let was_stale = was_stale.unwrap_or(state.evidence_stale);
            state.evidence_stale = stale;
            if !stale && was_stale {
                state.last_stale_notification = None;
            }
            (
                was_stale,
                state.user_inactive(now, self.inner.settings.inactivity_grace),
            )
        };

        if stale {
            if user_inactive {
                self.trigger_stale_alert(trigger, age);
            } else {
                debug!(trigger, "Evidence stale but user recently active; alert suppressed");
            }
        } else if was_stale {
            let message = format!(
                "Evidence is back within SLA (updated {} ago)",
                format_duration(age.unwrap_or_default())
            );
            self.notify(
                &message,
                NotifyLevel::Info,
                NotifyOptions::kind(KIND_EVIDENCE_FRESH).with_trigger(trigger),
            );
        }

        stale
    }

    /// Notify about stale evidence at most once per reminder interval.
    /// A delivered alert also kicks off an auto-refresh in the background.
    pub fn trigger_stale_alert(&self, trigger: &str, age: Option<Duration>) -> bool {
        let now = self.now();
        {
            let mut state = self.state();
            if !state.stale_reminder_due(now, self.inner.settings.reminder_interval) {
                debug!(trigger, "Stale alert debounced");
                return false;
            }
            state.last_stale_notification = Some(now);
        }

        let threshold = format_duration(self.inner.settings.stale_threshold);
        let message = match age {
            Some(age) => format!(
                "Evidence is stale: last updated {} ago (threshold {})",
                format_duration(age),
                threshold
            ),
            None => format!(
                "Evidence file {} is missing or unreadable (threshold {})",
                self.inner.evidence_path.display(),
                threshold
            ),
        };
        warn!(
            trigger,
            age_ms = age.map(|a| a.as_millis() as u64),
            "Stale evidence alert"
        );
        self.notify(
            &message,
            NotifyLevel::Warn,
            NotifyOptions::kind(KIND_EVIDENCE_STALE).with_trigger(trigger),
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let guard = self.clone();
                handle.spawn(async move {
                    guard.attempt_auto_refresh("stale").await;
                });
            }
            Err(_) => debug!("No async runtime, skipping auto-refresh"),
        }
        true
    }

    /// Run the refresh collaborator unless one of the skip conditions holds.
    /// Checked in order: disabled, script missing, evidence fresh, cooldown,
    /// already in flight.
    pub async fn attempt_auto_refresh(&self, trigger: &str) -> RefreshOutcome {
        let settings = &self.inner.settings;
        if !settings.auto_refresh_enabled {
            debug!(trigger, "Auto-refresh disabled");
            return RefreshOutcome::Disabled;
        }

        let refresher = match &self.inner.collaborators.refresher {
            Some(refresher) if refresher.is_available() => refresher.clone(),
            _ => {
                debug!(trigger, "Refresh script not present");
                return RefreshOutcome::ScriptMissing;
            }
        };

        if !self.is_stale(self.evidence_age()) {
            debug!(trigger, "Evidence already fresh");
            return RefreshOutcome::EvidenceFresh;
        }

        let now = self.now();
        {
            let mut state = self.state();
            if state.refresh_cooldown_active(now, settings.auto_refresh_cooldown) {
                debug!(trigger, "Auto-refresh cooling down");
                return RefreshOutcome::CoolingDown;
            }
            if state.auto_refresh_in_flight {
                debug!(trigger, "Auto-refresh already running");
                return RefreshOutcome::InFlight;
            }
            state.auto_refresh_in_flight = true;
        }

        info!(trigger, "Refreshing evidence");
        let result = {
            let _in_flight = InFlight { guard: self };
            refresher.refresh().await
        };

        match result {
            Ok(()) => {
                self.notify(
                    "Evidence refreshed automatically",
                    NotifyLevel::Info,
                    NotifyOptions::kind(KIND_REFRESH).with_trigger(trigger),
                );
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(trigger, "Evidence refresh failed: {}", message);
                self.notify(
                    &format!("Automatic evidence refresh failed: {}", message),
                    NotifyLevel::Error,
                    NotifyOptions::kind(KIND_REFRESH).with_trigger(trigger),
                );
                RefreshOutcome::Failed(message)
            }
        }
    }

    // ---- working-tree axis ----

    pub async fn evaluate_git_tree(&self) -> TreeStatus {
        let tree = match self.inner.collaborators.git.git_tree_state().await {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Failed to read git tree state: {:#}", e);
                return TreeStatus::Unavailable;
            }
        };

        let limits = self.inner.settings.git_tree_limits;
        if is_tree_beyond_limit(&tree, &limits) {
            let notified = self.handle_dirty_tree(&tree, &limits).await;
            TreeStatus::Dirty {
                state: tree,
                notified,
            }
        } else {
            self.resolve_dirty_tree(&tree).await;
            TreeStatus::Clean(tree)
        }
    }

    /// Mark the tree dirty, notify subject to the reminder, and persist.
    /// Returns whether a notification was sent.
    pub async fn handle_dirty_tree(&self, tree: &GitTreeState, limits: &GitTreeLimits) -> bool {
        let now = self.now();
        let (notified, last_notified) = {
            let mut state = self.state();
            state.dirty_tree_active = true;
            let due = state.dirty_reminder_due(now, self.inner.settings.git_tree_reminder);
            if due {
                state.last_dirty_tree_notification = Some(now);
            }
            (due, state.last_dirty_tree_notification)
        };

        if notified {
            let message = format!(
                "Working tree is too large: {}. Commit or stash before continuing",
                git_tree::exceeded_limits(tree, limits).join(", ")
            );
            warn!(
                staged = tree.staged,
                working = tree.working,
                unique = tree.unique,
                "Dirty tree alert"
            );
            self.notify(
                &message,
                NotifyLevel::Warn,
                NotifyOptions::kind(KIND_DIRTY_TREE),
            );
        } else {
            debug!("Dirty tree alert debounced");
        }

        let record = DirtyTreeRecord {
            active: true,
            staged: tree.staged,
            working: tree.working,
            unique: tree.unique,
            last_notified,
        };
        let store = &self.inner.collaborators.store;
        if let Err(e) = store.save_dirty_tree(&record).await {
            warn!("Failed to persist dirty-tree state to {}: {:#}", store.name(), e);
        }

        notified
    }

    /// Clear any active dirty state; announces the recovery once
    pub async fn resolve_dirty_tree(&self, tree: &GitTreeState) {
        let was_active = {
            let mut state = self.state();
            let was_active = state.dirty_tree_active;
            state.dirty_tree_active = false;
            state.last_dirty_tree_notification = None;
            was_active
        };
        if !was_active {
            return;
        }

        let message = format!(
            "Working tree back within limits ({} staged, {} unstaged)",
            tree.staged, tree.working
        );
        self.notify(
            &message,
            NotifyLevel::Info,
            NotifyOptions::kind(KIND_CLEAN_TREE),
        );

        let store = &self.inner.collaborators.store;
        if let Err(e) = store.clear_dirty_tree().await {
            warn!("Failed to clear dirty-tree state in {}: {:#}", store.name(), e);
        }
    }

    // ---- timers ----

    /// Start polling evidence freshness. Returns false when already running
    /// or when the interval or stale threshold is zero.
    pub fn start_evidence_polling(&self) -> bool {
        let settings = &self.inner.settings;
        if settings.evidence_poll_interval.is_zero() || settings.stale_threshold.is_zero() {
            debug!("Evidence polling disabled by configuration");
            return false;
        }

        let mut timer = lock(&self.inner.evidence_timer);
        if timer.is_some() {
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        *timer = TimerHandle::spawn("evidence-poll", settings.evidence_poll_interval, move || {
            let guard = upgrade(&weak);
            async move {
                if let Some(guard) = guard {
                    guard.evaluate_evidence_age("poll", None);
                }
            }
        });
        info!(
            "Evidence polling every {}",
            format_duration(settings.evidence_poll_interval)
        );
        timer.is_some()
    }

    /// Start polling the working tree. Returns false when already running,
    /// when the interval is zero, or when every limit is disabled.
    pub fn start_git_tree_monitoring(&self) -> bool {
        let settings = &self.inner.settings;
        if settings.git_tree_interval.is_zero() || !settings.git_tree_limits.any_enabled() {
            debug!("Git tree monitoring disabled by configuration");
            return false;
        }

        let mut timer = lock(&self.inner.tree_timer);
        if timer.is_some() {
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        *timer = TimerHandle::spawn("git-tree", settings.git_tree_interval, move || {
            let guard = upgrade(&weak);
            async move {
                if let Some(guard) = guard {
                    guard.evaluate_git_tree().await;
                }
            }
        });
        info!(
            "Git tree monitoring every {}",
            format_duration(settings.git_tree_interval)
        );
        timer.is_some()
    }

    pub fn is_polling_evidence(&self) -> bool {
        lock(&self.inner.evidence_timer).is_some()
    }

    pub fn is_monitoring_git_tree(&self) -> bool {
        lock(&self.inner.tree_timer).is_some()
    }

    /// Stop both monitors. Safe to call repeatedly. A check already running
    /// finishes, persistence included.
    pub fn stop(&self) {
        for timer in [&self.inner.evidence_timer, &self.inner.tree_timer] {
            if let Some(handle) = lock(timer).take() {
                debug!("Stopping {} timer", handle.name());
                handle.cancel();
            }
        }
    }

    // ---- helpers ----

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.collaborators.clock.now()
    }

    fn state(&self) -> MutexGuard<'_, GuardRuntimeState> {
        lock(&self.inner.state)
    }

    fn notify(&self, message: &str, level: NotifyLevel, options: NotifyOptions) {
        self.inner
            .collaborators
            .notifier
            .notify(message, level, &options);
    }
}

fn upgrade(weak: &Weak<GuardInner>) -> Option<RealtimeGuard> {
    weak.upgrade().map(|inner| RealtimeGuard { inner })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
