use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use govern::config::settings::{GitTreeLimits, GuardSettings};
use govern::guard::evidence::{write_snapshot, EvidenceSnapshot};
use govern::guard::{
    EvidenceRefresher, GitStateProvider, GitTreeState, GuardCollaborators, ManualClock, Notifier,
    NotifyLevel, NotifyOptions, RealtimeGuard, RefreshOutcome, TreeStatus, KIND_CLEAN_TREE,
    KIND_DIRTY_TREE, KIND_EVIDENCE_FRESH, KIND_EVIDENCE_STALE, KIND_REFRESH,
};
use govern::state::{DirtyTreeRecord, GuardStateStore, MemoryStateStore};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, NotifyLevel, NotifyOptions)>>,
}

impl RecordingNotifier {
    fn of_kind(&self, kind: &str) -> Vec<(String, NotifyLevel, NotifyOptions)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, options)| options.kind.as_deref() == Some(kind))
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel, options: &NotifyOptions) {
        self.sent
            .lock()
            .unwrap()
            .push((message.to_string(), level, options.clone()));
    }
}

#[derive(Default)]
struct FakeRefresher {
    missing: bool,
    fail: bool,
    calls: AtomicUsize,
    release: Option<Arc<Notify>>,
}

#[async_trait]
impl EvidenceRefresher for FakeRefresher {
    fn is_available(&self) -> bool {
        !self.missing
    }

    async fn refresh(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if self.fail {
            Err(anyhow!("script exited with 1"))
        } else {
            Ok(())
        }
    }
}

struct FakeGit {
    state: Mutex<Option<GitTreeState>>,
}

impl FakeGit {
    fn new(state: GitTreeState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    fn set(&self, state: Option<GitTreeState>) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl GitStateProvider for FakeGit {
    async fn git_tree_state(&self) -> Result<GitTreeState> {
        self.state
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("not a git repository"))
    }
}

struct Harness {
    _dir: TempDir,
    evidence: PathBuf,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    git: Arc<FakeGit>,
    store: Arc<MemoryStateStore>,
    guard: RealtimeGuard,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

fn settings() -> GuardSettings {
    GuardSettings {
        stale_threshold: Duration::from_secs(60),
        reminder_interval: Duration::from_secs(300),
        inactivity_grace: Duration::from_secs(120),
        auto_refresh_cooldown: Duration::from_secs(180),
        git_tree_limits: GitTreeLimits {
            staged: 10,
            unstaged: 15,
            total: 20,
        },
        git_tree_reminder: Duration::from_secs(300),
        ..GuardSettings::default()
    }
}

fn harness(settings: GuardSettings, refresher: Option<Arc<FakeRefresher>>) -> Harness {
    harness_with_store(settings, refresher, Arc::new(MemoryStateStore::new()))
}

fn harness_with_store(
    settings: GuardSettings,
    refresher: Option<Arc<FakeRefresher>>,
    store: Arc<MemoryStateStore>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let evidence = dir.path().join(".AI_EVIDENCE.json");
    let clock = Arc::new(ManualClock::new(t0()));
    let notifier = Arc::new(RecordingNotifier::default());
    let git = Arc::new(FakeGit::new(GitTreeState::default()));

    let guard = RealtimeGuard::new(
        settings,
        evidence.clone(),
        GuardCollaborators {
            clock: clock.clone(),
            notifier: notifier.clone(),
            refresher: refresher.map(|r| r as Arc<dyn EvidenceRefresher>),
            git: git.clone(),
            store: store.clone(),
        },
    );

    Harness {
        _dir: dir,
        evidence,
        clock,
        notifier,
        git,
        store,
        guard,
    }
}

fn write_evidence(path: &Path, at: DateTime<Utc>) {
    write_snapshot(path, &EvidenceSnapshot::from_violations("session", at, vec![])).unwrap();
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn ago(n: i64) -> DateTime<Utc> {
    t0() - chrono::Duration::seconds(n)
}

#[tokio::test]
async fn test_stale_evidence_alerts_when_user_idle() {
    let h = harness(settings(), None);
    write_evidence(&h.evidence, ago(130));

    h.clock.set(ago(500));
    h.guard.record_user_activity();
    h.clock.set(t0());

    assert!(h.guard.evaluate_evidence_age("poll", None));

    let alerts = h.notifier.of_kind(KIND_EVIDENCE_STALE);
    assert_eq!(alerts.len(), 1);
    let (message, level, options) = &alerts[0];
    assert_eq!(*level, NotifyLevel::Warn);
    assert_eq!(options.trigger.as_deref(), Some("poll"));
    assert!(message.contains("2m 10s"), "message: {}", message);
}

#[tokio::test]
async fn test_recent_activity_suppresses_alert() {
    let h = harness(settings(), None);
    write_evidence(&h.evidence, ago(130));

    h.clock.set(ago(10));
    h.guard.record_user_activity();
    h.clock.set(t0());

    assert!(h.guard.evaluate_evidence_age("poll", None));
    assert!(h.notifier.of_kind(KIND_EVIDENCE_STALE).is_empty());
}

#[tokio::test]
async fn test_missing_evidence_is_maximally_stale() {
    let h = harness(settings(), None);
    assert!(h.guard.evaluate_evidence_age("startup", None));

    let alerts = h.notifier.of_kind(KIND_EVIDENCE_STALE);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].0.contains("missing"));
}

#[tokio::test]
async fn test_stale_alert_is_debounced_by_reminder_interval() {
    let h = harness(settings(), None);

    assert!(h.guard.trigger_stale_alert("poll", Some(secs(90))));
    h.clock.advance(secs(120));
    assert!(!h.guard.trigger_stale_alert("poll", Some(secs(210))));
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_STALE).len(), 1);

    h.clock.advance(secs(180));
    assert!(h.guard.trigger_stale_alert("poll", Some(secs(390))));
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_STALE).len(), 2);
}

#[tokio::test]
async fn test_recovery_notifies_once_and_rearms_reminder() {
    let h = harness(settings(), None);
    write_evidence(&h.evidence, ago(600));
    assert!(h.guard.evaluate_evidence_age("poll", None));
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_STALE).len(), 1);

    write_evidence(&h.evidence, ago(5));
    assert!(!h.guard.evaluate_evidence_age("poll", None));
    assert!(!h.guard.evaluate_evidence_age("poll", None));
    let fresh = h.notifier.of_kind(KIND_EVIDENCE_FRESH);
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].1, NotifyLevel::Info);

    // A relapse alerts immediately instead of waiting out the old reminder
    h.clock.advance(secs(120));
    assert!(h.guard.evaluate_evidence_age("poll", None));
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_STALE).len(), 2);
}

#[tokio::test]
async fn test_explicit_was_stale_announces_recovery() {
    let h = harness(settings(), None);
    write_evidence(&h.evidence, ago(1));
    assert!(!h.guard.evaluate_evidence_age("manual", Some(true)));
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_FRESH).len(), 1);
}

#[tokio::test]
async fn test_auto_refresh_skip_order() {
    // Disabled wins over everything
    let mut disabled = settings();
    disabled.auto_refresh_enabled = false;
    let h = harness(disabled, None);
    assert_eq!(h.guard.attempt_auto_refresh("stale").await, RefreshOutcome::Disabled);

    // Then a missing script, even with fresh evidence
    let missing = Arc::new(FakeRefresher {
        missing: true,
        ..Default::default()
    });
    let h = harness(settings(), Some(missing.clone()));
    write_evidence(&h.evidence, ago(1));
    assert_eq!(
        h.guard.attempt_auto_refresh("stale").await,
        RefreshOutcome::ScriptMissing
    );
    let h = harness(settings(), None);
    assert_eq!(
        h.guard.attempt_auto_refresh("stale").await,
        RefreshOutcome::ScriptMissing
    );

    // Then fresh evidence
    let refresher = Arc::new(FakeRefresher::default());
    let h = harness(settings(), Some(refresher.clone()));
    write_evidence(&h.evidence, ago(1));
    assert_eq!(
        h.guard.attempt_auto_refresh("stale").await,
        RefreshOutcome::EvidenceFresh
    );
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auto_refresh_cooldown() {
    let refresher = Arc::new(FakeRefresher::default());
    let h = harness(settings(), Some(refresher.clone()));
    write_evidence(&h.evidence, ago(600));

    assert_eq!(h.guard.attempt_auto_refresh("stale").await, RefreshOutcome::Refreshed);
    assert_eq!(h.guard.snapshot().last_auto_refresh, Some(t0()));

    h.clock.advance(secs(179));
    assert_eq!(
        h.guard.attempt_auto_refresh("stale").await,
        RefreshOutcome::CoolingDown
    );
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    h.clock.advance(secs(1));
    assert_eq!(h.guard.attempt_auto_refresh("stale").await, RefreshOutcome::Refreshed);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.notifier.of_kind(KIND_REFRESH).len(), 2);
}

#[tokio::test]
async fn test_auto_refresh_in_flight_guard() {
    let release = Arc::new(Notify::new());
    let refresher = Arc::new(FakeRefresher {
        release: Some(release.clone()),
        ..Default::default()
    });
    let h = harness(settings(), Some(refresher.clone()));
    write_evidence(&h.evidence, ago(600));

    let first = {
        let guard = h.guard.clone();
        tokio::spawn(async move { guard.attempt_auto_refresh("stale").await })
    };
    while !h.guard.snapshot().auto_refresh_in_flight {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.guard.attempt_auto_refresh("poll").await, RefreshOutcome::InFlight);

    release.notify_one();
    assert_eq!(first.await.unwrap(), RefreshOutcome::Refreshed);
    assert!(!h.guard.snapshot().auto_refresh_in_flight);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_refresh_clears_flag_and_starts_cooldown() {
    let refresher = Arc::new(FakeRefresher {
        fail: true,
        ..Default::default()
    });
    let h = harness(settings(), Some(refresher));
    write_evidence(&h.evidence, ago(600));

    let outcome = h.guard.attempt_auto_refresh("stale").await;
    assert!(matches!(outcome, RefreshOutcome::Failed(ref e) if e.contains("exited with 1")));

    let state = h.guard.snapshot();
    assert!(!state.auto_refresh_in_flight);
    assert_eq!(state.last_auto_refresh, Some(t0()));

    let refresh_notes = h.notifier.of_kind(KIND_REFRESH);
    assert_eq!(refresh_notes.len(), 1);
    assert_eq!(refresh_notes[0].1, NotifyLevel::Error);
    assert_eq!(
        h.guard.attempt_auto_refresh("stale").await,
        RefreshOutcome::CoolingDown
    );
}

#[tokio::test]
async fn test_stale_alert_kicks_off_refresh() {
    let refresher = Arc::new(FakeRefresher::default());
    let h = harness(settings(), Some(refresher.clone()));
    write_evidence(&h.evidence, ago(600));

    assert!(h.guard.evaluate_evidence_age("poll", None));
    for _ in 0..50 {
        if refresher.calls.load(Ordering::SeqCst) > 0 && !h.guard.snapshot().auto_refresh_in_flight {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dirty_tree_notifies_persists_and_debounces() {
    let h = harness(settings(), None);
    let dirty = GitTreeState {
        staged: 12,
        working: 3,
        unique: 14,
    };
    h.git.set(Some(dirty));

    assert_eq!(
        h.guard.evaluate_git_tree().await,
        TreeStatus::Dirty {
            state: dirty,
            notified: true
        }
    );
    let alerts = h.notifier.of_kind(KIND_DIRTY_TREE);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].0.contains("12 staged (limit 10)"));

    let record = h.store.snapshot().unwrap();
    assert!(record.active);
    assert_eq!((record.staged, record.working, record.unique), (12, 3, 14));
    assert_eq!(record.last_notified, Some(t0()));

    h.clock.advance(secs(60));
    assert_eq!(
        h.guard.evaluate_git_tree().await,
        TreeStatus::Dirty {
            state: dirty,
            notified: false
        }
    );
    h.clock.advance(secs(240));
    assert!(matches!(
        h.guard.evaluate_git_tree().await,
        TreeStatus::Dirty { notified: true, .. }
    ));
    assert_eq!(h.notifier.of_kind(KIND_DIRTY_TREE).len(), 2);
}

#[tokio::test]
async fn test_tree_back_within_limits_resolves_once() {
    let h = harness(settings(), None);
    h.git.set(Some(GitTreeState {
        staged: 0,
        working: 30,
        unique: 30,
    }));
    h.guard.evaluate_git_tree().await;
    assert!(h.guard.snapshot().dirty_tree_active);

    // Dirty but inside every limit counts as clean
    let small = GitTreeState {
        staged: 2,
        working: 1,
        unique: 3,
    };
    h.git.set(Some(small));
    assert_eq!(h.guard.evaluate_git_tree().await, TreeStatus::Clean(small));
    assert_eq!(h.guard.evaluate_git_tree().await, TreeStatus::Clean(small));

    assert_eq!(h.notifier.of_kind(KIND_CLEAN_TREE).len(), 1);
    assert!(!h.guard.snapshot().dirty_tree_active);
    assert_eq!(h.store.snapshot(), None);
}

#[tokio::test]
async fn test_git_failure_changes_nothing() {
    let h = harness(settings(), None);
    h.git.set(None);
    assert_eq!(h.guard.evaluate_git_tree().await, TreeStatus::Unavailable);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_persisted_state_carries_reminder_across_processes() {
    let store = Arc::new(MemoryStateStore::new());
    store
        .save_dirty_tree(&DirtyTreeRecord {
            active: true,
            staged: 11,
            working: 0,
            unique: 11,
            last_notified: Some(ago(60)),
        })
        .await
        .unwrap();

    let h = harness_with_store(settings(), None, store);
    h.guard.restore_persisted_state().await;
    assert!(h.guard.snapshot().dirty_tree_active);

    h.git.set(Some(GitTreeState {
        staged: 11,
        working: 0,
        unique: 11,
    }));
    assert!(matches!(
        h.guard.evaluate_git_tree().await,
        TreeStatus::Dirty { notified: false, .. }
    ));
}

#[tokio::test]
async fn test_monitors_refuse_useless_configuration() {
    let mut zero = settings();
    zero.evidence_poll_interval = Duration::ZERO;
    zero.git_tree_limits = GitTreeLimits {
        staged: 0,
        unstaged: 0,
        total: 0,
    };
    let h = harness(zero, None);
    assert!(!h.guard.start_evidence_polling());
    assert!(!h.guard.start_git_tree_monitoring());

    let mut no_threshold = settings();
    no_threshold.stale_threshold = Duration::ZERO;
    no_threshold.git_tree_interval = Duration::ZERO;
    let h = harness(no_threshold, None);
    assert!(!h.guard.start_evidence_polling());
    assert!(!h.guard.start_git_tree_monitoring());
}

#[tokio::test]
async fn test_monitors_start_once_and_stop_repeatedly() {
    let h = harness(settings(), None);
    assert!(h.guard.start_evidence_polling());
    assert!(!h.guard.start_evidence_polling());
    assert!(h.guard.start_git_tree_monitoring());
    assert!(!h.guard.start_git_tree_monitoring());

    h.guard.stop();
    h.guard.stop();
    assert!(!h.guard.is_polling_evidence());
    assert!(!h.guard.is_monitoring_git_tree());
}

#[tokio::test(start_paused = true)]
async fn test_polling_timer_drives_evaluation() {
    let mut fast = settings();
    fast.evidence_poll_interval = secs(30);
    let h = harness(fast, None);
    write_evidence(&h.evidence, ago(600));

    assert!(h.guard.start_evidence_polling());
    tokio::time::sleep(secs(10)).await;
    assert!(h.notifier.of_kind(KIND_EVIDENCE_STALE).is_empty());

    tokio::time::sleep(secs(25)).await;
    let alerts = h.notifier.of_kind(KIND_EVIDENCE_STALE);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].2.trigger.as_deref(), Some("poll"));

    // Manual clock has not moved: later polls stay debounced
    tokio::time::sleep(secs(60)).await;
    assert_eq!(h.notifier.of_kind(KIND_EVIDENCE_STALE).len(), 1);
    h.guard.stop();
}

/// Holds each save until released
#[derive(Default)]
struct SlowStore {
    saved: MemoryStateStore,
    release: Arc<Notify>,
    saves: AtomicUsize,
}

#[async_trait]
impl GuardStateStore for SlowStore {
    async fn load_dirty_tree(&self) -> Result<Option<DirtyTreeRecord>> {
        self.saved.load_dirty_tree().await
    }

    async fn save_dirty_tree(&self, record: &DirtyTreeRecord) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        self.saved.save_dirty_tree(record).await
    }

    async fn clear_dirty_tree(&self) -> Result<()> {
        self.saved.clear_dirty_tree().await
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_running_tree_check_persist() {
    let mut fast = settings();
    fast.git_tree_interval = secs(10);
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SlowStore::default());
    let guard = RealtimeGuard::new(
        fast,
        dir.path().join(".AI_EVIDENCE.json"),
        GuardCollaborators {
            clock: Arc::new(ManualClock::new(t0())),
            notifier: Arc::new(RecordingNotifier::default()),
            refresher: None,
            git: Arc::new(FakeGit::new(GitTreeState {
                staged: 12,
                working: 3,
                unique: 14,
            })),
            store: store.clone(),
        },
    );

    assert!(guard.start_git_tree_monitoring());
    tokio::time::sleep(secs(11)).await;
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(store.saved.snapshot(), None);

    guard.stop();
    store.release.notify_one();
    tokio::time::sleep(secs(60)).await;

    let record = store.saved.snapshot().unwrap();
    assert!(record.active);
    assert_eq!((record.staged, record.working, record.unique), (12, 3, 14));
    assert_eq!(record.last_notified, Some(t0()));
    // No further checks once stopped
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
}
