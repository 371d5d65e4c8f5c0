use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-memory bookkeeping of the realtime guard.
///
/// The evidence fields and the working-tree fields are written by separate
/// monitors and never overlap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardRuntimeState {
    pub last_user_activity_at: Option<DateTime<Utc>>,

    // Evidence axis
    pub evidence_stale: bool,
    pub last_stale_notification: Option<DateTime<Utc>>,
    pub last_auto_refresh: Option<DateTime<Utc>>,
    pub auto_refresh_in_flight: bool,

    // Working-tree axis
    pub dirty_tree_active: bool,
    pub last_dirty_tree_notification: Option<DateTime<Utc>>,
}

impl GuardRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the working-tree axis from a persisted record
    pub fn restore_dirty_tree(&mut self, record: &DirtyTreeRecord) {
        self.dirty_tree_active = record.active;
        self.last_dirty_tree_notification = record.last_notified;
    }

    /// True when there is no activity inside the grace window
    pub fn user_inactive(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.last_user_activity_at {
            None => true,
            Some(at) => exceeds(now, at, grace),
        }
    }

    pub fn stale_reminder_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        is_due(self.last_stale_notification, now, interval)
    }

    pub fn dirty_reminder_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        is_due(self.last_dirty_tree_notification, now, interval)
    }

    pub fn refresh_cooldown_active(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        !is_due(self.last_auto_refresh, now, cooldown)
    }
}

/// Dirty-tree state persisted across guard processes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyTreeRecord {
    pub active: bool,
    pub staged: usize,
    pub working: usize,
    pub unique: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified: Option<DateTime<Utc>>,
}

/// Elapsed time between two instants, clamped at zero for clock skew
pub fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

fn exceeds(now: DateTime<Utc>, since: DateTime<Utc>, window: Duration) -> bool {
    elapsed(now, since) > window
}

fn is_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last {
        None => true,
        Some(at) => elapsed(now, at) >= interval,
    }
}
