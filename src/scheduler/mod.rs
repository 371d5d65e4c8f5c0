//! Autonomous scheduler
//!
//! Drives re-analysis on a fixed interval. The [`HookStateMachine`] is the
//! only re-entrancy guard: a tick that finds the machine anywhere but idle
//! returns without consulting the orchestrator.

pub mod action;
pub mod gate_orchestrator;
pub mod orchestrator;

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::settings::SchedulerSettings;
use crate::metrics::{HookMetric, MetricsSink};
use crate::state::machine::{HookEvent, HookState, HookStateMachine};
use crate::timer::TimerHandle;

pub use action::Action;
pub use gate_orchestrator::GateOrchestrator;
pub use orchestrator::{dispatch_action, Orchestrator};

/// Hook name attached to every scheduler metric
pub const HOOK_NAME: &str = "autonomous-orchestrator";

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Analysis already running or recovering
    Busy,
    /// Orchestrator reported nothing to do
    NotDue,
    Completed(Action),
    Failed(String),
}

pub struct AutonomousScheduler {
    settings: SchedulerSettings,
    inner: Arc<SchedulerInner>,
    timer: Mutex<Option<TimerHandle>>,
}

struct SchedulerInner {
    machine: Mutex<HookStateMachine>,
    orchestrator: Arc<dyn Orchestrator>,
    metrics: Arc<dyn MetricsSink>,
}

impl AutonomousScheduler {
    pub fn new(
        settings: SchedulerSettings,
        orchestrator: Arc<dyn Orchestrator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            settings,
            inner: Arc::new(SchedulerInner {
                machine: Mutex::new(HookStateMachine::new()),
                orchestrator,
                metrics,
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> HookState {
        lock(&self.inner.machine).state()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).is_some()
    }

    /// Start the tick timer. Returns false if one is already running or the
    /// interval is zero.
    pub fn start(&self) -> bool {
        let mut timer = lock(&self.timer);
        if timer.is_some() {
            debug!("Scheduler already running");
            return false;
        }

        let period = self.settings.tick_interval;
        let inner = self.inner.clone();
        let handle = TimerHandle::spawn("scheduler", period, move || {
            let inner = inner.clone();
            async move {
                inner.tick().await;
            }
        });

        match handle {
            Some(handle) => {
                info!("Autonomous scheduler started ({:?} interval)", period);
                *timer = Some(handle);
                true
            }
            None => {
                warn!("Scheduler tick interval is zero; not starting");
                false
            }
        }
    }

    /// Stop the tick timer. Safe to call when not running.
    ///
    /// An analysis already in flight runs to completion and still records
    /// its metric.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.cancel();
            info!("Autonomous scheduler stopped");
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    /// Parse and run an orchestrator payload. Never fails.
    pub async fn execute_action(&self, value: &Value) -> Action {
        self.inner.execute_action(value).await
    }
}

impl Drop for AutonomousScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SchedulerInner {
    async fn tick(&self) -> TickOutcome {
        if !lock(&self.machine).is_idle() {
            debug!("Skipping tick: analysis not idle");
            return TickOutcome::Busy;
        }

        if !self.orchestrator.should_reanalyze().await {
            debug!("Skipping tick: re-analysis not due");
            return TickOutcome::NotDue;
        }

        // Another tick may have started while should_reanalyze was pending
        if lock(&self.machine).transition(HookEvent::Analyze).is_err() {
            return TickOutcome::Busy;
        }

        let mut pending = PendingAnalysis::new(self);
        let started = pending.started;
        match self.orchestrator.analyze_context().await {
            Ok(value) => {
                let action = self.execute_action(&value).await;
                pending.disarm();
                self.finish(HookEvent::Success);
                self.metrics.record_metric(
                    HookMetric::success(HOOK_NAME, elapsed_ms(started)).with_action(action.name()),
                );
                info!("Autonomous analysis completed with action '{}'", action);
                TickOutcome::Completed(action)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Autonomous analysis failed: {}", message);
                pending.disarm();
                self.fail(started, message.clone());
                TickOutcome::Failed(message)
            }
        }
    }

    fn fail(&self, started: Instant, message: String) {
        self.finish(HookEvent::Error);
        self.finish(HookEvent::Reset);
        self.metrics
            .record_metric(HookMetric::failure(HOOK_NAME, elapsed_ms(started), message));
    }

    async fn execute_action(&self, value: &Value) -> Action {
        let action = Action::from_value(value);
        if action == Action::Noop && !value.is_null() {
            debug!("Unrecognized action payload treated as no-op: {}", value);
        }
        dispatch_action(self.orchestrator.as_ref(), &action).await;
        action
    }

    fn finish(&self, event: HookEvent) {
        if let Err(e) = lock(&self.machine).transition(event) {
            error!("Scheduler state machine out of step: {}", e);
        }
    }
}

/// Returns the machine to idle if a tick is dropped mid-analysis
struct PendingAnalysis<'a> {
    inner: &'a SchedulerInner,
    started: Instant,
    armed: bool,
}

impl<'a> PendingAnalysis<'a> {
    fn new(inner: &'a SchedulerInner) -> Self {
        Self {
            inner,
            started: Instant::now(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAnalysis<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Autonomous analysis dropped before completing");
            self.inner
                .fail(self.started, "analysis cancelled before completion".to_string());
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
