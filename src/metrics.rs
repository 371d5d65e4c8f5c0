//! Hook outcome metrics
//!
//! The scheduler reports one metric per tick outcome through [`MetricsSink`].
//! Recording is fire-and-forget: sinks must never block the caller and never
//! surface write failures.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Success,
    Failure,
}

/// One hook outcome record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookMetric {
    pub hook: String,
    pub status: MetricStatus,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookMetric {
    pub fn success(hook: &str, duration_ms: u64) -> Self {
        Self {
            hook: hook.to_string(),
            status: MetricStatus::Success,
            duration_ms,
            timestamp: Utc::now(),
            action: None,
            error: None,
        }
    }

    pub fn failure(hook: &str, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            hook: hook.to_string(),
            status: MetricStatus::Failure,
            duration_ms,
            timestamp: Utc::now(),
            action: None,
            error: Some(error.into()),
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }
}

pub trait MetricsSink: Send + Sync {
    /// Record a metric without waiting on the destination
    fn record_metric(&self, metric: HookMetric);
}

/// Writes metrics to the log only
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_metric(&self, metric: HookMetric) {
        debug!(
            hook = %metric.hook,
            status = ?metric.status,
            duration_ms = metric.duration_ms,
            "Hook metric"
        );
    }
}

/// Appends metrics as JSON lines to `{dir}/hooks-YYYYMMDD.jsonl`
#[derive(Clone)]
pub struct JsonlMetricsSink {
    base_path: Arc<PathBuf>,
}

impl JsonlMetricsSink {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path: Arc::new(base_path),
        }
    }

    /// Daily file for the current local date
    pub fn file_path(&self) -> PathBuf {
        let date = Local::now().format("%Y%m%d").to_string();
        self.base_path.join(format!("hooks-{}.jsonl", date))
    }

    /// Append one record, awaiting the write
    pub async fn write(&self, metric: &HookMetric) -> Result<()> {
        let file_path = self.file_path();
        if let Some(parent) = file_path.parent() {
            create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await?;

        let mut line = serde_json::to_string(metric)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn record_metric(&self, metric: HookMetric) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, dropping metric for '{}'", metric.hook);
            return;
        };

        let sink = self.clone();
        handle.spawn(async move {
            if let Err(e) = sink.write(&metric).await {
                warn!("Failed to write hook metric: {}", e);
            }
        });
    }
}
