//! Shared progress state for the bulk historical price update.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Point-in-time copy returned to pollers
#[derive(Debug, Clone, Serialize)]
pub struct UpdateProgress {
    pub is_running: bool,
    pub status: UpdateStatus,
    pub current_code: Option<String>,
    pub processed: usize,
    pub total: usize,
    pub updated_count: usize,
    pub error_count: usize,
    /// Percent complete, 0-100
    pub progress: f64,
    pub error_logs: Vec<String>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stop_requested: bool,
}

impl Default for UpdateProgress {
    fn default() -> Self {
        Self {
            is_running: false,
            status: UpdateStatus::Idle,
            current_code: None,
            processed: 0,
            total: 0,
            updated_count: 0,
            error_count: 0,
            progress: 0.0,
            error_logs: Vec::new(),
            message: None,
            started_at: None,
            finished_at: None,
            stop_requested: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<UpdateProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the tracker for a new run. Fails if another run is active.
    pub fn begin(&self) -> Result<(), AppError> {
        let mut state = self.inner.write();
        if state.is_running {
            return Err(AppError::Conflict(
                "a historical price update is already running".to_string(),
            ));
        }

        *state = UpdateProgress {
            is_running: true,
            status: UpdateStatus::Running,
            started_at: Some(Utc::now()),
            message: Some("starting".to_string()),
            ..Default::default()
        };
        Ok(())
    }

    pub fn set_total(&self, total: usize) {
        self.inner.write().total = total;
    }

    pub fn set_current(&self, code: &str) {
        self.inner.write().current_code = Some(code.to_string());
    }

    /// Record one finished instrument
    pub fn record_processed(&self, updated: bool) {
        let mut state = self.inner.write();
        state.processed += 1;
        if updated {
            state.updated_count += 1;
        }
        state.progress = percent(state.processed, state.total);
    }

    pub fn record_error(&self, message: String) {
        let mut state = self.inner.write();
        state.processed += 1;
        state.error_count += 1;
        state.error_logs.push(message);
        state.progress = percent(state.processed, state.total);
    }

    pub fn finish(&self, status: UpdateStatus, message: impl Into<String>) {
        let mut state = self.inner.write();
        state.is_running = false;
        state.status = status;
        state.current_code = None;
        state.message = Some(message.into());
        state.finished_at = Some(Utc::now());
        if status == UpdateStatus::Completed {
            state.progress = 100.0;
        }
    }

    /// Ask a running update to stop after the instrument in flight
    pub fn request_stop(&self) -> bool {
        let mut state = self.inner.write();
        if !state.is_running {
            return false;
        }
        state.stop_requested = true;
        state.message = Some("stop requested".to_string());
        true
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.read().stop_requested
    }

    pub fn snapshot(&self) -> UpdateProgress {
        self.inner.read().clone()
    }
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((done as f64 / total as f64) * 10000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_second_run() {
        let tracker = ProgressTracker::new();
        tracker.begin().unwrap();
        assert!(matches!(tracker.begin(), Err(AppError::Conflict(_))));

        tracker.finish(UpdateStatus::Completed, "done");
        assert!(tracker.begin().is_ok());
    }

    #[test]
    fn test_progress_counts() {
        let tracker = ProgressTracker::new();
        tracker.begin().unwrap();
        tracker.set_total(3);
        tracker.record_processed(true);
        tracker.record_error("Failed to update 600000.SH: timeout".to_string());

        let snap = tracker.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.updated_count, 1);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.progress, 66.67);
        assert_eq!(snap.error_logs.len(), 1);
        assert!(snap.is_running);
    }

    #[test]
    fn test_stop_only_when_running() {
        let tracker = ProgressTracker::new();
        assert!(!tracker.request_stop());

        tracker.begin().unwrap();
        assert!(tracker.request_stop());
        assert!(tracker.stop_requested());

        tracker.finish(UpdateStatus::Stopped, "stopped");
        let snap = tracker.snapshot();
        assert!(!snap.is_running);
        assert_eq!(snap.status, UpdateStatus::Stopped);
    }
}
