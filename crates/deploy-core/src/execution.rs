//! Task run records
//!
//! Each dispatched task gets one record. There is no persistence and no
//! resumption: a record only ever moves from running to a terminal state.

use chrono::{DateTime, Utc};
use std::fmt;

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    /// Failed; nothing after this task was run
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Record of a single task run
#[derive(Debug, Clone)]
pub struct TaskRun {
    /// Task name as registered (aliases are resolved)
    pub task: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl TaskRun {
    /// Start a new run
    pub fn start(task: &str) -> Self {
        Self {
            task: task.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Mark as succeeded
    pub fn succeed(&mut self) {
        self.finish(RunStatus::Succeeded);
    }

    /// Mark as failed
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.error = Some(error.to_string());
        self.finish(RunStatus::Failed);
    }

    fn finish(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.status = status;
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}
