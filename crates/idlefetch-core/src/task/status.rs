use std::fmt;
use std::sync::Arc;

use super::error::PrefetchError;

/// Lifecycle of a prefetch task.
///
/// `Completed`, `Stopped` and `Error` are terminal. `Started` and `Resumed`
/// both mean the transfer loop is live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    Idle,
    Started,
    Paused,
    Resumed,
    Completed,
    Stopped,
    Error,
}

impl TaskStatus {
    pub fn is_running(self) -> bool {
        matches!(self, TaskStatus::Started | TaskStatus::Resumed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Stopped | TaskStatus::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Started => "started",
            TaskStatus::Paused => "paused",
            TaskStatus::Resumed => "resumed",
            TaskStatus::Completed => "completed",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status notification.
///
/// `error` events with `terminal == false` report a failed chunk attempt that
/// will be retried; the task keeps running.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub status: TaskStatus,
    pub error: Option<Arc<PrefetchError>>,
    pub terminal: bool,
}

pub type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

/// `(downloaded, total)` after each stored block.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;
