//! Status reports for managed requests.

/// Bytes stored so far and the total size if known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Fraction complete in [0.0, 1.0], if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.done as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Where a managed request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Admitted; a task exists for it.
    Active,
    /// Waiting in the backlog.
    Queued,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Queued => "queued",
        }
    }
}

/// Answer to [`super::PrefetchManager::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub state: TaskState,
    pub progress: Progress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction() {
        let p = Progress {
            done: 25,
            total: Some(100),
        };
        assert_eq!(p.fraction(), Some(0.25));
        assert_eq!(Progress { done: 0, total: Some(0) }.fraction(), Some(1.0));
        assert_eq!(Progress::default().fraction(), None);
    }
}
