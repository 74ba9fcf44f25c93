//! Foreground activity tracking.
//!
//! An [`ActivityMonitor`] holds the timestamp of the most recent foreground
//! network or user activity. Hosts either call [`ActivityMonitor::mark_activity`]
//! directly or feed [`ActivityEvent`]s through a channel into
//! [`ActivityMonitor::observe`]. Traffic started by the prefetcher itself is
//! never counted.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Who initiated an observed network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Fetch,
    XmlHttpRequest,
    Navigation,
    Script,
    Image,
    /// Requests issued by this engine.
    Prefetch,
    Other,
}

/// One observation fed to [`ActivityMonitor::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// A network request finished loading.
    Resource { initiator: Initiator },
    /// The host window was shown or hidden.
    Visibility { visible: bool },
}

impl ActivityEvent {
    /// Only scripted fetches and the window becoming visible count as foreground use.
    pub fn is_foreground(&self) -> bool {
        match self {
            ActivityEvent::Resource { initiator } => {
                matches!(initiator, Initiator::Fetch | Initiator::XmlHttpRequest)
            }
            ActivityEvent::Visibility { visible } => *visible,
        }
    }
}

/// Shared "last foreground activity" clock. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ActivityMonitor {
    last: Arc<Mutex<Option<Instant>>>,
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record foreground activity now.
    pub fn mark_activity(&self) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(Instant::now());
    }

    /// Timestamp of the most recent activity, if any was ever recorded.
    pub fn last_activity(&self) -> Option<Instant> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last activity. `Duration::MAX` when nothing was ever recorded.
    pub fn idle_for(&self) -> Duration {
        match self.last_activity() {
            Some(at) => at.elapsed(),
            None => Duration::MAX,
        }
    }

    pub fn is_idle_for(&self, gap: Duration) -> bool {
        self.idle_for() >= gap
    }

    /// Start consuming `events`, marking activity for every foreground event.
    ///
    /// Requires a Tokio runtime. Without one the observer is not installed and
    /// the returned handle is inert, so the monitor keeps reporting idle.
    pub fn observe(&self, mut events: mpsc::Receiver<ActivityEvent>) -> ObserverHandle {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("no runtime, activity observer not installed");
                return ObserverHandle { task: None };
            }
        };
        let monitor = self.clone();
        let task = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if event.is_foreground() {
                    monitor.mark_activity();
                }
            }
        });
        ObserverHandle { task: Some(task) }
    }
}

/// Handle to a running observer; dropping it stops observation.
#[derive(Debug)]
pub struct ObserverHandle {
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True while the observer task is installed and its channel is open.
    pub fn is_observing(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
