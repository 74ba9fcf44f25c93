//! Multi-task prefetch manager.
//!
//! Keeps a priority-ordered backlog of requests and admits them as
//! [`PrefetchTask`]s up to a concurrency ceiling. Terminal task events free
//! the slot and trigger another admission pass after a cooldown.
//!
//! Lock discipline: the manager state lock is never held while calling into
//! a task, since tasks report back through callbacks that take the same lock.

mod progress;
mod queue;

pub use progress::{Progress, TaskReport, TaskState};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::task::{PrefetchContext, PrefetchRequest, PrefetchTask, StartOutcome, StatusEvent};
use queue::{Backlog, QueueEntry};

/// Default concurrency ceiling.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Errors from manager configuration calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("max concurrent must be at least 1 (got {0})")]
    InvalidConcurrency(usize),
}

/// A request plus its scheduling metadata.
#[derive(Debug, Clone)]
pub struct ManagedRequest {
    pub request: PrefetchRequest,
    /// Higher is served first; ties keep arrival order.
    pub priority: i32,
    /// Caller-chosen id; generated when `None`.
    pub id: Option<String>,
}

impl ManagedRequest {
    pub fn new(request: PrefetchRequest) -> Self {
        Self {
            request,
            priority: 0,
            id: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<PrefetchRequest> for ManagedRequest {
    fn from(request: PrefetchRequest) -> Self {
        Self::new(request)
    }
}

impl From<&str> for ManagedRequest {
    fn from(url: &str) -> Self {
        Self::new(PrefetchRequest::new(url))
    }
}

impl From<String> for ManagedRequest {
    fn from(url: String) -> Self {
        Self::new(PrefetchRequest::new(url))
    }
}

struct ActiveEntry {
    task: PrefetchTask,
    /// Admission number; events from an evicted task never match a newer slot.
    slot: u64,
    /// The request as queued, kept so a deferred start can go back in line.
    queued: QueueEntry,
    /// Paused by a global `pause(None)`; only those come back on a global resume.
    held: bool,
}

struct ManagerState {
    backlog: Backlog,
    active: HashMap<String, ActiveEntry>,
    max_concurrent: usize,
    paused: bool,
    next_slot: u64,
}

struct Shared {
    ctx: PrefetchContext,
    state: Mutex<ManagerState>,
    id_seq: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs many prefetch tasks under a shared concurrency ceiling.
///
/// Needs a Tokio runtime for admission passes and task starts.
#[derive(Clone)]
pub struct PrefetchManager {
    shared: Arc<Shared>,
}

impl PrefetchManager {
    pub fn new(ctx: PrefetchContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                state: Mutex::new(ManagerState {
                    backlog: Backlog::default(),
                    active: HashMap::new(),
                    max_concurrent: DEFAULT_MAX_CONCURRENT,
                    paused: false,
                    next_slot: 0,
                }),
                id_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_max_concurrent(ctx: PrefetchContext, n: usize) -> Result<Self, ManagerError> {
        if n < 1 {
            return Err(ManagerError::InvalidConcurrency(n));
        }
        let manager = Self::new(ctx);
        manager.shared.lock().max_concurrent = n;
        Ok(manager)
    }

    /// Queue one request and return its id. Admission happens shortly after.
    pub fn add(&self, request: impl Into<ManagedRequest>) -> String {
        let id = self.enqueue(request.into());
        schedule_pass(&self.shared, self.shared.ctx.tuning.admission_delay);
        id
    }

    /// Queue several requests, then run a single admission pass.
    pub fn add_batch<I, R>(&self, requests: I) -> Vec<String>
    where
        I: IntoIterator<Item = R>,
        R: Into<ManagedRequest>,
    {
        let ids: Vec<String> = requests
            .into_iter()
            .map(|r| self.enqueue(r.into()))
            .collect();
        schedule_pass(&self.shared, self.shared.ctx.tuning.admission_delay);
        ids
    }

    fn enqueue(&self, managed: ManagedRequest) -> String {
        let id = managed.id.unwrap_or_else(|| self.generate_id());
        let mut st = self.shared.lock();
        if st.active.contains_key(&id) || st.backlog.contains(&id) {
            tracing::warn!(id = %id, "request id already managed, ignoring duplicate");
            return id;
        }
        tracing::debug!(id = %id, priority = managed.priority, url = %managed.request.url, "queued");
        st.backlog.enqueue(id.clone(), managed.priority, managed.request);
        id
    }

    fn generate_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = self.shared.id_seq.fetch_add(1, Ordering::Relaxed);
        format!("prefetch-{}-{}", millis, seq)
    }

    /// Change the ceiling and admit immediately if it went up.
    pub fn set_max_concurrent(&self, n: usize) -> Result<(), ManagerError> {
        if n < 1 {
            return Err(ManagerError::InvalidConcurrency(n));
        }
        self.shared.lock().max_concurrent = n;
        process_queue(&self.shared);
        Ok(())
    }

    /// Stop and evict an active task, or drop a queued request.
    pub fn remove(&self, id: &str) -> bool {
        let (evicted, dequeued) = {
            let mut st = self.shared.lock();
            let evicted = st.active.remove(id).map(|a| a.task);
            let dequeued = st.backlog.remove(id).is_some();
            (evicted, dequeued)
        };
        let found = evicted.is_some() || dequeued;
        if let Some(task) = evicted {
            task.stop();
            schedule_pass(&self.shared, self.shared.ctx.tuning.cooldown);
        }
        found
    }

    /// Pause one active task, or everything. A global pause also blocks admissions.
    pub fn pause(&self, id: Option<&str>) {
        let tasks = {
            let mut st = self.shared.lock();
            if id.is_none() {
                st.paused = true;
            }
            select_active(&st, id)
        };
        let held: Vec<String> = tasks
            .into_iter()
            .filter_map(|(task_id, task)| task.pause().then_some(task_id))
            .collect();
        if id.is_none() && !held.is_empty() {
            let mut st = self.shared.lock();
            for task_id in &held {
                if let Some(entry) = st.active.get_mut(task_id) {
                    entry.held = true;
                }
            }
        }
    }

    /// Resume one active task, or lift a global pause and resume the tasks it paused.
    pub fn resume(&self, id: Option<&str>) {
        let tasks: Vec<PrefetchTask> = {
            let mut st = self.shared.lock();
            match id {
                Some(id) => st
                    .active
                    .get_mut(id)
                    .map(|a| {
                        a.held = false;
                        a.task.clone()
                    })
                    .into_iter()
                    .collect(),
                None => {
                    st.paused = false;
                    st.active
                        .values_mut()
                        .filter(|a| a.held)
                        .map(|a| {
                            a.held = false;
                            a.task.clone()
                        })
                        .collect()
                }
            }
        };
        for task in tasks {
            spawn(async move {
                let outcome = task.resume().await;
                tracing::debug!(key = task.cache_key(), ?outcome, "resume");
            });
        }
        if id.is_none() {
            process_queue(&self.shared);
        }
    }

    /// Stop and evict one active task, or all active tasks. Queued requests stay queued.
    pub fn stop(&self, id: Option<&str>) {
        let tasks: Vec<PrefetchTask> = {
            let mut st = self.shared.lock();
            match id {
                Some(id) => st.active.remove(id).map(|a| a.task).into_iter().collect(),
                None => st.active.drain().map(|(_, a)| a.task).collect(),
            }
        };
        if tasks.is_empty() {
            return;
        }
        for task in &tasks {
            task.stop();
        }
        schedule_pass(&self.shared, self.shared.ctx.tuning.cooldown);
    }

    /// Where `id` is and how far it got; `None` if unknown.
    pub fn status(&self, id: &str) -> Option<TaskReport> {
        let task = {
            let st = self.shared.lock();
            match st.active.get(id) {
                Some(a) => a.task.clone(),
                None if st.backlog.contains(id) => {
                    return Some(TaskReport {
                        state: TaskState::Queued,
                        progress: Progress::default(),
                    })
                }
                None => return None,
            }
        };
        Some(TaskReport {
            state: TaskState::Active,
            progress: Progress {
                done: task.offset(),
                total: task.total(),
            },
        })
    }

    /// Purge and remove an active task. Queued and unknown ids are left alone.
    pub async fn purge(&self, id: &str) -> Result<(), crate::task::PrefetchError> {
        let task = self.shared.lock().active.get(id).map(|a| a.task.clone());
        let Some(task) = task else {
            return Ok(());
        };
        task.purge().await?;
        self.remove(id);
        Ok(())
    }

    /// Handle to an active task.
    pub fn task(&self, id: &str) -> Option<PrefetchTask> {
        self.shared.lock().active.get(id).map(|a| a.task.clone())
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.lock().backlog.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.lock().max_concurrent
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }
}

fn select_active(st: &ManagerState, id: Option<&str>) -> Vec<(String, PrefetchTask)> {
    st.active
        .iter()
        .filter(|(task_id, _)| id.map_or(true, |id| id == task_id.as_str()))
        .map(|(task_id, a)| (task_id.clone(), a.task.clone()))
        .collect()
}

fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => tracing::warn!("no async runtime, prefetch manager work dropped"),
    }
}

/// Run an admission pass after `delay`.
fn schedule_pass(shared: &Arc<Shared>, delay: Duration) {
    let weak = Arc::downgrade(shared);
    spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = weak.upgrade() {
            process_queue(&shared);
        }
    });
}

/// Admit queued requests while under the ceiling and not globally paused.
fn process_queue(shared: &Arc<Shared>) {
    let mut admitted = Vec::new();
    {
        let mut st = shared.lock();
        while !st.paused && st.active.len() < st.max_concurrent {
            let Some(entry) = st.backlog.dequeue() else {
                break;
            };
            st.next_slot += 1;
            let slot = st.next_slot;
            let request = with_release_hook(shared, &entry, slot);
            match PrefetchTask::new(request, shared.ctx.clone()) {
                Ok(task) => {
                    tracing::debug!(id = %entry.id, priority = entry.priority, "admitted");
                    admitted.push((entry.id.clone(), slot, task.clone()));
                    st.active.insert(
                        entry.id.clone(),
                        ActiveEntry {
                            task,
                            slot,
                            queued: entry,
                            held: false,
                        },
                    );
                }
                Err(e) => tracing::warn!(id = %entry.id, error = %e, "dropping request"),
            }
        }
    }

    for (id, slot, task) in admitted {
        let weak = Arc::downgrade(shared);
        spawn(async move {
            if let StartOutcome::Deferred(rejection) = task.start().await {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                tracing::debug!(id = %id, %rejection, "start deferred, back to queue");
                {
                    let mut st = shared.lock();
                    if st.active.get(&id).map_or(false, |a| a.slot == slot) {
                        if let Some(entry) = st.active.remove(&id) {
                            st.backlog.requeue(entry.queued);
                        }
                    }
                }
                schedule_pass(&shared, shared.ctx.tuning.admission_retry);
            }
        });
    }
}

/// Copy of the queued request whose status callback also frees the slot on terminal events.
fn with_release_hook(shared: &Arc<Shared>, entry: &QueueEntry, slot: u64) -> PrefetchRequest {
    let mut request = entry.request.clone();
    let user = request.on_status.take();
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let id = entry.id.clone();
    request.on_status = Some(Arc::new(move |event: &StatusEvent| {
        if let Some(cb) = &user {
            cb(event);
        }
        if event.terminal {
            if let Some(shared) = weak.upgrade() {
                release(&shared, &id, slot);
            }
        }
    }));
    request
}

fn release(shared: &Arc<Shared>, id: &str, slot: u64) {
    let released = {
        let mut st = shared.lock();
        match st.active.get(id) {
            Some(a) if a.slot == slot => st.active.remove(id).is_some(),
            _ => false,
        }
    };
    if released {
        tracing::debug!(id, "slot released");
        schedule_pass(shared, shared.ctx.tuning.cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorageRoot;

    fn manager(dir: &std::path::Path) -> PrefetchManager {
        PrefetchManager::new(PrefetchContext::new(StorageRoot::new(dir)))
    }

    #[test]
    fn invalid_ceiling_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert_eq!(m.set_max_concurrent(0), Err(ManagerError::InvalidConcurrency(0)));
        assert_eq!(m.max_concurrent(), DEFAULT_MAX_CONCURRENT);
        let ctx = PrefetchContext::new(StorageRoot::new(dir.path()));
        assert!(PrefetchManager::with_max_concurrent(ctx, 0).is_err());
    }

    #[test]
    fn managed_request_conversions() {
        let m: ManagedRequest = "https://example.com/a".into();
        assert_eq!(m.priority, 0);
        assert!(m.id.is_none());
        let m = ManagedRequest::from(String::from("https://example.com/b"))
            .with_priority(4)
            .with_id("b");
        assert_eq!(m.priority, 4);
        assert_eq!(m.id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn queued_status_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.pause(None);
        let id = m.add(ManagedRequest::from("https://example.com/a").with_id("a"));
        assert_eq!(id, "a");
        let report = m.status("a").unwrap();
        assert_eq!(report.state, TaskState::Queued);
        assert_eq!(report.progress, Progress::default());
        assert!(m.status("nope").is_none());
        assert!(m.remove("a"));
        assert!(!m.remove("a"));
        assert_eq!(m.queued_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.pause(None);
        m.add(ManagedRequest::from("https://example.com/a").with_id("same"));
        m.add(ManagedRequest::from("https://example.com/b").with_id("same"));
        assert_eq!(m.queued_count(), 1);
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.pause(None);
        let ids = m.add_batch(["https://example.com/a", "https://example.com/b"]);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| id.starts_with("prefetch-")));
        assert!(m.is_paused());
    }

    #[tokio::test]
    async fn purge_of_queued_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.pause(None);
        m.add(ManagedRequest::from("https://example.com/a").with_id("q"));
        m.purge("q").await.unwrap();
        assert_eq!(m.queued_count(), 1);
        m.purge("unknown").await.unwrap();
    }
}
