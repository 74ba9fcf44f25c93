//! Prefetch task: one resource's resumable, idle-gated transfer.
//!
//! A task moves through [`TaskStatus`] via its control calls. Each
//! `start`/`resume` bumps a generation counter and spawns one transfer loop
//! for that generation; loops from older generations exit at their next
//! checkpoint, and a per-task run lock keeps at most one loop touching the
//! store at a time. Status callbacks are always invoked outside the state lock.

mod context;
mod error;
mod request;
mod run;
mod status;

pub use context::{PrefetchContext, Tuning};
pub use error::PrefetchError;
pub use request::PrefetchRequest;
pub use status::{ProgressCallback, StatusCallback, StatusEvent, TaskStatus};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::admission::{self, Rejection};
use crate::store::StoreKind;

/// Result of [`PrefetchTask::start`] / [`PrefetchTask::resume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartOutcome {
    /// The transfer loop was scheduled.
    Started,
    /// Already running; nothing changed.
    AlreadyRunning,
    /// Network conditions disallow starting now. Nothing was emitted.
    Deferred(Rejection),
    /// The task reached a terminal state earlier and will not run again.
    Finished,
}

#[derive(Debug, Default)]
struct TransferState {
    status: TaskStatus,
    generation: u64,
    downloaded: u64,
    total: Option<u64>,
    probed: bool,
    /// Present only while a chunk request is outstanding.
    abort: Option<CancellationToken>,
    /// Backend resolved on the first loop run, fixed afterwards.
    backend: Option<StoreKind>,
    /// Paused by the per-block activity check rather than by the caller.
    paused_by_activity: bool,
}

struct Inner {
    request: PrefetchRequest,
    key: String,
    ctx: PrefetchContext,
    state: Mutex<TransferState>,
    run_lock: tokio::sync::Mutex<()>,
}

/// Handle to one prefetch task. Clones share the same task.
#[derive(Clone)]
pub struct PrefetchTask {
    inner: Arc<Inner>,
}

impl PrefetchTask {
    /// Build an idle task. Fails if the request URL is empty.
    pub fn new(request: PrefetchRequest, ctx: PrefetchContext) -> Result<Self, PrefetchError> {
        if request.url.trim().is_empty() {
            return Err(PrefetchError::EmptyUrl);
        }
        let key = request.resolved_cache_key();
        Ok(Self {
            inner: Arc::new(Inner {
                request,
                key,
                ctx,
                state: Mutex::new(TransferState::default()),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.request.url
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.key
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    /// Bytes stored so far (the contiguous prefix).
    pub fn offset(&self) -> u64 {
        self.lock().downloaded
    }

    pub fn total(&self) -> Option<u64> {
        self.lock().total
    }

    /// Backend in use, once the transfer loop has run.
    pub fn backend(&self) -> Option<StoreKind> {
        self.lock().backend
    }

    /// Admit, emit `started`, probe the size once and schedule the transfer loop.
    pub async fn start(&self) -> StartOutcome {
        self.launch(TaskStatus::Started).await
    }

    /// Like [`start`](Self::start) but emits `resumed` and never probes.
    pub async fn resume(&self) -> StartOutcome {
        self.launch(TaskStatus::Resumed).await
    }

    async fn launch(&self, status: TaskStatus) -> StartOutcome {
        let generation = {
            let mut st = self.lock();
            if st.status.is_terminal() {
                return StartOutcome::Finished;
            }
            if st.status.is_running() {
                return StartOutcome::AlreadyRunning;
            }
            let net = self.inner.ctx.network.snapshot();
            if let Err(rejection) = admission::admit(&net, &self.inner.request.admission) {
                tracing::debug!(key = %self.inner.key, %rejection, "start deferred");
                return StartOutcome::Deferred(rejection);
            }
            st.status = status;
            st.generation += 1;
            st.paused_by_activity = false;
            st.generation
        };
        tracing::info!(key = %self.inner.key, url = %self.inner.request.url, "prefetch {}", status);
        self.emit(status, None, false);

        if status == TaskStatus::Started {
            self.probe_total().await;
        }
        if self.is_current(generation) {
            tokio::spawn(run::drive(self.clone(), generation));
        }
        StartOutcome::Started
    }

    async fn probe_total(&self) {
        {
            let mut st = self.lock();
            if st.probed {
                return;
            }
            st.probed = true;
        }
        match self.inner.ctx.transport.probe_size(&self.inner.request.url).await {
            Ok(Some(size)) => {
                self.discover_total(size);
                tracing::debug!(key = %self.inner.key, total = size, "size probed");
            }
            Ok(None) => tracing::debug!(key = %self.inner.key, "size unknown"),
            Err(e) => tracing::debug!(key = %self.inner.key, error = %e, "size probe failed"),
        }
    }

    /// Abort any in-flight read and emit `paused`.
    ///
    /// On a task already paused by foreground activity this emits nothing but
    /// takes over the pause, so it no longer resumes by itself. Returns false
    /// when there was nothing to pause.
    pub fn pause(&self) -> bool {
        {
            let mut st = self.lock();
            if st.status == TaskStatus::Paused && st.paused_by_activity {
                st.paused_by_activity = false;
                tracing::debug!(key = %self.inner.key, "activity pause held by caller");
                return true;
            }
        }
        self.halt_running(None, false)
    }

    /// Abort any in-flight read and emit the terminal `stopped`. Stored content is kept.
    pub fn stop(&self) -> bool {
        let token = {
            let mut st = self.lock();
            if st.status.is_terminal() {
                return false;
            }
            st.status = TaskStatus::Stopped;
            st.paused_by_activity = false;
            st.abort.take()
        };
        if let Some(token) = token {
            token.cancel();
        }
        tracing::info!(key = %self.inner.key, "prefetch stopped");
        self.emit(TaskStatus::Stopped, None, true);
        true
    }

    /// Delete stored content (fragment table only) and reset the offset to 0.
    pub async fn purge(&self) -> Result<(), PrefetchError> {
        let kind = self.backend().unwrap_or(StoreKind::Fragments);
        let mut store = self.inner.ctx.storage.open_kind(&self.inner.key, kind).await?;
        match store.purgeable() {
            Some(p) => p.purge().await?,
            None => tracing::debug!(key = %self.inner.key, "streaming content is not purged"),
        }
        self.lock().downloaded = 0;
        Ok(())
    }

    /// `file://` URL of the stored content, or `None` if nothing is available.
    pub async fn object_url(&self) -> Option<Url> {
        let storage = &self.inner.ctx.storage;
        let path = match storage.locate(&self.inner.key, self.backend()).await {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(key = %self.inner.key, error = %e, "content not available");
                return None;
            }
        };
        let path = tokio::fs::canonicalize(&path).await.ok()?;
        Url::from_file_path(path).ok()
    }

    fn lock(&self) -> MutexGuard<'_, TransferState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        let st = self.lock();
        st.generation == generation && st.status.is_running()
    }

    fn min_idle(&self) -> Duration {
        self.inner
            .request
            .min_idle
            .unwrap_or(self.inner.ctx.tuning.min_idle)
    }

    /// Record the total size unless one is already known.
    fn discover_total(&self, total: u64) {
        let mut st = self.lock();
        if st.total.is_none() {
            st.total = Some(total);
        }
    }

    /// Move a running task to `Paused`, optionally only for `generation`.
    fn halt_running(&self, generation: Option<u64>, by_activity: bool) -> bool {
        let token = {
            let mut st = self.lock();
            if !st.status.is_running() || generation.map_or(false, |g| g != st.generation) {
                return false;
            }
            st.status = TaskStatus::Paused;
            st.paused_by_activity = by_activity;
            st.abort.take()
        };
        if let Some(token) = token {
            token.cancel();
        }
        tracing::info!(key = %self.inner.key, by_activity, "prefetch paused");
        self.emit(TaskStatus::Paused, None, false);
        true
    }

    /// Terminal transition for `generation`, emitting `status`.
    fn finish(&self, generation: u64, status: TaskStatus, error: Option<PrefetchError>) {
        {
            let mut st = self.lock();
            if st.generation != generation || !st.status.is_running() {
                return;
            }
            st.status = status;
            st.abort = None;
        }
        match &error {
            Some(e) => tracing::warn!(key = %self.inner.key, error = %e, "prefetch failed"),
            None => tracing::info!(key = %self.inner.key, "prefetch {}", status),
        }
        self.emit(status, error.map(Arc::new), true);
    }

    fn emit(&self, status: TaskStatus, error: Option<Arc<PrefetchError>>, terminal: bool) {
        if let Some(cb) = &self.inner.request.on_status {
            cb(&StatusEvent {
                status,
                error,
                terminal,
            });
        }
    }

    fn report_progress(&self, downloaded: u64, total: Option<u64>) {
        if let Some(cb) = &self.inner.request.on_progress {
            cb(downloaded, total);
        }
    }
}

impl fmt::Debug for PrefetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("PrefetchTask")
            .field("key", &self.inner.key)
            .field("url", &self.inner.request.url)
            .field("status", &st.status)
            .field("downloaded", &st.downloaded)
            .field("total", &st.total)
            .finish()
    }
}
