//! The transfer loop.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{PrefetchError, PrefetchTask, StartOutcome, TaskStatus};
use crate::admission::adaptive_chunk_size;
use crate::checksum::{self, EMPTY_SHA256};
use crate::fetch::FetchError;
use crate::range::ByteRange;
use crate::retry::RetryDecision;
use crate::store::{ChunkStore, StoreError};

/// Outcome of one chunk step.
enum Step {
    /// Chunk stored; more to fetch.
    Continue,
    /// Everything is stored; run the completion path.
    Complete,
    /// The per-block activity check paused the task.
    PausedByActivity,
    /// Paused or stopped from outside, or superseded by a newer generation.
    Halted,
}

/// Loop for `generation`, boxed so the task's control calls can spawn it.
pub(super) fn drive(task: PrefetchTask, generation: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::task::yield_now().await;
        let paused_by_activity = {
            let _running = task.inner.run_lock.lock().await;
            if !task.is_current(generation) {
                return;
            }
            Driver::new(&task, generation).run().await
        };
        if paused_by_activity && task.inner.ctx.tuning.auto_resume {
            resume_when_idle(task, generation).await;
        }
    })
}

/// After an activity pause, wait for the idle gap and resume, unless the caller intervened.
async fn resume_when_idle(task: PrefetchTask, generation: u64) {
    let tuning = task.inner.ctx.tuning;
    loop {
        tokio::time::sleep(tuning.idle_poll).await;
        {
            let st = task.lock();
            if st.generation != generation
                || st.status != TaskStatus::Paused
                || !st.paused_by_activity
            {
                return;
            }
        }
        if !task.inner.ctx.activity.is_idle_for(task.min_idle()) {
            continue;
        }
        match task.resume().await {
            StartOutcome::Deferred(_) => tokio::time::sleep(tuning.admission_retry).await,
            _ => return,
        }
    }
}

struct Driver<'a> {
    task: &'a PrefetchTask,
    generation: u64,
    store: Option<Box<dyn ChunkStore>>,
    failures: u32,
}

impl<'a> Driver<'a> {
    fn new(task: &'a PrefetchTask, generation: u64) -> Self {
        Self {
            task,
            generation,
            store: None,
            failures: 0,
        }
    }

    fn current(&self) -> bool {
        self.task.is_current(self.generation)
    }

    /// Returns true if the loop ended in an activity pause.
    async fn run(mut self) -> bool {
        let tuning = self.task.inner.ctx.tuning;
        loop {
            if !self.current() {
                return false;
            }
            match self.step().await {
                Ok(Step::Continue) => {
                    self.failures = 0;
                    if !self.nap(tuning.chunk_delay).await {
                        return false;
                    }
                }
                Ok(Step::Complete) => {
                    self.complete().await;
                    return false;
                }
                Ok(Step::PausedByActivity) => return true,
                Ok(Step::Halted) => return false,
                Err(e) => {
                    if !self.current() {
                        return false;
                    }
                    if !self.retry_after(e).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Count a failed attempt; emit it and back off, or fail terminally.
    async fn retry_after(&mut self, error: PrefetchError) -> bool {
        self.store = None;
        self.failures += 1;
        let key = self.task.cache_key();
        match self.task.inner.ctx.retry.decide(self.failures) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(key, error = %error, attempt = self.failures, ?delay, "chunk failed, retrying");
                self.task
                    .emit(TaskStatus::Error, Some(std::sync::Arc::new(error)), false);
                self.nap(delay).await
            }
            RetryDecision::NoRetry => {
                let err = PrefetchError::RetriesExhausted {
                    attempts: self.failures,
                    last: Box::new(error),
                };
                self.task.finish(self.generation, TaskStatus::Error, Some(err));
                false
            }
        }
    }

    /// Sleep in idle-poll slices; false if the generation went stale meanwhile.
    async fn nap(&self, total: Duration) -> bool {
        let slice = self.task.inner.ctx.tuning.idle_poll.max(Duration::from_millis(1));
        let mut left = total;
        while !left.is_zero() {
            let d = left.min(slice);
            tokio::time::sleep(d).await;
            left -= d;
            if !self.current() {
                return false;
            }
        }
        self.current()
    }

    async fn wait_idle(&self) -> bool {
        let min_idle = self.task.min_idle();
        let poll = self.task.inner.ctx.tuning.idle_poll;
        loop {
            if !self.current() {
                return false;
            }
            if self.task.inner.ctx.activity.is_idle_for(min_idle) {
                return true;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Open the store on first use and recover the stored prefix. Returns the resume offset.
    async fn ensure_store(&mut self) -> Result<u64, PrefetchError> {
        if self.store.is_some() {
            return Ok(self.task.offset());
        }
        let task = self.task;
        let inner = &task.inner;
        let recorded = task.backend();
        let mut store = match recorded {
            Some(kind) => inner.ctx.storage.open_kind(&inner.key, kind).await?,
            None => inner.ctx.storage.open(&inner.key, inner.request.store).await?,
        };
        let stored = store.size().await?;
        {
            let mut st = task.lock();
            if st.backend.is_none() {
                st.backend = Some(store.kind());
            }
            st.downloaded = stored;
        }
        if recorded.is_none() {
            tracing::debug!(key = %inner.key, backend = store.kind().as_str(), "storage backend resolved");
        }
        if stored > 0 {
            tracing::debug!(key = %inner.key, offset = stored, "resuming from stored prefix");
        }
        self.store = Some(store);
        Ok(stored)
    }

    async fn step(&mut self) -> Result<Step, PrefetchError> {
        let task = self.task;
        let offset = self.ensure_store().await?;
        let total = task.total();
        if total.map_or(false, |t| offset >= t) {
            return Ok(Step::Complete);
        }
        if !self.wait_idle().await {
            return Ok(Step::Halted);
        }

        let inner = &task.inner;
        let net = inner.ctx.network.snapshot();
        let chunk = adaptive_chunk_size(
            inner.request.chunk_size.or(inner.ctx.tuning.chunk_size),
            &net,
        );
        let Some(range) = ByteRange::next(offset, chunk, total) else {
            return Ok(Step::Complete);
        };

        let token = CancellationToken::new();
        {
            let mut st = task.lock();
            if st.generation != self.generation || !st.status.is_running() {
                return Ok(Step::Halted);
            }
            st.abort = Some(token.clone());
        }
        let result = self.fetch_chunk(range, &token).await;
        {
            let mut st = task.lock();
            if st.generation == self.generation {
                st.abort = None;
            }
        }
        result
    }

    /// Fetch `range` and stream it into the store block by block.
    async fn fetch_chunk(
        &mut self,
        range: ByteRange,
        token: &CancellationToken,
    ) -> Result<Step, PrefetchError> {
        let task = self.task;
        let inner = &task.inner;
        let key = inner.key.as_str();
        tracing::debug!(key, range = %range.header_value(), "fetching chunk");

        let transport = inner.ctx.transport.clone();
        let response = tokio::select! {
            r = transport.fetch_range(&inner.request.url, range, token.clone()) => match r {
                Err(FetchError::Aborted) if token.is_cancelled() => return Ok(Step::Halted),
                r => r?,
            },
            _ = token.cancelled() => return Ok(Step::Halted),
        };

        let status = response.status;
        match status {
            206 => {
                if let Some(t) = response.content_range.and_then(|cr| cr.total) {
                    task.discover_total(t);
                }
            }
            200 => {}
            // Asked past the end of a resource of unknown size.
            416 if range.start > 0 && task.total().is_none() => {
                task.discover_total(range.start);
                return Ok(Step::Complete);
            }
            other => return Err(FetchError::Http(other).into()),
        }

        let total = task.total();
        // A 200 carries the whole resource; skip what is already stored.
        let mut skip = if status == 200 { range.start } else { 0 };
        let mut pos = range.start;
        let activity_abort = inner.ctx.tuning.activity_abort;

        let Some(store) = self.store.as_mut() else {
            return Err(StoreError::Unavailable("store closed".into()).into());
        };
        if let Some(cursor) = store.seekable() {
            cursor.seek(pos).await?;
        }

        let mut body = response.body;
        loop {
            let next = tokio::select! {
                b = body.next_block() => b,
                _ = token.cancelled() => return Ok(Step::Halted),
            };
            let mut block = match next {
                None => break,
                Some(Ok(block)) => block,
                Some(Err(FetchError::Aborted)) if token.is_cancelled() => return Ok(Step::Halted),
                Some(Err(e)) => return Err(e.into()),
            };

            if inner.ctx.activity.idle_for() < activity_abort {
                tracing::debug!(key, offset = pos, "foreground activity, pausing");
                token.cancel();
                task.halt_running(Some(self.generation), true);
                return Ok(Step::PausedByActivity);
            }

            if skip > 0 {
                let n = skip.min(block.len() as u64) as usize;
                block.drain(..n);
                skip -= n as u64;
            }
            if let Some(t) = total {
                let room = t.saturating_sub(pos);
                if (block.len() as u64) > room {
                    block.truncate(room as usize);
                }
            }
            if block.is_empty() {
                if total.map_or(false, |t| pos >= t) {
                    break;
                }
                continue;
            }

            if !task.is_current(self.generation) {
                return Ok(Step::Halted);
            }
            match store.seekable() {
                Some(cursor) => cursor.write(&block).await?,
                None => store.write_chunk(pos, &block).await?,
            }
            pos += block.len() as u64;

            let (downloaded, known_total) = {
                let mut st = task.lock();
                if st.generation != self.generation {
                    return Ok(Step::Halted);
                }
                st.downloaded = pos;
                (st.downloaded, st.total)
            };
            task.report_progress(downloaded, known_total);
        }

        let received = pos - range.start;
        match task.total() {
            Some(t) if pos >= t => Ok(Step::Complete),
            Some(_) => Ok(Step::Continue),
            // The whole body ran to its end.
            None if status == 200 => {
                task.discover_total(pos);
                Ok(Step::Complete)
            }
            // Short read with no known size: that was the end.
            None if received < range.len() => {
                task.discover_total(pos);
                Ok(Step::Complete)
            }
            None => Ok(Step::Continue),
        }
    }

    /// Close, assemble, verify and emit the terminal status.
    async fn complete(&mut self) {
        match self.verify().await {
            Ok(()) => self
                .task
                .finish(self.generation, TaskStatus::Completed, None),
            Err(e) => self
                .task
                .finish(self.generation, TaskStatus::Error, Some(e)),
        }
    }

    async fn verify(&mut self) -> Result<(), PrefetchError> {
        self.ensure_store().await?;
        let Some(store) = self.store.as_mut() else {
            return Err(StoreError::Unavailable("store closed".into()).into());
        };
        store.close().await?;
        let artifact = store.assemble().await?;
        let Some(expected) = self.task.inner.request.integrity_sha256.as_deref() else {
            return Ok(());
        };
        let actual = match artifact {
            Some(path) => checksum::sha256_file(path).await.map_err(StoreError::Io)?,
            None => EMPTY_SHA256.to_string(),
        };
        if checksum::digests_match(expected, &actual) {
            tracing::debug!(key = %self.task.inner.key, "integrity verified");
            Ok(())
        } else {
            Err(PrefetchError::Integrity {
                expected: expected.trim().to_ascii_lowercase(),
                actual,
            })
        }
    }
}
