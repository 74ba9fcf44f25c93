#![allow(dead_code)]

pub mod memory;
pub mod range_server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use idlefetch_core::{PrefetchRequest, StatusEvent, TaskStatus, Tuning};

/// Deterministic body of `len` bytes.
pub fn body(len: usize) -> Vec<u8> {
    (0u8..=250).cycle().take(len).collect()
}

/// Timings short enough for tests; no idle gap required.
pub fn fast_tuning() -> Tuning {
    Tuning {
        min_idle: Duration::ZERO,
        idle_poll: Duration::from_millis(5),
        activity_abort: Duration::from_millis(200),
        chunk_delay: Duration::from_millis(1),
        cooldown: Duration::from_millis(10),
        admission_delay: Duration::from_millis(5),
        admission_retry: Duration::from_millis(20),
        auto_resume: false,
        chunk_size: None,
    }
}

/// One recorded status event.
#[derive(Debug, Clone)]
pub struct Seen {
    pub status: TaskStatus,
    pub terminal: bool,
    pub error: Option<String>,
}

/// Status events collected from a request's callback.
#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<Seen>>>);

impl Events {
    /// Attach a recorder to `req`.
    pub fn attach(&self, req: PrefetchRequest) -> PrefetchRequest {
        let sink = self.clone();
        req.on_status(move |e: &StatusEvent| sink.push(e))
    }

    fn push(&self, e: &StatusEvent) {
        self.0.lock().unwrap().push(Seen {
            status: e.status,
            terminal: e.terminal,
            error: e.error.as_ref().map(|err| err.to_string()),
        });
    }

    pub fn all(&self) -> Vec<Seen> {
        self.0.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.all().into_iter().map(|s| s.status).collect()
    }

    pub fn terminal(&self) -> Option<Seen> {
        self.all().into_iter().find(|s| s.terminal)
    }

    /// Wait until a terminal event arrives.
    pub async fn wait_terminal(&self) -> Seen {
        self.wait_for(|seen| seen.iter().any(|s| s.terminal)).await;
        self.terminal().unwrap()
    }

    /// Wait until `status` has been seen at least once.
    pub async fn wait_status(&self, status: TaskStatus) {
        self.wait_for(|seen| seen.iter().any(|s| s.status == status)).await;
    }

    async fn wait_for(&self, done: impl Fn(&[Seen]) -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if done(&self.0.lock().unwrap()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out; saw {:?}", self.statuses());
    }
}

/// Poll `cond` until true or fail after a few seconds.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
