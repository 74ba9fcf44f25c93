use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::activity::ActivityMonitor;
use crate::admission::{NetworkInfo, NetworkQuality, StaticNetwork};
use crate::config::PrefetchConfig;
use crate::fetch::{CurlTransport, Transport};
use crate::retry::RetryPolicy;
use crate::store::StorageRoot;

/// Timing knobs shared by every task built from one context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Idle gap required before each chunk, unless the request overrides it.
    pub min_idle: Duration,
    pub idle_poll: Duration,
    /// Foreground activity this recent aborts an in-flight chunk.
    pub activity_abort: Duration,
    pub chunk_delay: Duration,
    pub cooldown: Duration,
    pub admission_delay: Duration,
    pub admission_retry: Duration,
    pub auto_resume: bool,
    /// Chunk size for requests that set none; adaptive when `None`.
    pub chunk_size: Option<u64>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_idle: Duration::from_millis(3000),
            idle_poll: Duration::from_millis(250),
            activity_abort: Duration::from_millis(500),
            chunk_delay: Duration::from_millis(30),
            cooldown: Duration::from_millis(1000),
            admission_delay: Duration::from_millis(100),
            admission_retry: Duration::from_millis(5000),
            auto_resume: true,
            chunk_size: None,
        }
    }
}

impl From<&PrefetchConfig> for Tuning {
    fn from(cfg: &PrefetchConfig) -> Self {
        Self {
            min_idle: Duration::from_millis(cfg.min_idle_ms),
            idle_poll: Duration::from_millis(cfg.idle_poll_ms.max(1)),
            activity_abort: Duration::from_millis(cfg.activity_abort_ms),
            chunk_delay: Duration::from_millis(cfg.chunk_delay_ms),
            cooldown: Duration::from_millis(cfg.cooldown_ms),
            admission_delay: Duration::from_millis(cfg.admission_delay_ms),
            admission_retry: Duration::from_millis(cfg.admission_retry_ms),
            auto_resume: cfg.auto_resume,
            chunk_size: cfg.chunk_size,
        }
    }
}

/// Collaborators shared by tasks: network, activity clock, storage and policy.
#[derive(Clone)]
pub struct PrefetchContext {
    pub transport: Arc<dyn Transport>,
    pub activity: ActivityMonitor,
    pub network: Arc<dyn NetworkQuality>,
    pub storage: StorageRoot,
    pub tuning: Tuning,
    pub retry: RetryPolicy,
}

impl PrefetchContext {
    /// Curl transport, fresh activity monitor, unknown network, default timings.
    pub fn new(storage: StorageRoot) -> Self {
        Self {
            transport: Arc::new(CurlTransport::new()),
            activity: ActivityMonitor::new(),
            network: Arc::new(StaticNetwork::default()),
            storage,
            tuning: Tuning::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Context described by `cfg`: storage dir, timings, retry and network.
    pub fn from_config(cfg: &PrefetchConfig) -> anyhow::Result<Self> {
        let storage = StorageRoot::new(cfg.storage_dir()?);
        let retry = cfg
            .retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default();
        Ok(Self::new(storage)
            .with_tuning(Tuning::from(cfg))
            .with_retry(retry)
            .with_network(Arc::new(StaticNetwork(NetworkInfo::from_config(
                &cfg.network,
            )))))
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_activity(mut self, activity: ActivityMonitor) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkQuality>) -> Self {
        self.network = network;
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl fmt::Debug for PrefetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchContext")
            .field("storage", &self.storage.dir())
            .field("tuning", &self.tuning)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
