//! Idle-gated, resumable background prefetch engine.
//!
//! A [`task::PrefetchTask`] downloads one resource in byte-range chunks while
//! the host is idle, writing each block through a durable [`store::ChunkStore`]
//! so a later process can resume from the stored prefix. A
//! [`scheduler::PrefetchManager`] runs many tasks under a priority-ordered
//! concurrency ceiling.

pub mod config;
pub mod logging;

pub mod activity;
pub mod admission;
pub mod checksum;
pub mod fetch;
pub mod range;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod url_model;

pub use activity::{ActivityEvent, ActivityMonitor, Initiator, ObserverHandle};
pub use admission::{AdmissionFlags, EffectiveType, NetworkInfo, NetworkQuality, Rejection};
pub use scheduler::{ManagedRequest, ManagerError, PrefetchManager, Progress, TaskReport, TaskState};
pub use store::{StoreKind, StorePreference, StorageRoot};
pub use task::{
    PrefetchContext, PrefetchError, PrefetchRequest, PrefetchTask, StartOutcome, StatusEvent,
    TaskStatus, Tuning,
};
