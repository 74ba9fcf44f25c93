//! Retry and backoff policy for failed chunk attempts.
//!
//! Every transient failure is retried; the policy only decides how long to
//! wait and when to give up. The failure counter is owned by the caller and
//! counts consecutive failures, resetting after any successful chunk.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
