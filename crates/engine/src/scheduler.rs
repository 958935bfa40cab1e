//! The fetch scheduler (C7): bounds how many fetches, delta-part fetches,
//! and local writes are in flight at once, and retries transient fetch
//! failures up to the caller's network-retry budget.
//!
//! # Design
//!
//! Three independent [`tokio::sync::Semaphore`]s implement the three
//! bounds in [`dagsync_core::options::SchedulerLimits`]: `max_fetches`
//! gates metadata/content/delta-index/delta-superblock fetches together,
//! `max_delta_parts` additionally and more tightly gates delta-part
//! fetches (acquiring both the fetch and delta-part permits), and
//! `max_writes` gates local object writes independently of network
//! activity. Retrying happens inside the permit: a retry does not give up
//! its concurrency slot, matching the spec's framing of retries as part of
//! one logical fetch rather than a new one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dagsync_core::options::SchedulerLimits;
use dagsync_transport::fetch::{FetchError, FetchOutcome};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded-concurrency, retrying dispatcher for the pull engine's three
/// resource classes.
pub struct Scheduler {
    fetch_semaphore: Arc<Semaphore>,
    delta_part_semaphore: Arc<Semaphore>,
    write_semaphore: Arc<Semaphore>,
    n_network_retries: u32,
}

impl Scheduler {
    /// Builds a scheduler with `limits`' bounds and `n_network_retries`
    /// retry attempts per fetch.
    #[must_use]
    pub fn new(limits: SchedulerLimits, n_network_retries: u32) -> Self {
        Self {
            fetch_semaphore: Arc::new(Semaphore::new(limits.max_fetches.get())),
            delta_part_semaphore: Arc::new(Semaphore::new(limits.max_delta_parts.get())),
            write_semaphore: Arc::new(Semaphore::new(limits.max_writes.get())),
            n_network_retries,
        }
    }

    /// Runs `op` under the fetch bound, retrying transient [`FetchError`]s
    /// up to the configured retry budget with exponential backoff.
    pub async fn fetch<F, Fut>(&self, op: F) -> Result<FetchOutcome, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchOutcome, FetchError>>,
    {
        let _permit = self
            .fetch_semaphore
            .acquire()
            .await
            .expect("fetch semaphore is never closed");
        self.retry(op).await
    }

    /// Runs `op` under both the fetch bound and the tighter delta-part
    /// bound, retrying the same way as [`Scheduler::fetch`].
    pub async fn fetch_delta_part<F, Fut>(&self, op: F) -> Result<FetchOutcome, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchOutcome, FetchError>>,
    {
        let _fetch_permit = self
            .fetch_semaphore
            .acquire()
            .await
            .expect("fetch semaphore is never closed");
        let _part_permit = self
            .delta_part_semaphore
            .acquire()
            .await
            .expect("delta-part semaphore is never closed");
        self.retry(op).await
    }

    async fn retry<F, Fut>(&self, op: F) -> Result<FetchOutcome, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchOutcome, FetchError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < self.n_network_retries => {
                    attempt += 1;
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Acquires a local-write permit, released when the returned guard
    /// drops.
    pub async fn write_permit(&self) -> OwnedSemaphorePermit {
        self.write_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("write semaphore is never closed")
    }
}

/// Exponential backoff with a 1s cap, `100ms * 2^(attempt-1)`.
fn backoff(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(1u64 << attempt.min(3));
    Duration::from_millis(millis.min(1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::num::NonZeroUsize;

    fn limits() -> SchedulerLimits {
        SchedulerLimits {
            max_fetches: NonZeroUsize::new(2).unwrap(),
            max_delta_parts: NonZeroUsize::new(1).unwrap(),
            max_writes: NonZeroUsize::new(1).unwrap(),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_success() {
        let scheduler = Scheduler::new(limits(), 5);
        let calls = AtomicU32::new(0);
        let outcome = scheduler
            .fetch(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(FetchOutcome::NotModified)
            })
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_the_budget() {
        let scheduler = Scheduler::new(limits(), 2);
        let calls = AtomicU32::new(0);
        let outcome = scheduler
            .fetch(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchError::Transient {
                        path: "x".into(),
                        message: "timeout".into(),
                    })
                } else {
                    Ok(FetchOutcome::NotModified)
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_fatal_failures() {
        let scheduler = Scheduler::new(limits(), 5);
        let calls = AtomicU32::new(0);
        let err = scheduler
            .fetch(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Fatal {
                    path: "x".into(),
                    message: "bad request".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Fatal { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_the_retry_budget_surfaces_the_transient_error() {
        let scheduler = Scheduler::new(limits(), 1);
        let calls = AtomicU32::new(0);
        let err = scheduler
            .fetch(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Transient {
                    path: "x".into(),
                    message: "timeout".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
