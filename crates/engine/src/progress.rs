//! The progress reporter (C10): an in-memory snapshot of one pull's
//! counters, throttled to the caller's `update-frequency` (§6) so a fast
//! local mirror doesn't spam a progress callback thousands of times a
//! second.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A point-in-time view of one pull's progress counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Objects fetched (or confirmed already present) so far.
    pub objects_fetched: u64,
    /// Bytes transferred over the network so far.
    pub bytes_fetched: u64,
    /// Objects enqueued but not yet resolved, the scan queue's current
    /// frontier size.
    pub objects_pending: u64,
    /// Name of the ref currently being pulled, if any.
    pub current_ref: Option<String>,
}

/// Accumulates counters and decides, via [`ProgressReporter::should_emit`],
/// when enough time has passed since the last emission to justify another
/// snapshot.
pub struct ProgressReporter {
    update_frequency: Duration,
    last_emit: Mutex<Option<Instant>>,
    objects_fetched: AtomicU64,
    bytes_fetched: AtomicU64,
    objects_pending: AtomicU64,
    current_ref: Mutex<Option<String>>,
}

impl ProgressReporter {
    /// Builds a reporter throttled to `update_frequency_ms` between
    /// emissions; `0` means every change is eligible to emit.
    #[must_use]
    pub fn new(update_frequency_ms: u64) -> Self {
        Self {
            update_frequency: Duration::from_millis(update_frequency_ms),
            last_emit: Mutex::new(None),
            objects_fetched: AtomicU64::new(0),
            bytes_fetched: AtomicU64::new(0),
            objects_pending: AtomicU64::new(0),
            current_ref: Mutex::new(None),
        }
    }

    /// Records one more object fetched (or confirmed present), carrying
    /// `bytes` transferred for it (`0` for a local-cache hit).
    pub fn record_object(&self, bytes: u64) {
        self.objects_fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Updates the scan queue's current frontier size.
    pub fn set_pending(&self, pending: u64) {
        self.objects_pending.store(pending, Ordering::Relaxed);
    }

    /// Records which ref is currently being pulled.
    pub fn set_current_ref(&self, name: impl Into<String>) {
        *self.current_ref.lock().expect("progress lock poisoned") = Some(name.into());
    }

    /// The current counters, regardless of throttling.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            objects_fetched: self.objects_fetched.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            objects_pending: self.objects_pending.load(Ordering::Relaxed),
            current_ref: self.current_ref.lock().expect("progress lock poisoned").clone(),
        }
    }

    /// Whether enough time has passed since the last call that returned
    /// `true` to justify emitting another snapshot. Always `true` on the
    /// first call.
    pub fn should_emit(&self) -> bool {
        let mut last_emit = self.last_emit.lock().expect("progress lock poisoned");
        let now = Instant::now();
        let due = match *last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.update_frequency,
        };
        if due {
            *last_emit = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_objects() {
        let reporter = ProgressReporter::new(0);
        reporter.record_object(100);
        reporter.record_object(50);
        reporter.set_pending(3);
        reporter.set_current_ref("stable");
        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.objects_fetched, 2);
        assert_eq!(snapshot.bytes_fetched, 150);
        assert_eq!(snapshot.objects_pending, 3);
        assert_eq!(snapshot.current_ref, Some("stable".to_string()));
    }

    #[test]
    fn zero_frequency_always_emits() {
        let reporter = ProgressReporter::new(0);
        assert!(reporter.should_emit());
        assert!(reporter.should_emit());
    }

    #[test]
    fn nonzero_frequency_throttles_back_to_back_calls() {
        let reporter = ProgressReporter::new(60_000);
        assert!(reporter.should_emit());
        assert!(!reporter.should_emit());
    }
}
