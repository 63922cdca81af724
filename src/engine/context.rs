use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, ScanError};

/// Per-request cancellation and liveness handle. The walker calls
/// `checkpoint` at every safe point; cancellation requests and inactivity
/// both surface there as `ScanError::Cancelled`.
pub struct ScanContext {
    pub scan_id: String,
    cancelled: AtomicBool,
    last_activity: Mutex<Instant>,
    inactive_threshold: Duration,
}

impl ScanContext {
    #[must_use]
    pub fn new(scan_id: &str, inactive_threshold_secs: u64) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            cancelled: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            inactive_threshold: Duration::from_secs(inactive_threshold_secs),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record that the scan produced output; resets the inactivity clock.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Cooperative cancellation point. A scan idle past its inactivity
    /// threshold cancels itself here.
    pub fn checkpoint(&self, reason: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ScanError::Cancelled(reason.to_string()));
        }
        let idle = self
            .last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default();
        if idle > self.inactive_threshold {
            self.cancel();
            return Err(ScanError::Cancelled(format!(
                "{reason} (inactive for {}s)",
                idle.as_secs()
            )));
        }
        Ok(())
    }
}

/// Outcome of a counter claim for one prospective finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The finding may be emitted; `at_cap` is true when this claim was the
    /// one that met the global cap, so the walk must stop afterwards.
    Granted { at_cap: bool },
    /// The cap was already reached; nothing may be emitted.
    Denied,
}

/// Shared per-scan finding counter enforcing `max_secrets`. Claims are made
/// before emission so concurrent workers can never overshoot the cap.
pub struct ScanCounters {
    secrets: AtomicU64,
    limit: u64,
}

impl ScanCounters {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            secrets: AtomicU64::new(0),
            limit,
        }
    }

    pub fn claim(&self) -> Claim {
        let previous =
            self.secrets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    if current < self.limit {
                        Some(current + 1)
                    } else {
                        None
                    }
                });
        match previous {
            Ok(before) => Claim::Granted {
                at_cap: before + 1 >= self.limit,
            },
            Err(_) => Claim::Denied,
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.secrets.load(Ordering::SeqCst)
    }
}
