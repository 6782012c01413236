use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Counters for one session's saves and mirror traffic
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub saves: AtomicU64,
    pub mirror_calls: AtomicU64,
    pub mirror_failures: AtomicU64,
    pub suppressed_calls: AtomicU64,
    pub repairs: AtomicU64,
    pub pages_created: AtomicU64,
    pub pages_archived: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mirror_call(&self) {
        self.mirror_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mirror_failure(&self, operation: &str) {
        self.mirror_failures.fetch_add(1, Ordering::Relaxed);
        warn!(operation, "Mirror call failed");
    }

    pub fn record_suppressed(&self) {
        self.suppressed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_created(&self) {
        self.pages_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_archived(&self) {
        self.pages_archived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            saves: self.saves.load(Ordering::Relaxed),
            mirror_calls: self.mirror_calls.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
            suppressed_calls: self.suppressed_calls.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
            pages_created: self.pages_created.load(Ordering::Relaxed),
            pages_archived: self.pages_archived.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            saves = stats.saves,
            mirror_calls = stats.mirror_calls,
            mirror_failures = stats.mirror_failures,
            suppressed = stats.suppressed_calls,
            repairs = stats.repairs,
            created = stats.pages_created,
            archived = stats.pages_archived,
            "Sync metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub saves: u64,
    pub mirror_calls: u64,
    pub mirror_failures: u64,
    pub suppressed_calls: u64,
    pub repairs: u64,
    pub pages_created: u64,
    pub pages_archived: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
