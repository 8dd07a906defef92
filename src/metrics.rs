//! Lightweight ingestion counters used for diagnostics.
//!
//! The `IngestMetrics` type exposes lock-free counters that track:
//! - Items ingested successfully
//! - Items that failed mid-pipeline
//! - Chunks produced (cumulative)
//!
//! The snapshot is surfaced via HTTP (`GET /metrics`) to help validate source fan-out and
//! overall ingestion activity during development.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
///
/// The struct intentionally stays minimal, just atomic counters, so it can be shared freely
/// and queried without holding locks.
#[derive(Default)]
pub struct IngestMetrics {
    items_ingested: AtomicU64,
    items_failed: AtomicU64,
    chunks_ingested: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully processed item and the number of chunks it produced.
    pub fn record_item(&self, chunk_count: u64) {
        self.items_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an item that failed inside the pipeline.
    pub fn record_failure(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_ingested: self.items_ingested.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Items processed through the whole pipeline since startup.
    pub items_ingested: u64,
    /// Items aborted by a processor or sink failure.
    pub items_failed: u64,
    /// Total chunk count produced across all ingested items.
    pub chunks_ingested: u64,
}

/// Process-wide metrics registry shared by every pipeline run.
pub fn global_metrics() -> &'static IngestMetrics {
    static METRICS: OnceLock<IngestMetrics> = OnceLock::new();
    METRICS.get_or_init(IngestMetrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_items_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_item(2);
        metrics.record_item(3);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_ingested, 2);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.chunks_ingested, 5);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = IngestMetrics::new();
        assert_eq!(metrics.snapshot().items_ingested, 0);
        assert_eq!(metrics.snapshot().chunks_ingested, 0);
    }
}
