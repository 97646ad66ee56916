//! Process-wide pipeline counters.
//!
//! Call sites only bump counters. The CLI logs them once per command
//! through [`Metrics::flush`]; tests read them through [`Metrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub static METRICS: Metrics = Metrics::new();

#[derive(Debug, Default)]
pub struct Metrics {
    llm_calls: AtomicU64,
    embedding_calls: AtomicU64,
    schema_failures: AtomicU64,
    clusters_skipped: AtomicU64,
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub embedding_calls: u64,
    pub schema_failures: u64,
    pub clusters_skipped: u64,
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            llm_calls: AtomicU64::new(0),
            embedding_calls: AtomicU64::new(0),
            schema_failures: AtomicU64::new(0),
            clusters_skipped: AtomicU64::new(0),
        }
    }

    /// One LLM attempt; retries count again.
    pub fn inc_llm_calls(&self) {
        bump(&self.llm_calls, "llm_calls");
    }

    /// One embedding request to a backend, whatever its batch size.
    pub fn inc_embedding_calls(&self) {
        bump(&self.embedding_calls, "embedding_calls");
    }

    pub fn inc_schema_failures(&self) {
        bump(&self.schema_failures, "schema_failures");
    }

    pub fn inc_clusters_skipped(&self) {
        bump(&self.clusters_skipped, "clusters_skipped");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            llm_calls: self.llm_calls(),
            embedding_calls: self.embedding_calls(),
            schema_failures: self.schema_failures(),
            clusters_skipped: self.clusters_skipped(),
        }
    }

    /// Log every counter in one `metrics.flush` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            event = "metrics.flush",
            llm_calls = s.llm_calls,
            embedding_calls = s.embedding_calls,
            schema_failures = s.schema_failures,
            clusters_skipped = s.clusters_skipped,
        );
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::Relaxed)
    }

    pub fn embedding_calls(&self) -> u64 {
        self.embedding_calls.load(Ordering::Relaxed)
    }

    pub fn schema_failures(&self) -> u64 {
        self.schema_failures.load(Ordering::Relaxed)
    }

    pub fn clusters_skipped(&self) -> u64 {
        self.clusters_skipped.load(Ordering::Relaxed)
    }

    /// Zero every counter, e.g. between two pipeline runs in one process.
    pub fn reset(&self) {
        for counter in [
            &self.llm_calls,
            &self.embedding_calls,
            &self.schema_failures,
            &self.clusters_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = Metrics::new();
        m.inc_llm_calls();
        m.inc_llm_calls();
        m.inc_embedding_calls();
        m.inc_schema_failures();
        m.inc_clusters_skipped();
        m.inc_clusters_skipped();
        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                llm_calls: 2,
                embedding_calls: 1,
                schema_failures: 1,
                clusters_skipped: 2,
            }
        );
    }

    #[test]
    fn reset_returns_to_default_snapshot() {
        let m = Metrics::new();
        m.inc_llm_calls();
        m.inc_clusters_skipped();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
