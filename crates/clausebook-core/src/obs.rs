//! Structured observability hooks for pipeline lifecycle events.
//!
//! Events are emitted at `info!` level unless noted; filter them with
//! `RUST_LOG` and switch to JSON output with the CLI's `--json` flag.

use tracing::{info, warn};

/// RAII guard that enters a pipeline-scoped span for the duration of a
/// command, tagging every nested event with `run_id`.
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("clausebook.pipeline", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_parse_started(strategy: &str, text_len: usize) {
    info!(event = "parse.started", strategy = %strategy, text_len = text_len);
}

pub fn emit_parse_finished(strategy: &str, sections: usize, clauses: usize, duration_ms: u64) {
    info!(
        event = "parse.finished",
        strategy = %strategy,
        sections = sections,
        clauses = clauses,
        duration_ms = duration_ms,
    );
}

pub fn emit_cluster_finished(clauses: usize, clusters: usize, noise: usize) {
    info!(
        event = "cluster.finished",
        clauses = clauses,
        clusters = clusters,
        noise = noise,
    );
}

pub fn emit_section_generated(cluster_id: i32, clauses: usize, title: &str) {
    info!(
        event = "playbook.section_generated",
        cluster_id = cluster_id,
        clauses = clauses,
        title = %title,
    );
}

/// Warn-level: a cluster was dropped under the skip failure policy.
pub fn emit_cluster_skipped(cluster_id: i32, error: &dyn std::fmt::Display) {
    warn!(event = "playbook.cluster_skipped", cluster_id = cluster_id, error = %error);
}

/// Warn-level: an LLM call failed for good (after any retries).
pub fn emit_llm_call_failed(context: &str, error: &dyn std::fmt::Display) {
    warn!(event = "llm.call_failed", context = %context, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_pipeline_span_create() {
        let _span = PipelineSpan::enter("test-run-id");
    }

    #[traced_test]
    #[test]
    fn lifecycle_events_carry_their_names() {
        emit_parse_started("multi", 120);
        emit_cluster_finished(10, 2, 3);
        assert!(logs_contain("parse.started"));
        assert!(logs_contain("cluster.finished"));
        assert!(logs_contain("noise=3"));
    }

    #[traced_test]
    #[test]
    fn skipped_cluster_is_a_warning() {
        emit_cluster_skipped(4, &"expected 4 variants, got 3");
        assert!(logs_contain("WARN"));
        assert!(logs_contain("playbook.cluster_skipped"));
        assert!(logs_contain("cluster_id=4"));
    }
}
