//! Structured lifecycle events for corpus runs.
//!
//! - `CorpusSpan`: RAII guard entering a run-scoped span
//! - `emit_*`: one `info!`/`warn!` event per lifecycle step, keyed by `event`

use tracing::{info, warn};

use crate::domain::report::{Verdict, VerdictReport};

/// RAII guard that enters a run-scoped span for the duration of a corpus run.
///
/// ```ignore
/// let _span = CorpusSpan::enter(&run_id.to_string());
/// // every event below carries run_id
/// ```
pub struct CorpusSpan {
    _span: tracing::span::EnteredSpan,
}

impl CorpusSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: corpus_span(run_id).entered(),
        }
    }
}

/// The run-scoped span, for instrumenting async work.
///
/// An entered guard must not be held across `.await`; attach this span
/// with `tracing::Instrument` instead.
pub fn corpus_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("faultcorpus.run", run_id = %run_id)
}

/// Emit event: corpus run started.
pub fn emit_corpus_started(run_id: &str, kinds: usize, parallelism: usize) {
    info!(
        event = "corpus.started",
        run_id = %run_id,
        kinds = kinds,
        parallelism = parallelism,
    );
}

/// Emit event: one kind was judged.
pub fn emit_kind_finished(run_id: &str, verdict: &Verdict) {
    info!(
        event = "kind.finished",
        run_id = %run_id,
        kind = %verdict.kind,
        status = verdict.status.label(),
        duration_ms = verdict.duration_ms.unwrap_or(0),
    );
}

pub fn emit_corpus_finished(run_id: &str, report: &VerdictReport, duration_ms: u64) {
    info!(
        event = "corpus.finished",
        run_id = %run_id,
        total = report.summary.total,
        passed = report.summary.passed,
        failed = report.summary.failed,
        errored = report.summary.errored,
        duration_ms = duration_ms,
        success = report.all_passed(),
    );
}

/// Emit event: run aborted (warning level).
pub fn emit_corpus_aborted(run_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "corpus.aborted", run_id = %run_id, reason = %reason);
}
