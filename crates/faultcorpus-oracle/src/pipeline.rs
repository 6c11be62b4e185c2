//! Corpus pipeline: catalog -> synthesizer -> oracle (bounded, concurrent)
//! -> verifier -> report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use faultcorpus_core::{
    corpus_span, emit_corpus_aborted, emit_corpus_finished, emit_corpus_started,
    emit_kind_finished, Catalog, CorpusConfig, CorpusSpan, KindId, OracleError,
    ProgramSpec, Result, RunOutcome, Synthesizer, VerdictReport, Verifier,
};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::runner::Oracle;
use crate::toolchain::ToolConfig;

/// Reason recorded when a run is cancelled from outside.
pub const CANCELLED_REASON: &str = "cancelled";

/// Pipeline scheduling and toolchain settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum concurrent oracle runs.
    pub parallelism: usize,
    pub tool: ToolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            tool: ToolConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(tool: ToolConfig) -> Self {
        Self {
            tool,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self {
            parallelism: config.pipeline.parallelism,
            tool: ToolConfig::from_section(&config.toolchain),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Runs a corpus end to end.
pub struct CorpusPipeline {
    oracle: Arc<dyn Oracle>,
    config: PipelineConfig,
    verifier: Verifier,
}

impl CorpusPipeline {
    pub fn new(oracle: Arc<dyn Oracle>, config: PipelineConfig) -> Self {
        Self {
            oracle,
            config,
            verifier: Verifier::new(),
        }
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Synthesize, run and verify the `requested` kinds (all when empty).
    ///
    /// Selection and synthesis problems are returned as errors before any
    /// program runs. Everything after that lands in the report: per-kind
    /// failures as `error` verdicts, an unavailable toolchain or external
    /// cancellation as `aborted`. Every spawned run has finished (and its
    /// process group has been killed) by the time this returns.
    pub async fn run(
        &self,
        catalog: &Catalog,
        requested: &[KindId],
        cancel: &CancelToken,
    ) -> Result<VerdictReport> {
        let selection = catalog.select(requested)?;
        let programs = selection
            .iter()
            .map(|kind| Synthesizer::synthesize_default(kind).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let run_id = Uuid::new_v4();
        let run_id_str = run_id.to_string();
        let started = Instant::now();

        let (results, aborted) = self
            .execute(&run_id_str, programs, cancel)
            .instrument(corpus_span(&run_id_str))
            .await;

        let _span = CorpusSpan::enter(&run_id_str);
        let mut report = self
            .verifier
            .verify_selection(&selection, &results, aborted);
        report.run_id = run_id;

        for verdict in &report.verdicts {
            emit_kind_finished(&run_id_str, verdict);
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        match &report.aborted {
            Some(reason) => emit_corpus_aborted(&run_id_str, reason),
            None => emit_corpus_finished(&run_id_str, &report, duration_ms),
        }
        Ok(report)
    }

    async fn execute(
        &self,
        run_id: &str,
        programs: Vec<Arc<ProgramSpec>>,
        cancel: &CancelToken,
    ) -> (HashMap<KindId, RunOutcome>, Option<String>) {
        let parallelism = self.config.parallelism.max(1);
        emit_corpus_started(run_id, programs.len(), parallelism);

        if cancel.is_cancelled() {
            let results = programs
                .iter()
                .map(|p| (p.kind.clone(), Err(OracleError::Cancelled { kind: p.kind.clone() })))
                .collect();
            return (results, Some(CANCELLED_REASON.to_string()));
        }

        if let Err(err) = self.oracle.check_available(&self.config.tool).await {
            warn!(error = %err, "toolchain preflight failed");
            let results = programs
                .iter()
                .map(|p| (p.kind.clone(), Err(err.clone())))
                .collect();
            return (results, Some(err.to_string()));
        }

        let tool = Arc::new(self.config.tool.clone());
        let sem = Arc::new(Semaphore::new(parallelism));
        // Set when a sibling hits a fatal error.
        let abort = CancelToken::new();

        let mut tasks = Vec::with_capacity(programs.len());
        for program in programs {
            let id = program.kind.clone();
            let oracle = Arc::clone(&self.oracle);
            let tool = Arc::clone(&tool);
            let sem = Arc::clone(&sem);
            let cancel = cancel.clone();
            let abort = abort.clone();

            let task = tokio::spawn(
                async move {
                    let kind = program.kind.clone();
                    let _permit = match sem.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Err(OracleError::Internal {
                                kind,
                                reason: "scheduler closed".to_string(),
                            })
                        }
                    };
                    if cancel.is_cancelled() || abort.is_cancelled() {
                        return Err(OracleError::Cancelled { kind });
                    }

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(OracleError::Cancelled { kind: kind.clone() }),
                        _ = abort.cancelled() => Err(OracleError::Cancelled { kind: kind.clone() }),
                        outcome = oracle.run(program, &tool) => outcome,
                    };

                    if let Err(err) = &outcome {
                        if err.is_fatal() {
                            warn!(kind = %kind, error = %err, "fatal oracle error, cancelling siblings");
                            abort.cancel();
                        }
                    }
                    outcome
                }
                .in_current_span(),
            );
            tasks.push((id, task));
        }

        let (kinds, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut results = HashMap::with_capacity(kinds.len());
        let mut fatal: Option<OracleError> = None;
        for (kind, joined) in kinds.into_iter().zip(joined) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(OracleError::Internal {
                    kind: kind.clone(),
                    reason: format!("run task failed: {e}"),
                }),
            };
            if let Err(err) = &outcome {
                if err.is_fatal() && fatal.is_none() {
                    fatal = Some(err.clone());
                }
            }
            results.insert(kind, outcome);
        }

        let any_cancelled = results
            .values()
            .any(|o| matches!(o, Err(OracleError::Cancelled { .. })));
        let aborted = match fatal {
            Some(err) => Some(err.to_string()),
            None if any_cancelled => Some(CANCELLED_REASON.to_string()),
            None => None,
        };
        info!(kinds = results.len(), aborted = aborted.is_some(), "all runs finished");
        (results, aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_from_corpus_config() {
        let config = CorpusConfig::from_toml_str(
            "[pipeline]\nparallelism = 7\n[toolchain]\ncompiler = \"gcc\"\ntimeout_secs = 3\n",
        )
        .unwrap();
        let pc = PipelineConfig::from_config(&config);
        assert_eq!(pc.parallelism, 7);
        assert_eq!(pc.tool.compiler, "gcc");
        assert_eq!(pc.tool.timeout, std::time::Duration::from_secs(3));
    }
}
