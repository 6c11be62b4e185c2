//! faultcorpus core library
//!
//! Fault catalog, program synthesis, diagnostics parsing and verdict
//! verification. Execution lives in `faultcorpus-oracle`.

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod emit;
pub mod obs;
pub mod reporting;
pub mod synth;
pub mod telemetry;
pub mod verifier;

pub use catalog::Catalog;

pub use config::{
    describe_signature, CorpusConfig, KindEntry, PipelineSection, ToolchainSection,
    VariantOverride,
};

pub use diagnostics::{
    describe_observed, parse_compiler_output, sanitizer_headline, CompilerDiagnostic,
    SanitizerHeadline, Severity,
};

pub use domain::{
    source_digest, Access, Construct, ErrorCategory, ExpectedSignature, FaultClass, FaultError,
    FaultKind, KindId, MatchMode, OracleError, ProgramSpec, ReportSummary, Result, RunOutcome,
    RunResult, Variant, Verdict, VerdictReport, VerdictStatus,
};

pub use emit::{emit_corpus, CorpusManifest, ManifestEntry};

pub use obs::{
    corpus_span, emit_corpus_aborted, emit_corpus_finished, emit_corpus_started,
    emit_kind_finished, CorpusSpan,
};

pub use reporting::{
    render_report_json, render_report_md, render_report_text, write_report_json,
    write_report_md,
};

pub use synth::Synthesizer;

pub use telemetry::init_tracing;

pub use verifier::Verifier;
