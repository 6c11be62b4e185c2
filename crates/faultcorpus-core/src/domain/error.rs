//! Error taxonomy for faultcorpus.
//!
//! Two layers:
//! - [`FaultError`]: configuration-time errors. The caller can correct them,
//!   and they abort a corpus run before any program executes.
//! - [`OracleError`]: run-time errors from the compiler/sanitizer layer. They
//!   are recorded per kind in the verdict report instead of propagating.

use serde::{Deserialize, Serialize};

use super::kind::KindId;

/// Configuration-time errors.
#[derive(Debug, thiserror::Error)]
pub enum FaultError {
    #[error("fault kind already registered: {kind}")]
    DuplicateKind { kind: KindId },

    #[error("unknown fault kind: {kind}")]
    UnknownKind { kind: KindId },

    #[error("unsupported variant for {kind}: {reason}")]
    UnsupportedVariant { kind: KindId, reason: String },

    #[error("invalid expected signature for {kind}: {reason}")]
    InvalidSignature { kind: KindId, reason: String },

    #[error("invalid fault kind id {id:?}: {reason}")]
    InvalidKindId { id: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration-time operations.
pub type Result<T> = std::result::Result<T, FaultError>;

/// Run-time errors raised while compiling or executing a synthesized program.
///
/// `Clone + Serialize` so a failure can be stored in a report next to the
/// verdicts of the kinds that did run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleError {
    #[error("{kind}: program failed to compile: {detail}{}", compile_causes(.diagnostics))]
    Compile {
        kind: KindId,
        detail: String,
        diagnostics: Vec<String>,
    },

    #[error("{kind}: execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        kind: KindId,
        elapsed_ms: u64,
        limit_ms: u64,
    },

    #[error("tool unavailable: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("{kind}: workspace error: {reason}")]
    Workspace { kind: KindId, reason: String },

    #[error("{kind}: run cancelled")]
    Cancelled { kind: KindId },

    #[error("{kind}: internal error: {reason}")]
    Internal { kind: KindId, reason: String },
}

impl OracleError {
    /// Stable category name used in reports.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OracleError::Compile { .. } => ErrorCategory::Compile,
            OracleError::Timeout { .. } => ErrorCategory::Timeout,
            OracleError::ToolUnavailable { .. } => ErrorCategory::ToolUnavailable,
            OracleError::Workspace { .. } => ErrorCategory::Workspace,
            OracleError::Cancelled { .. } => ErrorCategory::Cancelled,
            OracleError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether this error must abort the whole corpus run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::ToolUnavailable { .. })
    }
}

/// Diagnostics shown in a compile error message.
const COMPILE_CAUSES_SHOWN: usize = 3;

fn compile_causes(diagnostics: &[String]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }
    let mut out = String::from(": ");
    out.push_str(&diagnostics[..diagnostics.len().min(COMPILE_CAUSES_SHOWN)].join("; "));
    if diagnostics.len() > COMPILE_CAUSES_SHOWN {
        out.push_str(&format!(" (+{} more)", diagnostics.len() - COMPILE_CAUSES_SHOWN));
    }
    out
}

/// Category of a per-kind error in a verdict report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Compile,
    Timeout,
    ToolUnavailable,
    Workspace,
    Cancelled,
    Internal,
    /// No outcome was recorded for a requested kind.
    Missing,
    /// The expected signature could not be evaluated.
    Signature,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Compile => "compile",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ToolUnavailable => "tool_unavailable",
            ErrorCategory::Workspace => "workspace",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Internal => "internal",
            ErrorCategory::Missing => "missing",
            ErrorCategory::Signature => "signature",
        };
        f.write_str(s)
    }
}

/// Result of running one program through the oracle.
pub type RunOutcome = std::result::Result<super::run::RunResult, OracleError>;
