//! Verdict report produced by a corpus run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ErrorCategory;
use super::kind::{FaultClass, KindId, MatchMode};

/// Per-kind status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerdictStatus {
    /// The diagnostic text contained the expected signature.
    Pass,
    /// The program ran but the signature was not observed.
    Fail,
    /// No verdict could be computed.
    Error {
        category: ErrorCategory,
        message: String,
    },
}

impl VerdictStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Fail => "fail",
            VerdictStatus::Error { .. } => "error",
        }
    }
}

/// Verdict for one fault kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: KindId,
    pub class: FaultClass,
    #[serde(flatten)]
    pub status: VerdictStatus,
    pub expected: String,
    pub match_mode: MatchMode,
    /// Snippet of what the tool actually reported.
    pub observed: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
    pub program_digest: Option<String>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self.status, VerdictStatus::Pass)
    }
}

/// Aggregate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Result of a whole corpus run, in catalog registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub verdicts: Vec<Verdict>,
    pub summary: ReportSummary,
    /// Set when the run was aborted (tool unavailable, cancellation).
    pub aborted: Option<String>,
}

impl VerdictReport {
    /// Assemble a report. Counts are derived from `verdicts`.
    pub fn new(verdicts: Vec<Verdict>, aborted: Option<String>) -> Self {
        let mut summary = ReportSummary {
            total: verdicts.len(),
            ..ReportSummary::default()
        };
        for v in &verdicts {
            match v.status {
                VerdictStatus::Pass => summary.passed += 1,
                VerdictStatus::Fail => summary.failed += 1,
                VerdictStatus::Error { .. } => summary.errored += 1,
            }
        }
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            verdicts,
            summary,
            aborted,
        }
    }

    /// Whether every kind passed and the run was not aborted.
    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.summary.passed == self.summary.total
    }

    /// Process exit code: 0 all pass, 1 any failure, 2 infrastructure abort.
    pub fn exit_code(&self) -> i32 {
        if self.aborted.is_some() {
            2
        } else if self.all_passed() {
            0
        } else {
            1
        }
    }

    pub fn get(&self, kind: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.kind.as_str() == kind)
    }

    /// Kind ids in report order.
    pub fn kinds(&self) -> Vec<&str> {
        self.verdicts.iter().map(|v| v.kind.as_str()).collect()
    }
}
