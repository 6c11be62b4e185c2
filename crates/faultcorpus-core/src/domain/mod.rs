//! Domain types shared by the catalog, synthesizer, runner and verifier.

pub mod error;
pub mod kind;
pub mod program;
pub mod report;
pub mod run;

pub use error::{ErrorCategory, FaultError, OracleError, Result, RunOutcome};
pub use kind::{
    Access, Construct, ExpectedSignature, FaultClass, FaultKind, KindId, MatchMode, Variant,
};
pub use program::{source_digest, ProgramSpec};
pub use report::{ReportSummary, Verdict, VerdictReport, VerdictStatus};
pub use run::RunResult;
