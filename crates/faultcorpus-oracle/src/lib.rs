//! faultcorpus oracle
//!
//! Runs synthesized programs through a compiler/sanitizer toolchain and
//! turns the outcomes into a verdict report.

pub mod cancel;
pub mod pipeline;
pub mod runner;
pub mod toolchain;
pub mod workspace;

pub use cancel::CancelToken;
pub use pipeline::{CorpusPipeline, PipelineConfig, CANCELLED_REASON};
pub use runner::{Oracle, SubprocessOracle};
pub use toolchain::{resolve_executable, ResolvedTools, ToolConfig};
pub use workspace::{ProcessGroupGuard, Workspace};
