//! Captured output of one oracle run.

use std::sync::Arc;

use super::program::ProgramSpec;

/// Result of executing one [`ProgramSpec`] under the external tool.
///
/// Holds the program by `Arc` so it stays alive while the result is being
/// verified, even after the runner has released its workspace.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub program: Arc<ProgramSpec>,

    /// Exit code, `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,

    /// Terminating signal number (unix only).
    pub signal: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr (sanitizers report here).
    pub stderr: String,

    /// Compiler stderr (warnings) from the build step.
    pub compile_stderr: String,

    /// Wall time of the execution step in milliseconds.
    pub duration_ms: u64,

    /// Whether any captured stream hit the output cap.
    pub truncated: bool,
}

impl RunResult {
    /// Text the verifier searches: stderr followed by stdout.
    pub fn diagnostic_text(&self) -> String {
        let mut text = String::with_capacity(self.stderr.len() + self.stdout.len() + 1);
        text.push_str(&self.stderr);
        if !self.stderr.is_empty() && !self.stderr.ends_with('\n') && !self.stdout.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.stdout);
        text
    }
}
