//! Exclusive per-run scratch space and process-group cleanup.

use std::path::{Path, PathBuf};

use faultcorpus_core::{KindId, OracleError};
use tracing::debug;

/// Temporary directory owned by one run. Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn create(kind: &KindId) -> Result<Self, OracleError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("faultcorpus-{}-", kind))
            .tempdir()
            .map_err(|e| OracleError::Workspace {
                kind: kind.clone(),
                reason: format!("create temp dir: {e}"),
            })?;
        debug!(kind = %kind, dir = ?dir.path(), "created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    pub fn exe_path(&self) -> PathBuf {
        self.dir.path().join("program")
    }
}

/// Kills a child's whole process group when dropped.
///
/// The child must have been spawned as a group leader (`process_group(0)`),
/// so its pid is also the group id.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Send SIGKILL to every process in the group. Idempotent.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored.
    let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if ret == 0 {
        debug!(pgid, "killed process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
