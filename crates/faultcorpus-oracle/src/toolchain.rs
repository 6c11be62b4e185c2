//! Toolchain configuration and executable discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use faultcorpus_core::{OracleError, ToolchainSection};

/// How programs are compiled and executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    /// Compiler name (looked up on `PATH`) or path.
    pub compiler: String,

    /// Flags placed before `-o <exe> <src>`.
    pub flags: Vec<String>,

    /// Extra environment for the executed program.
    pub env: BTreeMap<String, String>,

    /// Optional command prefix for execution (e.g. `valgrind -q`).
    pub run_wrapper: Vec<String>,

    /// Hard wall-clock bound on one execution.
    pub timeout: Duration,

    pub compile_timeout: Duration,

    /// Per-stream cap on captured output.
    pub max_output_bytes: usize,

    /// RLIMIT_CPU for the executed program.
    pub cpu_limit_secs: Option<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::from_section(&ToolchainSection::default())
    }
}

impl ToolConfig {
    /// Build from the `[toolchain]` section of a config file.
    pub fn from_section(section: &ToolchainSection) -> Self {
        Self {
            compiler: section.compiler.clone(),
            flags: section.flags.clone(),
            env: section.env.clone(),
            run_wrapper: section.run_wrapper.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            compile_timeout: Duration::from_secs(section.compile_timeout_secs),
            max_output_bytes: section.max_output_bytes,
            cpu_limit_secs: section.cpu_limit_secs,
        }
    }

    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_run_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.run_wrapper = wrapper;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cpu_limit_secs(mut self, secs: Option<u64>) -> Self {
        self.cpu_limit_secs = secs;
        self
    }

    /// Resolve the compiler and the run wrapper, if any.
    pub fn resolve(&self) -> Result<ResolvedTools, OracleError> {
        let compiler = resolve_executable(&self.compiler)?;
        let wrapper = match self.run_wrapper.first() {
            Some(name) => Some(resolve_executable(name)?),
            None => None,
        };
        Ok(ResolvedTools { compiler, wrapper })
    }
}

/// Absolute paths of the tools a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTools {
    pub compiler: PathBuf,
    pub wrapper: Option<PathBuf>,
}

/// Find `name` on `PATH`, or accept it as-is when it contains a separator.
pub fn resolve_executable(name: &str) -> Result<PathBuf, OracleError> {
    let unavailable = |reason: String| OracleError::ToolUnavailable {
        tool: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(unavailable("empty executable name".to_string()));
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(unavailable("executable not found".to_string()))
        };
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
        .ok_or_else(|| unavailable("executable not found on PATH".to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
