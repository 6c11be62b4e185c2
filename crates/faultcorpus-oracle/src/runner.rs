//! Oracle runner: compile a synthesized program and execute it under the
//! configured sanitizer toolchain.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use faultcorpus_core::{
    parse_compiler_output, KindId, OracleError, ProgramSpec, RunOutcome, RunResult,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::toolchain::ToolConfig;
use crate::workspace::{ProcessGroupGuard, Workspace};

/// Compiler diagnostics kept in a `Compile` error when none parse.
const RAW_DIAGNOSTIC_LINES: usize = 20;

/// External checker whose verdict the corpus verifies.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Fail with `ToolUnavailable` when the toolchain cannot be used at all.
    async fn check_available(&self, tool: &ToolConfig) -> Result<(), OracleError>;

    /// Compile and execute one program.
    async fn run(&self, program: Arc<ProgramSpec>, tool: &ToolConfig) -> RunOutcome;
}

/// Oracle backed by a real compiler and subprocess execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessOracle;

impl SubprocessOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Oracle for SubprocessOracle {
    async fn check_available(&self, tool: &ToolConfig) -> Result<(), OracleError> {
        let resolved = tool.resolve()?;
        debug!(compiler = ?resolved.compiler, wrapper = ?resolved.wrapper, "toolchain available");
        Ok(())
    }

    async fn run(&self, program: Arc<ProgramSpec>, tool: &ToolConfig) -> RunOutcome {
        let kind = program.kind.clone();
        let resolved = tool.resolve()?;
        let workspace = Workspace::create(&kind)?;

        let source = workspace.source_path(&program.file_name);
        tokio::fs::write(&source, &program.source)
            .await
            .map_err(|e| OracleError::Workspace {
                kind: kind.clone(),
                reason: format!("write {:?}: {e}", source),
            })?;

        let exe = workspace.exe_path();
        let compile_stderr =
            compile(&kind, &resolved.compiler, tool, &source, &exe, workspace.path()).await?;

        let mut argv: Vec<String> = Vec::new();
        if let Some(wrapper) = &resolved.wrapper {
            argv.push(wrapper.to_string_lossy().into_owned());
            argv.extend(tool.run_wrapper.iter().skip(1).cloned());
        }
        argv.push(exe.to_string_lossy().into_owned());

        let mut result = execute(program, &argv, tool, workspace.path()).await?;
        result.compile_stderr = compile_stderr;

        info!(
            kind = %kind,
            exit_code = ?result.exit_code,
            signal = ?result.signal,
            duration_ms = result.duration_ms,
            "program executed"
        );
        Ok(result)
    }
}

/// Compile `source` into `exe`; returns the compiler's stderr.
async fn compile(
    kind: &KindId,
    compiler: &Path,
    tool: &ToolConfig,
    source: &Path,
    exe: &Path,
    cwd: &Path,
) -> Result<String, OracleError> {
    let mut cmd = Command::new(compiler);
    cmd.args(&tool.flags)
        .arg("-o")
        .arg(exe)
        .arg(source)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| spawn_error(kind, compiler, e))?;
    let _group = ProcessGroupGuard::new(child.id());

    let output = tokio::time::timeout(tool.compile_timeout, child.wait_with_output())
        .await
        .map_err(|_| OracleError::Compile {
            kind: kind.clone(),
            detail: format!(
                "compiler timed out after {} seconds",
                tool.compile_timeout.as_secs()
            ),
            diagnostics: Vec::new(),
        })?
        .map_err(|e| OracleError::Internal {
            kind: kind.clone(),
            reason: format!("wait for compiler: {e}"),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        let diagnostics = compile_diagnostics(&stderr);
        warn!(kind = %kind, status = %output.status, errors = diagnostics.len(), "compilation failed");
        return Err(OracleError::Compile {
            kind: kind.clone(),
            detail: format!("compiler {}", describe_status(&output.status)),
            diagnostics,
        });
    }
    Ok(stderr)
}

/// Error diagnostics from compiler stderr, or its tail when nothing parses.
fn compile_diagnostics(stderr: &str) -> Vec<String> {
    let parsed: Vec<String> = parse_compiler_output(stderr)
        .into_iter()
        .filter(|d| d.severity.is_error())
        .map(|d| d.to_string())
        .collect();
    if !parsed.is_empty() {
        return parsed;
    }
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(RAW_DIAGNOSTIC_LINES);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// Execute `argv` with a hard wall-clock bound.
///
/// The child leads its own process group; the group is killed on timeout
/// and whenever this future is dropped before completion.
async fn execute(
    program_spec: Arc<ProgramSpec>,
    argv: &[String],
    tool: &ToolConfig,
    cwd: &Path,
) -> Result<RunResult, OracleError> {
    let kind = &program_spec.kind;
    let (program, args) = argv.split_first().ok_or_else(|| OracleError::Internal {
        kind: kind.clone(),
        reason: "empty command line".to_string(),
    })?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(&tool.env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        cmd.process_group(0);
        let cpu_limit = tool.cpu_limit_secs;
        // SAFETY: the closure only calls async-signal-safe setrlimit.
        unsafe {
            cmd.pre_exec(move || limit_resources(cpu_limit));
        }
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| spawn_error(kind, Path::new(program), e))?;
    let mut group = ProcessGroupGuard::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let max = tool.max_output_bytes;

    let waited = tokio::time::timeout(tool.timeout, async {
        tokio::join!(read_capped(stdout, max), read_capped(stderr, max), child.wait())
    })
    .await;

    let (stdout, stderr, status) = match waited {
        Ok(parts) => parts,
        Err(_) => {
            group.kill();
            let _ = child.start_kill();
            let _ = child.wait().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            warn!(kind = %kind, elapsed_ms, "execution timed out, process group killed");
            return Err(OracleError::Timeout {
                kind: kind.clone(),
                elapsed_ms,
                limit_ms: duration_ms(tool.timeout),
            });
        }
    };
    // Stragglers that outlived the leader are not part of the result.
    group.kill();

    let status = status.map_err(|e| OracleError::Internal {
        kind: kind.clone(),
        reason: format!("wait for program: {e}"),
    })?;
    let (stdout, stdout_truncated) = stdout.map_err(|e| read_error(kind, e))?;
    let (stderr, stderr_truncated) = stderr.map_err(|e| read_error(kind, e))?;

    Ok(RunResult {
        program: program_spec.clone(),
        exit_code: status.code(),
        signal: exit_signal(&status),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        compile_stderr: String::new(),
        duration_ms: start.elapsed().as_millis() as u64,
        truncated: stdout_truncated || stderr_truncated,
    })
}

/// Read a stream to the end, keeping at most `max` bytes.
///
/// The rest is drained so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, max: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = max.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok((kept, truncated))
}

fn spawn_error(kind: &KindId, program: &Path, e: std::io::Error) -> OracleError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            OracleError::ToolUnavailable {
                tool: program.display().to_string(),
                reason: e.to_string(),
            }
        }
        _ => OracleError::Internal {
            kind: kind.clone(),
            reason: format!("spawn {}: {e}", program.display()),
        },
    }
}

fn read_error(kind: &KindId, e: std::io::Error) -> OracleError {
    OracleError::Internal {
        kind: kind.clone(),
        reason: format!("read program output: {e}"),
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

fn describe_status(status: &ExitStatus) -> String {
    match (status.code(), exit_signal(status)) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(sig)) => format!("killed by signal {sig}"),
        (None, None) => "terminated abnormally".to_string(),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Runs in the forked child before exec: no core dumps, bounded CPU time.
#[cfg(unix)]
fn limit_resources(cpu_limit_secs: Option<u64>) -> std::io::Result<()> {
    let no_core = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: setrlimit reads a fully initialised rlimit.
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &no_core) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    if let Some(secs) = cpu_limit_secs {
        let cpu = libc::rlimit {
            rlim_cur: secs as libc::rlim_t,
            rlim_max: secs.saturating_add(1) as libc::rlim_t,
        };
        // SAFETY: as above.
        if unsafe { libc::setrlimit(libc::RLIMIT_CPU, &cpu) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
