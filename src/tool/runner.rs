//! Subprocess execution with timeouts and bounded output capture.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{ToolError, ToolResult};

/// Default cap on captured output attached to error messages (64 KiB).
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

/// Default cap on output held in memory per stream (16 MiB).
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024 * 1024;

/// One external tool execution.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Path to the executable.
    pub program: PathBuf,
    /// Arguments, not including the program itself.
    pub args: Vec<String>,
    /// Working directory; the tool is expected to write only here.
    pub working_dir: PathBuf,
    /// Wall-clock limit for the whole run.
    pub timeout: Duration,
    /// Files the tool must leave behind, relative to `working_dir`.
    pub expected_artifacts: Vec<PathBuf>,
    /// Maximum bytes of stderr/stdout quoted in a failure.
    pub capture_limit: usize,
    /// Maximum bytes of each stream kept while the tool runs; older output
    /// is dropped so only the tail survives.
    pub output_limit: usize,
}

impl ToolInvocation {
    /// Create an invocation with no arguments and the default capture limit.
    pub fn new(
        program: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout,
            expected_artifacts: Vec::new(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Require an output file to exist after a successful run.
    pub fn expect_artifact(mut self, relative: impl Into<PathBuf>) -> Self {
        self.expected_artifacts.push(relative.into());
        self
    }

    /// Set the capture limit used for failure messages.
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Set how much of each stream is kept in memory.
    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Short name of the tool, for messages and logs.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured result of a tool that exited successfully.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status (always success when returned from [`run`]).
    pub status: ExitStatus,
    /// Captured stdout; only the tail if it outgrew `output_limit`.
    pub stdout: String,
    /// Captured stderr, bounded the same way.
    pub stderr: String,
    /// Wall time from spawn to exit.
    pub elapsed: Duration,
}

/// Verify that `path` names an existing, executable regular file.
pub fn check_executable(path: &Path) -> ToolResult<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound(path.to_path_buf()))
        }
        Err(_) => return Err(ToolError::NotExecutable(path.to_path_buf())),
    };

    if !metadata.is_file() {
        return Err(ToolError::NotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ToolError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Run a tool to completion.
///
/// The process is killed (with its whole process group on unix) if it
/// outlives `invocation.timeout`. A nonzero exit becomes
/// [`ToolError::ExecutionFailure`] carrying the tail of stderr; a missing
/// expected artifact is reported the same way.
pub async fn run(invocation: &ToolInvocation) -> ToolResult<ToolOutput> {
    check_executable(&invocation.program)?;

    let tool = invocation.tool_name();
    debug!(
        tool = %tool,
        args = ?invocation.args,
        cwd = %invocation.working_dir.display(),
        "spawning tool"
    );

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(&invocation.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::NotFound(invocation.program.clone()),
        std::io::ErrorKind::PermissionDenied => {
            ToolError::NotExecutable(invocation.program.clone())
        }
        _ => ToolError::SpawnFailed {
            tool: tool.clone(),
            source: e,
        },
    })?;

    // `Child::id` goes away once the child is reaped; the group id must outlive that.
    let mut group = GroupGuard(child.id());
    let stdout_task = spawn_capture(child.stdout.take(), invocation.output_limit);
    let stderr_task = spawn_capture(child.stderr.take(), invocation.output_limit);

    let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Sweep anything the tool left running in its group.
            terminate_tree(&mut child, group.disarm()).await;
            status
        }
        Ok(Err(e)) => {
            terminate_tree(&mut child, group.disarm()).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Io { tool, source: e });
        }
        Err(_) => {
            warn!(tool = %tool, timeout = ?invocation.timeout, "tool timed out, killing process group");
            terminate_tree(&mut child, group.disarm()).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ToolError::Timeout {
                tool,
                timeout: invocation.timeout,
            });
        }
    };
    let elapsed = started.elapsed();

    let stdout = join_capture(stdout_task, &tool).await?;
    let stderr = join_capture(stderr_task, &tool).await?;

    debug!(tool = %tool, status = %render_status(&status), elapsed = ?elapsed, "tool finished");

    if !status.success() {
        let diagnostic = if stderr.trim().is_empty() { &stdout } else { &stderr };
        return Err(ToolError::ExecutionFailure {
            tool,
            status: render_status(&status),
            stderr: truncate_tail(diagnostic, invocation.capture_limit),
        });
    }

    for artifact in &invocation.expected_artifacts {
        let path = invocation.working_dir.join(artifact);
        if !path.is_file() {
            return Err(ToolError::ExecutionFailure {
                tool,
                status: render_status(&status),
                stderr: format!(
                    "expected output {} was not produced\n{}",
                    artifact.display(),
                    truncate_tail(&stderr, invocation.capture_limit)
                ),
            });
        }
    }

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
        elapsed,
    })
}

/// Keep the last `limit` bytes of `text`, cut on a character boundary.
pub fn truncate_tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }

    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[... {} bytes truncated]\n{}", start, &text[start..])
}

fn render_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }

    "unknown status".to_string()
}

/// Tail of one output stream plus the number of bytes dropped before it.
struct Capture {
    tail: VecDeque<u8>,
    dropped: usize,
}

/// Drain `pipe` into a buffer holding at most `limit` trailing bytes.
fn spawn_capture<R>(pipe: Option<R>, limit: usize) -> JoinHandle<std::io::Result<Capture>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut capture = Capture {
            tail: VecDeque::new(),
            dropped: 0,
        };
        let Some(mut pipe) = pipe else {
            return Ok(capture);
        };

        let mut chunk = [0u8; 8192];
        loop {
            let n = pipe.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            capture.tail.extend(&chunk[..n]);
            if capture.tail.len() > limit {
                let excess = capture.tail.len() - limit;
                capture.tail.drain(..excess);
                capture.dropped += excess;
            }
        }
        Ok(capture)
    })
}

async fn join_capture(
    task: JoinHandle<std::io::Result<Capture>>,
    tool: &str,
) -> ToolResult<String> {
    let mut capture = task
        .await
        .map_err(|e| ToolError::Io {
            tool: tool.to_string(),
            source: std::io::Error::other(e),
        })?
        .map_err(|e| ToolError::Io {
            tool: tool.to_string(),
            source: e,
        })?;

    let text = String::from_utf8_lossy(capture.tail.make_contiguous()).into_owned();
    if capture.dropped == 0 {
        return Ok(text);
    }
    warn!(tool, dropped = capture.dropped, "tool output exceeded limit, kept tail");
    Ok(format!("[... {} bytes truncated]\n{}", capture.dropped, text))
}

/// Kills the tool's process group if `run` is dropped before it finishes.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(&mut self) -> Option<u32> {
        self.0.take()
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    // ESRCH just means the group is already empty.
    let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Kill the child's process group and reap the child.
async fn terminate_tree(child: &mut Child, pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        kill_group(pgid);
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
