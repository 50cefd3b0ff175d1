//! Tool-adapter error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur while running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The configured executable does not exist.
    #[error("tool not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The path exists but cannot be executed (directory, missing +x bit).
    #[error("tool is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    /// The OS refused to start the process.
    #[error("failed to spawn {tool}: {source}")]
    SpawnFailed {
        /// Tool name (file name of the executable).
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran to completion but reported failure.
    #[error("{tool} exited with {status}: {stderr}")]
    ExecutionFailure {
        /// Tool name (file name of the executable).
        tool: String,
        /// Rendered exit status ("exit code 1", "signal 9").
        status: String,
        /// Captured stderr (already truncated), or stdout if stderr was empty.
        stderr: String,
    },

    /// The tool did not finish within its allotted time and was killed.
    #[error("{tool} timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        /// Tool name (file name of the executable).
        tool: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// Reading the tool's output pipes failed.
    #[error("i/o error while running {tool}: {source}")]
    Io {
        /// Tool name (file name of the executable).
        tool: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Check if this error means the executable itself is unusable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotExecutable(_))
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
