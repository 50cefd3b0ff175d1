//! External tool adapter.
//!
//! Runs one synthesis or place-and-route executable as a managed subprocess:
//!
//! ```text
//! ToolInvocation ──► spawn (own process group, piped stdout/stderr)
//!                        │
//!                        ├── exits 0 ──► ToolOutput { status, stdout, stderr, elapsed }
//!                        ├── exits ≠0 ─► ToolError::ExecutionFailure (stderr tail)
//!                        └── timeout ──► killpg(SIGKILL) ─► ToolError::Timeout
//! ```

mod error;
mod runner;

pub use error::{ToolError, ToolResult};
pub use runner::{
    check_executable, run, truncate_tail, ToolInvocation, ToolOutput, DEFAULT_CAPTURE_LIMIT,
    DEFAULT_OUTPUT_LIMIT,
};
