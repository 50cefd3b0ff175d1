//! Request-level error taxonomy.
//!
//! Every failure a compile request can hit is folded into [`SynthesisError`]
//! at the pipeline or service boundary, then rendered into the response's
//! `error_message` as `"<CODE>: <detail>"`.

use std::time::Duration;

use crate::report::ParseFailure;
use crate::tool::{truncate_tail, ToolError, DEFAULT_CAPTURE_LIMIT};

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Errors that can occur while serving a compile request.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The request itself is malformed (e.g. empty module text).
    #[error("{0}")]
    InvalidArgument(String),

    /// A configured tool is missing or cannot be executed.
    #[error("{0}")]
    ToolNotFound(String),

    /// A tool exited nonzero or did not produce its artifact.
    #[error("{stage} stage failed: {tool} {status}\n{diagnostic}")]
    ToolExecutionFailure {
        /// Pipeline stage ("synthesis" or "place-and-route").
        stage: &'static str,
        /// Tool name.
        tool: String,
        /// Rendered exit status.
        status: String,
        /// Captured tool output, truncated.
        diagnostic: String,
    },

    /// A stage exceeded its time limit and was killed.
    #[error("{stage} stage timed out after {}s ({tool} was terminated)", .timeout.as_secs_f64())]
    ToolTimeout {
        /// Pipeline stage.
        stage: &'static str,
        /// Tool name.
        tool: String,
        /// Limit that was exceeded.
        timeout: Duration,
    },

    /// The timing report did not contain the expected metric.
    #[error("{reason}\n--- report ---\n{report}")]
    ParseFailure {
        /// What the parser rejected.
        reason: String,
        /// Captured report text, truncated.
        report: String,
    },

    /// Anything else (workspace creation, unexpected I/O).
    #[error("{0}")]
    InternalError(String),
}

impl SynthesisError {
    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Attribute a tool-adapter error to a pipeline stage.
    pub fn from_tool(stage: &'static str, err: ToolError) -> Self {
        match err {
            ToolError::NotFound(_) | ToolError::NotExecutable(_) => {
                Self::ToolNotFound(format!("{} stage: {}", stage, err))
            }
            ToolError::ExecutionFailure {
                tool,
                status,
                stderr,
            } => Self::ToolExecutionFailure {
                stage,
                tool,
                status,
                diagnostic: stderr,
            },
            ToolError::Timeout { tool, timeout } => Self::ToolTimeout {
                stage,
                tool,
                timeout,
            },
            ToolError::SpawnFailed { .. } | ToolError::Io { .. } => {
                Self::InternalError(format!("{} stage: {}", stage, err))
            }
        }
    }

    /// Convert a parser rejection, keeping at most `capture_limit` bytes of report.
    pub fn from_parse(err: ParseFailure, report: &str, capture_limit: usize) -> Self {
        let text = err.report_text().unwrap_or(report);
        Self::ParseFailure {
            reason: err.to_string(),
            report: truncate_tail(text, capture_limit),
        }
    }

    /// Stable machine-readable class name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::ToolExecutionFailure { .. } => "TOOL_EXECUTION_FAILURE",
            Self::ToolTimeout { .. } => "TOOL_TIMEOUT",
            Self::ParseFailure { .. } => "PARSE_FAILURE",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Text placed in `CompileResponse::error_message`.
    pub fn to_response_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<ParseFailure> for SynthesisError {
    fn from(err: ParseFailure) -> Self {
        let report = err.report_text().unwrap_or_default().to_string();
        Self::from_parse(err, &report, DEFAULT_CAPTURE_LIMIT)
    }
}

impl From<std::io::Error> for SynthesisError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_codes() {
        assert_eq!(
            SynthesisError::invalid_argument("x").code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(SynthesisError::internal("x").code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_from_tool_not_found() {
        let err = SynthesisError::from_tool(
            "synthesis",
            ToolError::NotFound(PathBuf::from("/opt/yosys")),
        );
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
        assert!(err.to_string().contains("/opt/yosys"));
    }

    #[test]
    fn test_from_tool_execution_failure_message() {
        let err = SynthesisError::from_tool(
            "place-and-route",
            ToolError::ExecutionFailure {
                tool: "nextpnr-ecp5".into(),
                status: "exit code 1".into(),
                stderr: "ERROR: failed to route".into(),
            },
        );
        let message = err.to_response_message();
        assert!(message.starts_with("TOOL_EXECUTION_FAILURE: place-and-route stage failed"));
        assert!(message.contains("failed to route"));
    }

    #[test]
    fn test_from_tool_timeout() {
        let err = SynthesisError::from_tool(
            "synthesis",
            ToolError::Timeout {
                tool: "yosys".into(),
                timeout: Duration::from_secs(2),
            },
        );
        assert_eq!(err.code(), "TOOL_TIMEOUT");
        assert!(err.to_string().contains("timed out after 2s"));
    }

    #[test]
    fn test_from_parse_truncates_report() {
        let report = "x".repeat(1000);
        let failure = ParseFailure::NoFrequencyFound {
            report: report.clone(),
        };
        let err = SynthesisError::from_parse(failure, &report, 100);
        match &err {
            SynthesisError::ParseFailure { report, .. } => {
                assert!(report.len() < 200);
                assert!(report.contains("truncated"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.code(), "PARSE_FAILURE");
    }
}
