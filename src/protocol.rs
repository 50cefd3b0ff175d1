//! Wire protocol between `synthd-client` and the `synthd` server.
//!
//! Newline-delimited JSON over TCP. Each line is one envelope:
//!
//! ```text
//! client ──► {"id":"…","method":"synthesis.compile","params":{"module_text":"…","target_frequency_hz":1000000000}}
//! server ◄── {"id":"…","success":true,"result":{"success":true,"max_frequency_hz":180280000,…}}
//! ```
//!
//! Envelope-level `success: false` is reserved for protocol problems
//! (malformed JSON, unknown method, oversized line). A synthesis failure,
//! including compile params that do not decode, is a successful envelope
//! carrying a [`CompileResponse`] with `success: false`.

use serde::{Deserialize, Serialize};

use crate::report::ClockFrequency;

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request envelope sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation.
    pub id: String,
    /// Method name (e.g., "synthesis.compile").
    pub method: String,
    /// Method-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response envelope returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to.
    pub id: String,
    /// Whether the envelope was understood and dispatched.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (present if success = false).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ResponseEnvelope {
    /// Build a successful envelope around a serializable result.
    pub fn ok<T: Serialize>(id: impl Into<String>, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                id: id.into(),
                success: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self::error(id, codes::INTERNAL, e.to_string()),
        }
    }

    /// Build a protocol-error envelope.
    pub fn error(id: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Error information in a failed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Method names.
pub mod methods {
    pub const COMPILE: &str = "synthesis.compile";
    pub const STATUS: &str = "server.status";
}

/// Protocol error codes.
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
    pub const REQUEST_TOO_LARGE: &str = "REQUEST_TOO_LARGE";
    pub const INTERNAL: &str = "INTERNAL";
}

// ============================================================================
// synthesis.compile
// ============================================================================

/// Parameters for `synthesis.compile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// HDL source text. Empty or whitespace-only text is rejected as
    /// `INVALID_ARGUMENT` before any tool runs.
    pub module_text: String,
    /// Desired clock frequency in Hz; absent or 0 means no goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_frequency_hz: Option<u64>,
}

impl CompileRequest {
    /// Create a request without a timing goal.
    pub fn new(module_text: impl Into<String>) -> Self {
        Self {
            module_text: module_text.into(),
            target_frequency_hz: None,
        }
    }

    /// Set the timing goal.
    pub fn with_target_frequency_hz(mut self, hz: u64) -> Self {
        self.target_frequency_hz = Some(hz);
        self
    }

    /// The timing goal, with 0 treated as absent.
    pub fn target(&self) -> Option<u64> {
        self.target_frequency_hz.filter(|hz| *hz > 0)
    }
}

/// Result of `synthesis.compile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    /// Whether the design went through both stages and was parsed.
    pub success: bool,
    /// Achieved maximum frequency; 0 unless `success`.
    #[serde(default)]
    pub max_frequency_hz: u64,
    /// Diagnostic text; empty unless `!success`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    /// Pipeline wall time in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Per-clock breakdown behind `max_frequency_hz`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clocks: Vec<ClockFrequency>,
    /// Synthesized netlist, when the server is configured to return it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlist: Option<String>,
}

impl CompileResponse {
    /// A failed response carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// server.status
// ============================================================================

/// Result of `server.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Crate version of the server.
    pub version: String,
    /// Configured admission capacity.
    pub capacity: usize,
    /// Permits currently free.
    pub available: usize,
}
