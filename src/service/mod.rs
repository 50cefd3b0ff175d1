//! Compile service: the remote-callable front end.
//!
//! Validates each request, waits for an admission slot, runs the backend and
//! turns every outcome into a [`CompileResponse`]. A failing request never
//! surfaces as an `Err`; it becomes `success: false` with a diagnostic.

mod admission;

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

pub use admission::{AdmissionGate, AdmissionPermit};

use crate::error::SynthesisError;
use crate::pipeline::{SynthesisBackend, ToolchainPipeline};
use crate::protocol::{CompileRequest, CompileResponse, StatusResponse};

/// Front end shared by all connection handlers.
#[derive(Clone)]
pub struct CompileService {
    backend: Arc<dyn SynthesisBackend>,
    gate: AdmissionGate,
}

impl CompileService {
    /// Create a service over the production toolchain pipeline.
    pub fn new(pipeline: ToolchainPipeline, gate: AdmissionGate) -> Self {
        Self::with_backend(Arc::new(pipeline), gate)
    }

    /// Create a service over any backend.
    pub fn with_backend(backend: Arc<dyn SynthesisBackend>, gate: AdmissionGate) -> Self {
        Self { backend, gate }
    }

    /// The admission gate.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Serve one compile request.
    pub async fn compile(&self, request: CompileRequest) -> CompileResponse {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("compile", %request_id, bytes = request.module_text.len());
        self.compile_inner(request).instrument(span).await
    }

    async fn compile_inner(&self, request: CompileRequest) -> CompileResponse {
        if request.module_text.trim().is_empty() {
            let err = SynthesisError::invalid_argument("module_text must not be empty");
            warn!(code = err.code(), "rejected request");
            return CompileResponse::failure(err.to_response_message());
        }

        let _permit = match self.gate.admit().await {
            Ok(permit) => permit,
            Err(err) => return CompileResponse::failure(err.to_response_message()),
        };
        info!(
            target_frequency_hz = ?request.target(),
            "admitted"
        );

        match self.backend.synthesize(&request).await {
            Ok(output) => CompileResponse {
                success: true,
                max_frequency_hz: output.report.max_frequency_hz,
                error_message: String::new(),
                elapsed_ms: output.elapsed.as_millis() as u64,
                clocks: output.report.clocks,
                netlist: output.netlist,
            },
            Err(err) => {
                warn!(code = err.code(), error = %err, "compile failed");
                CompileResponse::failure(err.to_response_message())
            }
        }
    }

    /// Snapshot for `server.status`.
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            capacity: self.gate.capacity(),
            available: self.gate.available(),
        }
    }
}
