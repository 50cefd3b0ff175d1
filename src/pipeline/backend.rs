//! Backend trait the compile service delegates to.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SynthesisResult;
use crate::protocol::CompileRequest;
use crate::report::TimingReport;

/// Timing of one completed pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Stage name ("synthesis", "place-and-route").
    pub stage: &'static str,
    /// Tool that ran the stage.
    pub tool: String,
    /// Tool wall time.
    pub elapsed: Duration,
}

/// Successful outcome of a synthesis run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Parsed timing summary.
    pub report: TimingReport,
    /// Netlist text, when requested by configuration.
    pub netlist: Option<String>,
    /// Completed stages, in execution order.
    pub stages: Vec<StageRecord>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

/// Something that can turn HDL source into a timing result.
///
/// [`ToolchainPipeline`](super::ToolchainPipeline) is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Run synthesis and place-and-route for one request.
    async fn synthesize(&self, request: &CompileRequest) -> SynthesisResult<PipelineOutput>;
}
