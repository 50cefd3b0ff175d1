//! Synthesis then place-and-route, driven through the tool adapter.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use super::backend::{PipelineOutput, StageRecord, SynthesisBackend};
use super::workspace::Workspace;
use crate::error::{SynthesisError, SynthesisResult};
use crate::protocol::CompileRequest;
use crate::report::{self, units};
use crate::tool::{
    self, ToolInvocation, ToolOutput, DEFAULT_CAPTURE_LIMIT, DEFAULT_OUTPUT_LIMIT,
};

/// HDL source file name inside the workspace.
pub const SOURCE_FILE: &str = "design.v";
/// Synthesis script file name inside the workspace.
pub const SCRIPT_FILE: &str = "synth.ys";
/// Netlist artifact handed from synthesis to place-and-route.
pub const NETLIST_FILE: &str = "netlist.json";

const SYNTHESIS_STAGE: &str = "synthesis";
const PNR_STAGE: &str = "place-and-route";

/// Everything the pipeline needs to know about the external tools.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Logic synthesis executable (yosys-compatible).
    pub synthesis_path: PathBuf,
    /// Placement/routing executable (nextpnr-compatible).
    pub pnr_path: PathBuf,
    /// Limit for the synthesis stage.
    pub synthesis_timeout: Duration,
    /// Limit for the placement/routing stage.
    pub pnr_timeout: Duration,
    /// Name of the top-level module.
    pub top_module: String,
    /// Synthesis pass emitted in the script (e.g. `synth_ecp5`).
    pub synthesis_command: String,
    /// Extra placement/routing arguments (device, package).
    pub pnr_args: Vec<String>,
    /// Parent directory for workspaces; system temp dir if `None`.
    pub workspace_root: Option<PathBuf>,
    /// Cap on tool output quoted in error messages.
    pub max_capture_bytes: usize,
    /// Cap on each tool stream held in memory while it runs.
    pub max_output_bytes: usize,
    /// Include the netlist text in successful responses.
    pub return_netlist: bool,
}

impl ToolchainConfig {
    /// Create a config for the given tools with default limits.
    pub fn new(synthesis_path: impl Into<PathBuf>, pnr_path: impl Into<PathBuf>) -> Self {
        Self {
            synthesis_path: synthesis_path.into(),
            pnr_path: pnr_path.into(),
            synthesis_timeout: Duration::from_secs(600),
            pnr_timeout: Duration::from_secs(1200),
            top_module: "main".to_string(),
            synthesis_command: "synth_ecp5".to_string(),
            pnr_args: vec![
                "--45k".to_string(),
                "--package".to_string(),
                "CABGA381".to_string(),
            ],
            workspace_root: None,
            max_capture_bytes: DEFAULT_CAPTURE_LIMIT,
            max_output_bytes: DEFAULT_OUTPUT_LIMIT,
            return_netlist: false,
        }
    }

    /// Set both stage timeouts.
    pub fn with_timeouts(mut self, synthesis: Duration, pnr: Duration) -> Self {
        self.synthesis_timeout = synthesis;
        self.pnr_timeout = pnr;
        self
    }

    /// Set the workspace parent directory.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Set the top-level module name.
    pub fn with_top_module(mut self, top: impl Into<String>) -> Self {
        self.top_module = top.into();
        self
    }

    /// Set the synthesis pass used in the generated script.
    pub fn with_synthesis_command(mut self, command: impl Into<String>) -> Self {
        self.synthesis_command = command.into();
        self
    }

    /// Replace the placement/routing device arguments.
    pub fn with_pnr_args(mut self, args: Vec<String>) -> Self {
        self.pnr_args = args;
        self
    }

    /// Return the netlist in responses.
    pub fn with_return_netlist(mut self, enabled: bool) -> Self {
        self.return_netlist = enabled;
        self
    }

    /// Set the error-message capture limit.
    pub fn with_max_capture_bytes(mut self, limit: usize) -> Self {
        self.max_capture_bytes = limit;
        self
    }

    /// Set the in-memory cap on each tool stream.
    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Check that both tools exist and are executable.
    pub fn validate(&self) -> SynthesisResult<()> {
        tool::check_executable(&self.synthesis_path)
            .map_err(|e| SynthesisError::from_tool(SYNTHESIS_STAGE, e))?;
        tool::check_executable(&self.pnr_path)
            .map_err(|e| SynthesisError::from_tool(PNR_STAGE, e))?;
        Ok(())
    }
}

/// Runs one request through synthesis and placement/routing.
///
/// Holds no per-request state; each [`run`](Self::run) owns its own
/// [`Workspace`], so concurrent runs never observe each other's files.
#[derive(Debug, Clone)]
pub struct ToolchainPipeline {
    config: ToolchainConfig,
}

impl ToolchainPipeline {
    /// Create a pipeline over `config`.
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Produce a frequency metric from HDL source.
    pub async fn run(&self, request: &CompileRequest) -> SynthesisResult<PipelineOutput> {
        if request.module_text.trim().is_empty() {
            return Err(SynthesisError::invalid_argument(
                "module_text must not be empty",
            ));
        }

        let started = Instant::now();
        let workspace = Workspace::create(self.config.workspace_root.as_deref())
            .map_err(|e| SynthesisError::internal(format!("failed to create workspace: {}", e)))?;

        let mut stages = Vec::with_capacity(2);
        let target = request.target();

        workspace
            .write_file(SOURCE_FILE, &request.module_text)
            .await
            .map_err(|e| SynthesisError::internal(format!("failed to write source: {}", e)))?;
        workspace
            .write_file(SCRIPT_FILE, &self.synthesis_script(target))
            .await
            .map_err(|e| SynthesisError::internal(format!("failed to write script: {}", e)))?;

        let synth = self.synthesis_invocation(workspace.path());
        let output = run_stage(SYNTHESIS_STAGE, &synth).await?;
        stages.push(StageRecord {
            stage: SYNTHESIS_STAGE,
            tool: synth.tool_name(),
            elapsed: output.elapsed,
        });

        let pnr = self.pnr_invocation(workspace.path(), target);
        let output = run_stage(PNR_STAGE, &pnr).await?;
        stages.push(StageRecord {
            stage: PNR_STAGE,
            tool: pnr.tool_name(),
            elapsed: output.elapsed,
        });

        let report_text = combined_output(&output);
        let report = report::parse(&report_text).map_err(|e| {
            SynthesisError::from_parse(e, &report_text, self.config.max_capture_bytes)
        })?;

        let netlist = if self.config.return_netlist {
            Some(workspace.read_file(NETLIST_FILE).await.map_err(|e| {
                SynthesisError::internal(format!("failed to read netlist: {}", e))
            })?)
        } else {
            None
        };

        workspace.close();

        let elapsed = started.elapsed();
        info!(
            max_frequency_hz = report.max_frequency_hz,
            clocks = report.clocks.len(),
            elapsed = ?elapsed,
            "pipeline finished"
        );

        Ok(PipelineOutput {
            report,
            netlist,
            stages,
            elapsed,
        })
    }

    /// Synthesis script for the configured flow.
    pub fn synthesis_script(&self, target_hz: Option<u64>) -> String {
        let mut script = String::new();
        script.push_str(&format!("read_verilog {}\n", SOURCE_FILE));
        if let Some(ps) = target_hz.and_then(units::period_ps) {
            script.push_str(&format!("scratchpad -set abc9.D {}\n", ps));
        }
        script.push_str(&format!(
            "{} -top {} -json {}\n",
            self.config.synthesis_command, self.config.top_module, NETLIST_FILE
        ));
        script
    }

    fn synthesis_invocation(&self, workdir: &Path) -> ToolInvocation {
        ToolInvocation::new(
            &self.config.synthesis_path,
            workdir,
            self.config.synthesis_timeout,
        )
        .args(["-q", "-s", SCRIPT_FILE])
        .expect_artifact(NETLIST_FILE)
        .with_capture_limit(self.config.max_capture_bytes)
        .with_output_limit(self.config.max_output_bytes)
    }

    fn pnr_invocation(&self, workdir: &Path, target_hz: Option<u64>) -> ToolInvocation {
        let mut invocation =
            ToolInvocation::new(&self.config.pnr_path, workdir, self.config.pnr_timeout)
                .args(self.config.pnr_args.iter().cloned())
                .args(["--json", NETLIST_FILE]);
        if let Some(hz) = target_hz {
            invocation = invocation.args(["--freq".to_string(), units::format_mhz(hz)]);
        }
        invocation
            .with_capture_limit(self.config.max_capture_bytes)
            .with_output_limit(self.config.max_output_bytes)
    }
}

#[async_trait]
impl SynthesisBackend for ToolchainPipeline {
    async fn synthesize(&self, request: &CompileRequest) -> SynthesisResult<PipelineOutput> {
        self.run(request).await
    }
}

async fn run_stage(stage: &'static str, invocation: &ToolInvocation) -> SynthesisResult<ToolOutput> {
    debug!(stage, tool = %invocation.tool_name(), "starting stage");
    tool::run(invocation)
        .await
        .map_err(|e| SynthesisError::from_tool(stage, e))
}

/// The timing summary may land on either stream; scan both.
fn combined_output(output: &ToolOutput) -> String {
    let mut text = output.stdout.clone();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&output.stderr);
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const VERILOG: &str = "module main(input wire [31:0] x, input wire [31:0] y, output wire [31:0] out);\n  assign out = x + y;\nendmodule\n";

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        tools: tempfile::TempDir,
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tools: tempfile::tempdir().unwrap(),
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn pipeline(&self, synth_body: &str, pnr_body: &str) -> ToolchainPipeline {
            let synth = write_script(self.tools.path(), "yosys", synth_body);
            let pnr = write_script(self.tools.path(), "nextpnr-ecp5", pnr_body);
            ToolchainPipeline::new(
                ToolchainConfig::new(synth, pnr)
                    .with_timeouts(Duration::from_secs(10), Duration::from_secs(10))
                    .with_workspace_root(self.root.path()),
            )
        }

        fn leftover_workspaces(&self) -> usize {
            std::fs::read_dir(self.root.path()).unwrap().count()
        }
    }

    const GOOD_SYNTH: &str = "echo '{\"modules\":{}}' > netlist.json";
    const GOOD_PNR: &str = "echo \"Info: Max frequency for clock 'clk': 180.28 MHz (PASS at 100.00 MHz)\" >&2";

    #[tokio::test]
    async fn test_successful_run() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(GOOD_SYNTH, GOOD_PNR);

        let out = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap();

        assert_eq!(out.report.max_frequency_hz, 180_280_000);
        assert_eq!(out.stages.len(), 2);
        assert_eq!(out.stages[0].stage, "synthesis");
        assert_eq!(out.stages[1].stage, "place-and-route");
        assert!(out.netlist.is_none());
        assert_eq!(fx.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_returns_netlist_when_configured() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(GOOD_SYNTH, GOOD_PNR);
        pipeline.config.return_netlist = true;

        let out = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap();
        assert_eq!(out.netlist.as_deref().map(str::trim), Some("{\"modules\":{}}"));
    }

    #[tokio::test]
    async fn test_target_frequency_reaches_both_tools() {
        let fx = Fixture::new();
        let args_file = fx.tools.path().join("pnr-args");
        let script_file = fx.tools.path().join("synth-script");
        let pipeline = fx.pipeline(
            &format!(
                "cp synth.ys {}; echo '{{}}' > netlist.json",
                script_file.display()
            ),
            &format!(
                "echo \"$@\" > {}; echo \"Max frequency for clock 'clk': 50 MHz\"",
                args_file.display()
            ),
        );

        let request = CompileRequest::new(VERILOG).with_target_frequency_hz(1_000_000_000);
        pipeline.run(&request).await.unwrap();

        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(args.trim(), "--45k --package CABGA381 --json netlist.json --freq 1000");

        let script = std::fs::read_to_string(&script_file).unwrap();
        assert!(script.contains("read_verilog design.v"));
        assert!(script.contains("scratchpad -set abc9.D 1000"));
        assert!(script.contains("synth_ecp5 -top main -json netlist.json"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_aborts_pipeline() {
        let fx = Fixture::new();
        let marker = fx.tools.path().join("pnr-ran");
        let pipeline = fx.pipeline(
            "echo 'ERROR: Module `main` not found' >&2; exit 1",
            &format!("touch {}", marker.display()),
        );

        let err = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap_err();

        assert_eq!(err.code(), "TOOL_EXECUTION_FAILURE");
        assert!(err.to_string().contains("synthesis stage failed"));
        assert!(err.to_string().contains("Module `main` not found"));
        assert!(!marker.exists());
        assert_eq!(fx.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_missing_netlist_is_failure() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline("exit 0", GOOD_PNR);

        let err = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap_err();
        assert_eq!(err.code(), "TOOL_EXECUTION_FAILURE");
        assert!(err.to_string().contains("netlist.json"));
    }

    #[tokio::test]
    async fn test_parse_failure_includes_report() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(GOOD_SYNTH, "echo 'Info: Program finished normally.'");

        let err = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap_err();
        assert_eq!(err.code(), "PARSE_FAILURE");
        assert!(err.to_string().contains("Program finished normally"));
        assert_eq!(fx.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(GOOD_SYNTH, "sleep 30");
        pipeline.config.pnr_timeout = Duration::from_millis(200);

        let err = pipeline.run(&CompileRequest::new(VERILOG)).await.unwrap_err();
        assert_eq!(err.code(), "TOOL_TIMEOUT");
        assert!(err.to_string().contains("place-and-route"));
        assert_eq!(fx.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_empty_module_rejected_before_workspace() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(GOOD_SYNTH, GOOD_PNR);

        let err = pipeline.run(&CompileRequest::new("   ")).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(fx.leftover_workspaces(), 0);
    }

    #[test]
    fn test_validate_reports_missing_tool() {
        let config = ToolchainConfig::new("/nonexistent/yosys", "/nonexistent/nextpnr");
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
        assert!(err.to_string().contains("synthesis"));
    }

    #[test]
    fn test_script_without_target() {
        let pipeline = ToolchainPipeline::new(
            ToolchainConfig::new("yosys", "nextpnr").with_top_module("adder"),
        );
        let script = pipeline.synthesis_script(None);
        assert_eq!(
            script,
            "read_verilog design.v\nsynth_ecp5 -top adder -json netlist.json\n"
        );
    }
}
