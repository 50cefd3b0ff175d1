//! Shared fixtures: stand-in toolchain scripts and an in-process server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use synthd::pipeline::{ToolchainConfig, ToolchainPipeline};
use synthd::server::Server;
use synthd::service::{AdmissionGate, CompileService};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const ADDER: &str = "module main(input wire [31:0] x, input wire [31:0] y, output wire [31:0] out);\n  assign out = x + y;\nendmodule\n";

/// Synthesis stand-in that writes a netlist.
pub const SYNTH_OK: &str = "echo '{\"creator\":\"stand-in\",\"modules\":{}}' > netlist.json";

/// Path of the canned place-and-route log.
pub fn nextpnr_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/nextpnr.out")
}

/// Place-and-route stand-in that replays the canned log on stderr.
pub fn pnr_ok() -> String {
    format!("cat '{}' >&2", nextpnr_fixture().display())
}

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in toolchain living in temp dirs.
pub struct Toolchain {
    pub tools: TempDir,
    pub workspaces: TempDir,
    pub synthesis: PathBuf,
    pub pnr: PathBuf,
}

impl Toolchain {
    pub fn new(synth_body: &str, pnr_body: &str) -> Self {
        let tools = tempfile::tempdir().unwrap();
        let workspaces = tempfile::tempdir().unwrap();
        let synthesis = write_script(tools.path(), "yosys", synth_body);
        let pnr = write_script(tools.path(), "nextpnr-ecp5", pnr_body);
        Self {
            tools,
            workspaces,
            synthesis,
            pnr,
        }
    }

    /// A file path inside the tools dir, for scripts to leave evidence in.
    pub fn marker(&self, name: &str) -> PathBuf {
        self.tools.path().join(name)
    }

    pub fn config(&self) -> ToolchainConfig {
        ToolchainConfig::new(&self.synthesis, &self.pnr)
            .with_timeouts(Duration::from_secs(20), Duration::from_secs(20))
            .with_workspace_root(self.workspaces.path())
    }

    /// Workspace directories still on disk.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.workspaces.path()).unwrap().count()
    }
}

/// Server running on an ephemeral port until the handle is stopped.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    pub async fn start(config: ToolchainConfig, capacity: usize) -> Self {
        let gate = AdmissionGate::new(NonZeroUsize::new(capacity).unwrap());
        let service = CompileService::new(ToolchainPipeline::new(config), gate);
        let server = Server::bind("127.0.0.1:0", service).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            task,
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

/// Whether `pid` names a live, non-zombie process.
pub fn process_alive(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| !rest.trim_start().starts_with('Z'))
            .unwrap_or(true),
        Err(_) => true,
    }
}
