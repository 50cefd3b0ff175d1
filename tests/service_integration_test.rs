//! End-to-end tests: client ──TCP──► server ──► stand-in toolchain scripts.
//!
//! The stand-in tools are small `/bin/sh` scripts, so these tests only run
//! on unix.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{RunningServer, Toolchain, ADDER, SYNTH_OK};
use synthd::client::SynthesisClient;
use synthd::protocol::CompileRequest;

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_reports_exact_frequency_from_nextpnr_log() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(resp.success, "unexpected failure: {}", resp.error_message);
    assert_eq!(resp.max_frequency_hz, 180_280_000);
    assert!(resp.error_message.is_empty());
    assert_eq!(resp.clocks.len(), 1);
    assert_eq!(resp.clocks[0].clock, "$glbnet$clk");
    assert_eq!(resp.clocks[0].passed, Some(false));
    assert!(resp.netlist.is_none());

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_target_frequency_reaches_toolchain() {
    let tc = Toolchain::new(SYNTH_OK, "");
    let args_file = tc.marker("pnr-args");
    let tc = Toolchain {
        pnr: common::write_script(
            tc.tools.path(),
            "nextpnr-ecp5",
            &format!(
                "echo \"$@\" > '{}'\n{}",
                args_file.display(),
                common::pnr_ok()
            ),
        ),
        ..tc
    };
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let request = CompileRequest::new(ADDER).with_target_frequency_hz(1_000_000_000);
    let resp = client.compile(&request).await.unwrap();
    assert!(resp.success, "unexpected failure: {}", resp.error_message);

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.trim().ends_with("--json netlist.json --freq 1000"));

    server.stop().await;
}

#[tokio::test]
async fn test_repeated_requests_are_idempotent() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let first = client.compile(&CompileRequest::new(ADDER)).await.unwrap();
    let second = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(first.success && second.success);
    assert_eq!(first.max_frequency_hz, second.max_frequency_hz);
    assert_eq!(first.clocks, second.clocks);

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_netlist_returned_when_enabled() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    let server = RunningServer::start(tc.config().with_return_netlist(true), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(resp.success);
    assert!(resp.netlist.unwrap().contains("stand-in"));

    server.stop().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_empty_module_spawns_no_tool() {
    let tc = Toolchain::new("", "");
    let marker = tc.marker("synth-ran");
    let tc = Toolchain {
        synthesis: common::write_script(
            tc.tools.path(),
            "yosys",
            &format!("touch '{}'\n{}", marker.display(), SYNTH_OK),
        ),
        ..tc
    };
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new("")).await.unwrap();

    assert!(!resp.success);
    assert_eq!(resp.max_frequency_hz, 0);
    assert!(resp.error_message.starts_with("INVALID_ARGUMENT"));
    assert!(!marker.exists());

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_tool_failure_carries_diagnostic() {
    let tc = Toolchain::new(
        "echo 'ERROR: syntax error, unexpected TOK_ENDMODULE' >&2; exit 1",
        &common::pnr_ok(),
    );
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(!resp.success);
    assert_eq!(resp.max_frequency_hz, 0);
    assert!(resp.error_message.starts_with("TOOL_EXECUTION_FAILURE"));
    assert!(resp.error_message.contains("unexpected TOK_ENDMODULE"));
    assert!(resp.error_message.contains("exit code 1"));

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_missing_tool_reported_per_request() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    std::fs::remove_file(&tc.pnr).unwrap();
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(!resp.success);
    assert!(resp.error_message.starts_with("TOOL_NOT_FOUND"));

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_report_without_frequency_is_parse_failure() {
    let tc = Toolchain::new(SYNTH_OK, "echo 'Info: Program finished normally.' >&2");
    let server = RunningServer::start(tc.config(), 1).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(!resp.success);
    assert!(resp.error_message.starts_with("PARSE_FAILURE"));
    assert!(resp.error_message.contains("Program finished normally"));

    server.stop().await;
}

#[tokio::test]
async fn test_timeout_kills_tool_and_descendants() {
    let tc = Toolchain::new(SYNTH_OK, "");
    let pid_file = tc.marker("sleeper.pid");
    let tc = Toolchain {
        pnr: common::write_script(
            tc.tools.path(),
            "nextpnr-ecp5",
            &format!("sleep 30 &\necho $! > '{}'\nwait", pid_file.display()),
        ),
        ..tc
    };
    let config = tc
        .config()
        .with_timeouts(Duration::from_secs(20), Duration::from_millis(500));
    let server = RunningServer::start(config, 1).await;

    let started = Instant::now();
    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let resp = client.compile(&CompileRequest::new(ADDER)).await.unwrap();

    assert!(!resp.success);
    assert!(resp.error_message.starts_with("TOOL_TIMEOUT"));
    assert!(started.elapsed() < Duration::from_secs(20));

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while common::process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!common::process_alive(pid), "background sleep survived");

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

// ============================================================================
// Resource hygiene and admission
// ============================================================================

#[tokio::test]
async fn test_no_workspace_survives_mixed_requests() {
    let tc = Toolchain::new(
        &format!(
            "if grep -q broken design.v; then echo 'ERROR: broken design' >&2; exit 1; fi\n{}",
            SYNTH_OK
        ),
        &common::pnr_ok(),
    );
    let server = RunningServer::start(tc.config(), 2).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let requests = [
        CompileRequest::new(ADDER),
        CompileRequest::new("module broken; endmodule"),
        CompileRequest::new("  "),
        CompileRequest::new(ADDER).with_target_frequency_hz(250_000_000),
        CompileRequest::new("// broken"),
    ];
    let mut outcomes = Vec::new();
    for request in &requests {
        outcomes.push(client.compile(request).await.unwrap().success);
    }

    assert_eq!(outcomes, vec![true, false, false, true, false]);
    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_beyond_capacity_wait_and_succeed() {
    let tc = Toolchain::new(SYNTH_OK, "");
    let lock = tc.marker("busy.lock");
    let overlap = tc.marker("overlap");
    let tc = Toolchain {
        pnr: common::write_script(
            tc.tools.path(),
            "nextpnr-ecp5",
            &format!(
                "if ! mkdir '{lock}' 2>/dev/null; then echo overlap >> '{overlap}'; fi\nsleep 0.2\nrmdir '{lock}' 2>/dev/null\n{pnr}",
                lock = lock.display(),
                overlap = overlap.display(),
                pnr = common::pnr_ok()
            ),
        ),
        ..tc
    };
    let server = RunningServer::start(tc.config(), 1).await;
    let addr = server.addr;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(async move {
                let mut client = SynthesisClient::connect(addr).await.unwrap();
                client.compile(&CompileRequest::new(ADDER)).await.unwrap()
            })
        })
        .collect();

    for resp in futures::future::join_all(handles).await {
        let resp = resp.unwrap();
        assert!(resp.success, "unexpected failure: {}", resp.error_message);
        assert_eq!(resp.max_frequency_hz, 180_280_000);
    }
    assert!(!overlap.exists(), "two pipelines ran at once");

    server.stop().await;
    assert_eq!(tc.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_status_reports_capacity() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    let server = RunningServer::start(tc.config(), 3).await;

    let mut client = SynthesisClient::connect(server.addr).await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.capacity, 3);
    assert_eq!(status.available, 3);
    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));

    server.stop().await;
}

// ============================================================================
// Client binary
// ============================================================================

async fn run_client(args: &[&str]) -> std::process::Output {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_synthd-client"))
        .args(args)
        .output()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_binary_exit_codes() {
    let tc = Toolchain::new(SYNTH_OK, &common::pnr_ok());
    let server = RunningServer::start(tc.config(), 1).await;
    let port = server.addr.port().to_string();

    let good = tc.marker("adder.v");
    std::fs::write(&good, ADDER).unwrap();
    let empty = tc.marker("empty.v");
    std::fs::write(&empty, "").unwrap();

    let out = run_client(&[good.to_str().unwrap(), "--port", &port, "--ghz", "1.0"]).await;
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("180280000 Hz"));

    let out = run_client(&[empty.to_str().unwrap(), "--port", &port]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("INVALID_ARGUMENT"));

    let missing = tc.marker("missing.v");
    let out = run_client(&[missing.to_str().unwrap(), "--port", &port]).await;
    assert!(!out.status.success());

    server.stop().await;

    // Nothing listens on the port any more.
    let out = run_client(&[good.to_str().unwrap(), "--port", &port]).await;
    assert!(!out.status.success());
}
