//! synthd - remote HDL synthesis server
//!
//! Usage:
//!   synthd --port <port> [--yosys-path <path>] [--nextpnr-path <path>]
//!
//! Examples:
//!   synthd --port 10000 --yosys-path /usr/bin/yosys --nextpnr-path /usr/bin/nextpnr-ecp5
//!   synthd --config synthd.toml -v

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use synthd::config::Settings;
use synthd::pipeline::ToolchainPipeline;
use synthd::server::Server;
use synthd::service::CompileService;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "synthd")]
#[command(about = "synthd - remote HDL synthesis and timing server")]
#[command(version)]
struct Cli {
    /// Config file (defaults to SYNTHD_CONFIG, ./synthd.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Logic synthesis executable
    #[arg(long, alias = "yosys-path")]
    synthesis_path: Option<String>,

    /// Placement/routing executable
    #[arg(long, alias = "nextpnr-path")]
    pnr_path: Option<String>,

    /// Maximum concurrent pipelines
    #[arg(long)]
    capacity: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(path) = self.synthesis_path {
            settings.tools.synthesis_path = Some(path);
        }
        if let Some(path) = self.pnr_path {
            settings.tools.pnr_path = Some(path);
        }
        if let Some(capacity) = self.capacity {
            settings.admission.capacity = capacity;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    synthd::telemetry::init_tracing(cli.verbose);

    let loaded = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let mut settings = match loaded {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut settings);

    // Refuse to start with a toolchain that cannot run.
    if let Err(e) = settings.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let (config, gate) = match (settings.toolchain_config(), settings.admission_gate()) {
        (Ok(config), Ok(gate)) => (config, gate),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        synthesis = %config.synthesis_path.display(),
        pnr = %config.pnr_path.display(),
        capacity = gate.capacity(),
        "toolchain ready"
    );

    let service = CompileService::new(ToolchainPipeline::new(config), gate);
    let addr = (settings.server.host.as_str(), settings.server.port);
    let server = match Server::bind(addr, service).await {
        Ok(server) => server.with_max_request_bytes(settings.server.max_request_bytes),
        Err(e) => {
            eprintln!(
                "Failed to bind {}:{}: {}",
                settings.server.host, settings.server.port, e
            );
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    match server.run_until(shutdown).await {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
