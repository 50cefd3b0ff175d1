//! synthd-client - submit a Verilog file to a synthd server
//!
//! Usage:
//!   synthd-client <file.v> --port <port> [--host <host>] [--ghz <f> | --mhz <f>] [--json]
//!
//! Examples:
//!   synthd-client counter.v --port 10000
//!   synthd-client counter.v --port 10000 --ghz 1.0

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use synthd::client::SynthesisClient;
use synthd::protocol::{CompileRequest, CompileResponse};
use synthd::report::units;

#[derive(Parser)]
#[command(name = "synthd-client")]
#[command(about = "Submit HDL to a synthd server and print the achieved clock frequency")]
#[command(version)]
struct Cli {
    /// Path to the Verilog source
    file: PathBuf,

    /// Server port
    #[arg(short, long)]
    port: u16,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Timing goal in GHz
    #[arg(long, conflicts_with = "mhz")]
    ghz: Option<String>,

    /// Timing goal in MHz
    #[arg(long)]
    mhz: Option<String>,

    /// Print the raw response as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Timing goal in Hz, if one was given.
    fn target_hz(&self) -> Result<Option<u64>, String> {
        let (literal, exponent, flag) = match (&self.ghz, &self.mhz) {
            (Some(v), _) => (v, 9, "--ghz"),
            (None, Some(v)) => (v, 6, "--mhz"),
            (None, None) => return Ok(None),
        };
        units::decimal_to_hz(literal, exponent)
            .map(Some)
            .ok_or_else(|| format!("invalid value for {}: '{}'", flag, literal))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let target = match cli.target_hz() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = match fs::read_to_string(&cli.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut request = CompileRequest::new(source);
    if let Some(hz) = target {
        request = request.with_target_frequency_hz(hz);
    }

    let mut client = match SynthesisClient::connect((cli.host.as_str(), cli.port)).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}:{}: {}", cli.host, cli.port, e);
            return ExitCode::FAILURE;
        }
    };

    let response = match client.compile(&request).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_response(&response, cli.json);

    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_response(response: &CompileResponse, json: bool) {
    if json {
        match serde_json::to_string_pretty(response) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error encoding response: {}", e),
        }
        return;
    }

    if !response.success {
        eprintln!("{}", response.error_message);
        return;
    }

    println!(
        "Max frequency: {} Hz ({} MHz)",
        response.max_frequency_hz,
        units::format_mhz(response.max_frequency_hz)
    );
    for clock in &response.clocks {
        println!(
            "  {}: {} MHz",
            clock.clock,
            units::format_mhz(clock.achieved_hz)
        );
    }
    println!("Elapsed: {} ms", response.elapsed_ms);
}
