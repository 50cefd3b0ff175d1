//! # synthd
//!
//! A remote HDL synthesis service: clients submit Verilog, the server runs a
//! logic-synthesis tool and a place-and-route tool over it and answers with
//! the achieved maximum clock frequency.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          synthd-client  ──NDJSON/TCP──►  server          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [service]
//! ┌─────────────────────────────────────────────────────────┐
//! │   CompileService: validate ─► admission gate ─► backend  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [pipeline]
//! ┌─────────────────────────────────────────────────────────┐
//! │   temp workspace ─► synthesis ─► place-and-route         │
//! │                     (tool::run, timeouts, group kill)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [report]
//! ┌─────────────────────────────────────────────────────────┐
//! │          timing summary ─► max frequency in Hz           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod report;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod tool;

pub use client::{ClientError, SynthesisClient};
pub use error::{SynthesisError, SynthesisResult};
pub use pipeline::{SynthesisBackend, ToolchainConfig, ToolchainPipeline};
pub use protocol::{CompileRequest, CompileResponse};
pub use server::Server;
pub use service::{AdmissionGate, CompileService};
