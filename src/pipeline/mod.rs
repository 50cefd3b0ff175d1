//! Toolchain pipeline.
//!
//! ```text
//! CompileRequest
//!       │
//!       ▼
//! ┌──────────────┐  design.v, synth.ys
//! │  Workspace   │──────────────────────┐
//! └──────────────┘                      ▼
//!       │                     ┌──────────────────┐
//!       │                     │ synthesis tool   │──► netlist.json
//!       │                     └──────────────────┘
//!       │                               │
//!       │                               ▼
//!       │                     ┌──────────────────┐
//!       │                     │ place-and-route  │──► timing summary text
//!       │                     └──────────────────┘
//!       │                               │
//!       ▼                               ▼
//!  removed on every exit       report::parse ──► PipelineOutput
//! ```
//!
//! The two stages are strictly sequential: place-and-route consumes the
//! netlist synthesis produced.

mod backend;
mod toolchain;
mod workspace;

pub use backend::{PipelineOutput, StageRecord, SynthesisBackend};
pub use toolchain::{
    ToolchainConfig, ToolchainPipeline, NETLIST_FILE, SCRIPT_FILE, SOURCE_FILE,
};
pub use workspace::{Workspace, WORKSPACE_PREFIX};
