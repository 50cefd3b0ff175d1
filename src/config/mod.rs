//! Configuration module for synthd.
//!
//! Handles the TOML settings file, environment variable expansion and the
//! conversion of settings into pipeline and admission configuration.

mod settings;

pub use settings::{
    expand_env_vars, parse_duration, AdmissionSettings, PipelineSettings, ServerSettings,
    Settings, SettingsError, ToolSettings,
};
