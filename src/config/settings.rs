//! TOML-based configuration for synthd.
//!
//! Supports a config file (synthd.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 10000
//!
//! [tools]
//! synthesis_path = "${YOSYS_HOME}/bin/yosys"
//! pnr_path = "/usr/local/bin/nextpnr-ecp5"
//! synthesis_timeout = "10m"
//! pnr_timeout = "20m"
//!
//! [pipeline]
//! top_module = "main"
//! synthesis_command = "synth_ecp5"
//! pnr_args = ["--45k", "--package", "CABGA381"]
//! max_capture_bytes = 65536
//! max_output_bytes = 16777216
//! return_netlist = false
//!
//! [admission]
//! capacity = 1
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::ToolchainConfig;
use crate::service::AdmissionGate;
use crate::tool::{self, DEFAULT_CAPTURE_LIMIT, DEFAULT_OUTPUT_LIMIT};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid tool path for {setting}: {source}")]
    InvalidTool {
        setting: &'static str,
        #[source]
        source: tool::ToolError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Network front end.
    pub server: ServerSettings,

    /// External tool locations and limits.
    pub tools: ToolSettings,

    /// Pipeline behaviour.
    pub pipeline: PipelineSettings,

    /// Concurrency gate.
    pub admission: AdmissionSettings,
}

/// Network settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Longest accepted request line, in bytes.
    pub max_request_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10000,
            max_request_bytes: 16 * 1024 * 1024,
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Logic synthesis executable (supports ${ENV_VAR} expansion).
    pub synthesis_path: Option<String>,

    /// Placement/routing executable (supports ${ENV_VAR} expansion).
    pub pnr_path: Option<String>,

    /// Synthesis time limit (e.g., "10m", "90s").
    pub synthesis_timeout: String,

    /// Placement/routing time limit.
    pub pnr_timeout: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            synthesis_path: None,
            pnr_path: None,
            synthesis_timeout: "10m".to_string(),
            pnr_timeout: "20m".to_string(),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Top-level module name passed to synthesis.
    pub top_module: String,

    /// Synthesis pass emitted in the generated script.
    pub synthesis_command: String,

    /// Device arguments for placement/routing.
    pub pnr_args: Vec<String>,

    /// Parent directory for per-request workspaces.
    pub workspace_root: Option<String>,

    /// Cap on tool output quoted in error messages.
    pub max_capture_bytes: usize,

    /// Cap on each tool stream held in memory; older output is dropped.
    pub max_output_bytes: usize,

    /// Include the netlist in successful responses.
    pub return_netlist: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
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
}

/// Admission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Maximum concurrent pipelines.
    pub capacity: usize,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self { capacity: 1 }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SYNTHD_CONFIG`
    /// 2. `./synthd.toml`
    /// 3. `~/.config/synthd/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SYNTHD_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("synthd.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("synthd").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Resolved synthesis tool path.
    pub fn synthesis_path(&self) -> Result<PathBuf, SettingsError> {
        let raw = self
            .tools
            .synthesis_path
            .as_deref()
            .ok_or(SettingsError::MissingSetting("tools.synthesis_path"))?;
        resolve_executable(raw)
    }

    /// Resolved placement/routing tool path.
    pub fn pnr_path(&self) -> Result<PathBuf, SettingsError> {
        let raw = self
            .tools
            .pnr_path
            .as_deref()
            .ok_or(SettingsError::MissingSetting("tools.pnr_path"))?;
        resolve_executable(raw)
    }

    /// Check the configuration, including that both tools are executable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.admission.capacity == 0 {
            return Err(SettingsError::InvalidConfig(
                "admission.capacity must be at least 1".to_string(),
            ));
        }
        if self.pipeline.top_module.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "pipeline.top_module must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("tools.synthesis_timeout", &self.tools.synthesis_timeout),
            ("tools.pnr_timeout", &self.tools.pnr_timeout),
        ] {
            if parse_duration(value)?.is_zero() {
                return Err(SettingsError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        tool::check_executable(&self.synthesis_path()?).map_err(|source| {
            SettingsError::InvalidTool {
                setting: "tools.synthesis_path",
                source,
            }
        })?;
        tool::check_executable(&self.pnr_path()?).map_err(|source| SettingsError::InvalidTool {
            setting: "tools.pnr_path",
            source,
        })?;

        Ok(())
    }

    /// Build the pipeline configuration.
    pub fn toolchain_config(&self) -> Result<ToolchainConfig, SettingsError> {
        let mut config = ToolchainConfig::new(self.synthesis_path()?, self.pnr_path()?)
            .with_timeouts(
                parse_duration(&self.tools.synthesis_timeout)?,
                parse_duration(&self.tools.pnr_timeout)?,
            )
            .with_top_module(self.pipeline.top_module.clone())
            .with_synthesis_command(self.pipeline.synthesis_command.clone())
            .with_pnr_args(self.pipeline.pnr_args.clone())
            .with_max_capture_bytes(self.pipeline.max_capture_bytes)
            .with_max_output_bytes(self.pipeline.max_output_bytes)
            .with_return_netlist(self.pipeline.return_netlist);

        if let Some(root) = &self.pipeline.workspace_root {
            config = config.with_workspace_root(expand_env_vars(root)?);
        }

        Ok(config)
    }

    /// Build the admission gate.
    pub fn admission_gate(&self) -> Result<AdmissionGate, SettingsError> {
        NonZeroUsize::new(self.admission.capacity)
            .map(AdmissionGate::new)
            .ok_or_else(|| {
                SettingsError::InvalidConfig("admission.capacity must be at least 1".to_string())
            })
    }
}

/// Expand env vars in `raw` and look bare names up on `PATH`.
fn resolve_executable(raw: &str) -> Result<PathBuf, SettingsError> {
    let expanded = expand_env_vars(raw)?;
    let path = PathBuf::from(&expanded);
    if path.components().count() > 1 || path.is_absolute() {
        return Ok(path);
    }

    if let Some(search) = env::var_os("PATH") {
        for dir in env::split_paths(&search) {
            let candidate = dir.join(&expanded);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Ok(path)
}

/// Parse a duration such as `"500ms"`, `"30s"`, `"10m"`, `"1h"`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;

    let secs = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => None,
    };
    secs.map(Duration::from_secs)
        .ok_or_else(|| SettingsError::InvalidDuration(s.to_string()))
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
