//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;
use crate::session::repl::ReplMode;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How free-form console input is classified
    #[serde(default)]
    pub repl_mode: ReplMode,

    /// Prefix that forces console input to run as a debugger command
    #[serde(default = "default_escape_prefix")]
    pub command_escape_prefix: String,

    /// Format string used to render stack frame names
    #[serde(default)]
    pub frame_format: Option<String>,

    /// Format string used to render thread names
    #[serde(default)]
    pub thread_format: Option<String>,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Command batches run at fixed points of the session
    #[serde(default)]
    pub commands: CommandBatches,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            repl_mode: ReplMode::default(),
            command_escape_prefix: default_escape_prefix(),
            frame_format: None,
            thread_format: None,
            timeouts: Timeouts::default(),
            commands: CommandBatches::default(),
        }
    }
}

fn default_escape_prefix() -> String {
    "`".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    /// How long to wait for the debuggee to reach a stopped state
    #[serde(default = "default_process_stop")]
    pub process_stop_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            process_stop_secs: default_process_stop(),
        }
    }
}

fn default_process_stop() -> u64 {
    30
}

/// Debugger commands run at fixed points of the session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandBatches {
    #[serde(default)]
    pub init: Vec<String>,
    #[serde(default)]
    pub pre_run: Vec<String>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub exit: Vec<String>,
    #[serde(default)]
    pub terminate: Vec<String>,
}

impl SessionConfig {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.command_escape_prefix.chars().any(char::is_whitespace) {
            return Err(super::Error::Config(
                "command_escape_prefix must not contain whitespace".to_string(),
            ));
        }
        if self.timeouts.process_stop_secs == 0 {
            return Err(super::Error::Config(
                "timeouts.process_stop_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
