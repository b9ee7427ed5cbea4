pub mod catalog;

pub use catalog::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::protocol::{LabError, LabResult};
use crate::sandbox::{
    compile_pattern, DEFAULT_BLOCKED_PATTERNS, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_INPUT_LENGTH, DEFAULT_WHITELIST,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory of `*.json` lab definitions. Without one the built-in
    /// demo lab is served.
    #[serde(default)]
    pub labs_dir: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub connection_timeout_seconds: u64,
    pub session_idle_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub max_input_length: usize,
    pub history_limit: usize,
    pub max_commands_per_session: u64,
    pub commands_per_minute: u32,
    pub whitelist: Vec<String>,
    pub blocked_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enable_audit: bool,
    pub audit_log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4242,
            max_connections: 100,
            connection_timeout_seconds: 300,
            session_idle_minutes: 60,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_commands_per_session: 1000,
            commands_per_minute: 120,
            whitelist: DEFAULT_WHITELIST.iter().map(|c| c.to_string()).collect(),
            blocked_patterns: DEFAULT_BLOCKED_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_audit: true,
            audit_log_file: None,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> LabResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LabError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content).map_err(|e| LabError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LabResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LabError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| LabError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> LabResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LabError::Config(format!("Failed to create config directory: {}", e)))?;
            }

            config.save_to_file(path)?;
            Ok(config)
        }
    }

    pub fn get_default_config_path() -> LabResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LabError::Config("Could not determine the user config directory".to_string()))?
            .join("termlab");

        Ok(config_dir.join("termlab.toml"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn validate(&self) -> LabResult<()> {
        if self.server.port == 0 {
            return Err(LabError::Config("Invalid port number".to_string()));
        }

        if self.server.max_connections == 0 {
            return Err(LabError::Config("max_connections must be greater than 0".to_string()));
        }

        if self.terminal.max_input_length == 0 {
            return Err(LabError::Config("max_input_length must be greater than 0".to_string()));
        }

        if self.terminal.history_limit == 0 {
            return Err(LabError::Config("history_limit must be greater than 0".to_string()));
        }

        if self.terminal.commands_per_minute == 0 {
            return Err(LabError::Config("commands_per_minute must be greater than 0".to_string()));
        }

        if self.terminal.whitelist.is_empty() {
            return Err(LabError::Config("The command whitelist must not be empty".to_string()));
        }

        for pattern in &self.terminal.blocked_patterns {
            compile_pattern(pattern)?;
        }

        if let Some(dir) = &self.labs_dir {
            if !dir.is_dir() {
                return Err(LabError::Config(format!("Labs directory does not exist: {}", dir.display())));
            }
        }

        Ok(())
    }
}
