//! Host configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STATECHART_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use statechart_core::interpreter::{InterpreterOptions, DEFAULT_MAX_MICROSTEPS};
use std::path::{Path, PathBuf};

/// Host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interpreter limits.
    pub interpreter: InterpreterConfig,
    /// Logging and printing.
    pub output: OutputConfig,
    /// Interactive shell.
    pub repl: ReplConfig,
}

impl Config {
    /// Loads configuration from `path` (or STATECHART_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("STATECHART_CONFIG") {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.interpreter.apply_overrides(&var);
        self.output.apply_overrides(&var);
        self.repl.apply_overrides(&var);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreter.max_microsteps == 0 {
            return Err(ConfigError::ValidationError(
                "interpreter.max_microsteps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Interpreter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Microsteps allowed per macrostep before the interpreter yields.
    pub max_microsteps: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_microsteps: DEFAULT_MAX_MICROSTEPS,
        }
    }
}

impl InterpreterConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(max) = var("STATECHART_MAX_MICROSTEPS") {
            if let Ok(n) = max.parse() {
                self.max_microsteps = n;
            }
        }
    }

    pub fn options(&self) -> InterpreterOptions {
        InterpreterOptions {
            max_microsteps: self.max_microsteps,
            ..Default::default()
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default tracing filter when RUST_LOG is unset.
    pub log_level: String,
    /// Colored terminal output.
    pub color: bool,
    /// Print compressed (leaf) state names by default.
    pub compressed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            color: true,
            compressed: true,
        }
    }
}

impl OutputConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(level) = var("STATECHART_LOG") {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        if let Some(color) = var("STATECHART_COLOR") {
            self.color = color == "1" || color.to_lowercase() == "true";
        }
    }
}

/// REPL configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// History file. Defaults to ~/.statechart_history.
    pub history_file: Option<PathBuf>,
}

impl ReplConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("STATECHART_HISTORY_FILE") {
            self.history_file = Some(PathBuf::from(path));
        }
    }

    /// Returns the history file path.
    pub fn history_path(&self) -> PathBuf {
        self.history_file.clone().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".statechart_history"))
                .unwrap_or_else(|_| ".statechart_history".into())
        })
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
