//! Configuration management with file and environment variable support.

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dispatcher::DispatchMode;

/// Files read and written by a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub commands: PathBuf,
    pub output: PathBuf,
    pub event_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            commands: PathBuf::from("commands.txt"),
            output: PathBuf::from("output.txt"),
            event_log: PathBuf::from("hash.log"),
        }
    }
}

/// Diagnostic logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Worker launch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    pub worker_stack_kib: Option<usize>,
}

/// Main settings structure with all configuration sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
    pub dispatch: DispatchConfig,
}

impl Settings {
    /// Load settings, reading `path` instead of the optional local `chash.toml`
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with default settings
            .add_source(File::from_str(
                include_str!("../config.toml"),
                FileFormat::Toml,
            ));

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("chash").required(false)),
        };

        let config = builder
            // Add environment variables with CHASH_ prefix
            .add_source(
                Environment::with_prefix("CHASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings for consistency
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("paths.commands", &self.paths.commands),
            ("paths.output", &self.paths.output),
            ("paths.event_log", &self.paths.event_log),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("{} cannot be empty", key));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(anyhow!("logging.level cannot be empty"));
        }

        if let Some(kib) = self.dispatch.worker_stack_kib {
            if kib == 0 {
                return Err(anyhow!("dispatch.worker_stack_kib cannot be 0"));
            }
            if self.worker_stack_size().is_none() {
                return Err(anyhow!("dispatch.worker_stack_kib is too large: {}", kib));
            }
        }

        Ok(())
    }

    /// Worker thread stack size in bytes, when configured
    pub fn worker_stack_size(&self) -> Option<usize> {
        self.dispatch
            .worker_stack_kib
            .and_then(|kib| kib.checked_mul(1024))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}
