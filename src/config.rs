use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gateway::{AuthorId, ChannelId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required config value: {0}")]
    MissingValue(&'static str),

    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Authors whose messages are treated as source code. Required.
    #[serde(default)]
    pub trusted_authors: Vec<AuthorId>,

    /// Channels whose messages form the fragment store. Required.
    #[serde(default)]
    pub code_channels: Vec<ChannelId>,

    /// Where error reports go. Required.
    #[serde(default)]
    pub log_channel: ChannelId,

    /// This process's own identity; its messages are always discarded.
    /// Required.
    #[serde(default)]
    pub self_id: AuthorId,

    /// Upper bound on stored fragments; exceeding it at backfill is fatal.
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,

    /// Capacity of the inbound event channel.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub capability: CapabilityConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            trusted_authors: Vec::new(),
            code_channels: Vec::new(),
            log_channel: ChannelId::new(),
            self_id: AuthorId::new(),
            max_fragments: default_max_fragments(),
            event_buffer_size: default_event_buffer_size(),
            capability: CapabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Directory scanned at startup for capability manifests.
    #[serde(default = "default_capability_dir")]
    pub dir: PathBuf,

    /// Installer command; the capability name (or source hint) is appended.
    #[serde(default = "default_installer")]
    pub installer: Vec<String>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            dir: default_capability_dir(),
            installer: default_installer(),
        }
    }
}

fn default_max_fragments() -> usize {
    100
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_capability_dir() -> PathBuf {
    PathBuf::from("capabilities")
}

fn default_installer() -> Vec<String> {
    vec!["saisei-capctl".to_string(), "install".to_string()]
}

impl SystemConfig {
    /// Reads and validates a JSON config file. Any missing required value
    /// is a fatal startup condition.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config: SystemConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trusted_authors.is_empty() {
            return Err(ConfigError::MissingValue("trusted_authors"));
        }
        if self.code_channels.is_empty() {
            return Err(ConfigError::MissingValue("code_channels"));
        }
        if self.log_channel.is_empty() {
            return Err(ConfigError::MissingValue("log_channel"));
        }
        if self.self_id.is_empty() {
            return Err(ConfigError::MissingValue("self_id"));
        }
        Ok(())
    }
}
