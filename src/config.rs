//! Application configuration
//!
//! Loaded once at startup from a YAML file. Every field has a default so a
//! missing or partial file still yields a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Layout document loaded at startup, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

/// MIDI port selection (case-insensitive substring match on port names)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// Engine timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Inbound drain rate in Hz. 100 is plenty; lower bounds
    /// responsiveness, higher just burns CPU.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { tick_hz: default_tick_hz() }
    }
}

fn default_tick_hz() -> u32 {
    100
}

impl AppConfig {
    /// Load configuration from a YAML file; a missing file yields defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Drain interval derived from the configured tick rate
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / u64::from(self.engine.tick_hz.clamp(1, 1000)))
    }
}
