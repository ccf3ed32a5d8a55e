//! JobClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobClawConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_database_path() -> String {
    "~/.jobclaw/jobclaw.db".into()
}

impl Default for JobClawConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scheduler: SchedulerConfig::default(),
            composer: ComposerConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl JobClawConfig {
    /// Load config from the default path (~/.jobclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::JobClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::JobClawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::JobClawError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jobclaw")
            .join("config.toml")
    }

    /// Get the JobClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jobclaw")
    }

    /// Resolve the database path, expanding a leading `~`.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(rest) = self.database_path.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest)
        } else {
            PathBuf::from(&self.database_path)
        }
    }
}

/// Cycle timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Send cycle period in seconds.
    #[serde(default = "default_send_cycle_secs")]
    pub send_cycle_secs: u64,
    /// Reply-check cycle period in seconds.
    #[serde(default = "default_reply_cycle_secs")]
    pub reply_cycle_secs: u64,
    /// Pause after each successful send, for deliverability.
    #[serde(default = "default_inter_send_delay_secs")]
    pub inter_send_delay_secs: u64,
}

fn default_send_cycle_secs() -> u64 {
    300
}
fn default_reply_cycle_secs() -> u64 {
    600
}
fn default_inter_send_delay_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            send_cycle_secs: default_send_cycle_secs(),
            reply_cycle_secs: default_reply_cycle_secs(),
            inter_send_delay_secs: default_inter_send_delay_secs(),
        }
    }
}

/// LLM composer endpoint configuration (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    #[serde(default = "default_composer_base_url")]
    pub base_url: String,
    #[serde(default = "default_composer_model")]
    pub model: String,
    /// Falls back to OPENAI_API_KEY when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_composer_temperature")]
    pub temperature: f32,
}

fn default_composer_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_composer_model() -> String {
    "gpt-4o-mini".into()
}
fn default_composer_temperature() -> f32 {
    0.7
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            base_url: default_composer_base_url(),
            model: default_composer_model(),
            api_key: String::new(),
            temperature: default_composer_temperature(),
        }
    }
}

/// Status-sync webhook configuration. Empty URL disables the hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub webhook_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobClawConfig::default();
        assert_eq!(config.scheduler.send_cycle_secs, 300);
        assert_eq!(config.scheduler.reply_cycle_secs, 600);
        assert_eq!(config.scheduler.inter_send_delay_secs, 60);
        assert!(config.sync.webhook_url.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: JobClawConfig = toml::from_str(
            r#"
            [scheduler]
            send_cycle_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.send_cycle_secs, 120);
        assert_eq!(config.scheduler.reply_cycle_secs, 600);
        assert_eq!(config.composer.model, "gpt-4o-mini");
    }
}
