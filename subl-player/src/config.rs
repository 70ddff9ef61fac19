//! Configuration management for subl-player
//!
//! Single-tier TOML bootstrap configuration. Every field has a built-in
//! default, so a missing file starts the service with defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --log-level)
//! 2. Environment variables (SUBL_CONFIG, SUBL_PORT)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            synthesis: SynthesisConfig::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Speech synthesis endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// URL receiving `{ "text", "voice" }` and answering with audio bytes
    #[serde(default = "default_synthesis_endpoint")]
    pub endpoint: String,

    /// Endpoint rendering `system` voices; such voices fail without it
    #[serde(default)]
    pub system_endpoint: Option<String>,

    #[serde(default = "default_synthesis_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_synthesis_endpoint(),
            system_endpoint: None,
            timeout_ms: default_synthesis_timeout_ms(),
        }
    }
}

/// Engine timing, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Silence between consecutive affirmations
    #[serde(default = "default_speech_gap_ms")]
    pub speech_gap_ms: u64,

    /// Repeat delay used when the repetition interval is zero
    #[serde(default = "default_repeat_fallback_ms")]
    pub repeat_fallback_ms: u64,

    /// Delay between music start and the first affirmation
    #[serde(default = "default_speech_lead_in_ms")]
    pub speech_lead_in_ms: u64,

    #[serde(default = "default_seek_settle_ms")]
    pub seek_settle_ms: u64,

    /// Length of the one-time preview for unentitled listeners
    #[serde(default = "default_preview_window_ms")]
    pub preview_window_ms: u64,

    /// PlaybackProgress emission interval
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            speech_gap_ms: default_speech_gap_ms(),
            repeat_fallback_ms: default_repeat_fallback_ms(),
            speech_lead_in_ms: default_speech_lead_in_ms(),
            seek_settle_ms: default_seek_settle_ms(),
            preview_window_ms: default_preview_window_ms(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Resume snapshot storage
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for the resume snapshot; platform data dir if not specified
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_synthesis_endpoint() -> String {
    "http://127.0.0.1:5791/api/tts".to_string()
}

fn default_synthesis_timeout_ms() -> u64 {
    30_000
}

fn default_speech_gap_ms() -> u64 {
    1000
}

fn default_repeat_fallback_ms() -> u64 {
    5000
}

fn default_speech_lead_in_ms() -> u64 {
    1000
}

fn default_seek_settle_ms() -> u64 {
    200
}

fn default_preview_window_ms() -> u64 {
    5000
}

fn default_progress_interval_ms() -> u64 {
    1000
}

impl TomlConfig {
    /// Load from `path`, or defaults when no file is present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: TomlConfig = subl_common::config::load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(s).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.synthesis.endpoint.trim().is_empty() {
            return Err(Error::Config("synthesis.endpoint must not be empty".to_string()));
        }
        if self.timing.progress_interval_ms == 0 {
            return Err(Error::Config("timing.progress_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Storage directory, resolved against the platform data dir
    pub fn storage_directory(&self) -> PathBuf {
        self.storage
            .directory
            .clone()
            .unwrap_or_else(subl_common::config::default_data_dir)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis.timeout_ms)
    }

    pub fn engine_timing(&self) -> EngineTiming {
        let t = &self.timing;
        let timing = EngineTiming {
            speech_gap: Duration::from_millis(t.speech_gap_ms),
            repeat_fallback: Duration::from_millis(t.repeat_fallback_ms),
            speech_lead_in: Duration::from_millis(t.speech_lead_in_ms),
            seek_settle: Duration::from_millis(t.seek_settle_ms),
            preview_window: Duration::from_millis(t.preview_window_ms),
            progress_interval: Duration::from_millis(t.progress_interval_ms),
        };
        info!(
            "Engine timing: gap={}ms repeat_fallback={}ms lead_in={}ms settle={}ms preview={}ms",
            t.speech_gap_ms, t.repeat_fallback_ms, t.speech_lead_in_ms, t.seek_settle_ms, t.preview_window_ms
        );
        timing
    }
}

/// Resolved durations consumed by the playback controller and scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    pub speech_gap: Duration,
    pub repeat_fallback: Duration,
    pub speech_lead_in: Duration,
    pub seek_settle: Duration,
    pub preview_window: Duration,
    pub progress_interval: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            speech_gap: Duration::from_millis(default_speech_gap_ms()),
            repeat_fallback: Duration::from_millis(default_repeat_fallback_ms()),
            speech_lead_in: Duration::from_millis(default_speech_lead_in_ms()),
            seek_settle: Duration::from_millis(default_seek_settle_ms()),
            preview_window: Duration::from_millis(default_preview_window_ms()),
            progress_interval: Duration::from_millis(default_progress_interval_ms()),
        }
    }
}
