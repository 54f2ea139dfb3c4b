// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use mediakit_core::buffer_pool::DEFAULT_MAX_POOLED_BUFFERS;
use mediakit_engine::constants::{DEFAULT_CODEC_BUFFER_CAPACITY, DEFAULT_PROGRESS_GRANULARITY};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log file format options.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (faster, lower CPU overhead)
    #[default]
    Text,
    /// JSON format (structured, better for log aggregation)
    Json,
}

/// Logging configuration for console and file output.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default)]
    pub console_enable: bool,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default)]
    pub file_path: String,
    /// Format for file logging: "text" (default) or "json" (structured)
    #[serde(default)]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: false,
            console_level: LogLevel::Warn,
            file_level: LogLevel::Info,
            file_path: "./mkit.log".to_string(),
            file_format: LogFormat::default(),
        }
    }
}

const fn default_progress_granularity() -> u32 {
    DEFAULT_PROGRESS_GRANULARITY
}

const fn default_encoder_buffer_capacity() -> usize {
    DEFAULT_CODEC_BUFFER_CAPACITY
}

const fn default_max_pooled_buffers() -> usize {
    DEFAULT_MAX_POOLED_BUFFERS
}

const fn default_resampler_chunk_frames() -> usize {
    1024
}

const fn default_true() -> bool {
    true
}

/// Job and pipeline tuning.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct TransformConfig {
    /// Report progress in steps of 1/N (default: 100). 0 reports every change.
    #[serde(default = "default_progress_granularity")]
    pub progress_granularity: u32,
    /// Size in bytes of each encoder input buffer (default: 16384).
    /// Decoded frames larger than this are split across several buffers.
    #[serde(default = "default_encoder_buffer_capacity")]
    pub encoder_buffer_capacity: usize,
    /// Check free space on the output volume before starting (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
    /// Idle scratch buffers the audio renderer keeps for reuse (default: 16)
    #[serde(default = "default_max_pooled_buffers")]
    pub max_pooled_buffers: usize,
    /// Input frames per resampler chunk (default: 1024)
    #[serde(default = "default_resampler_chunk_frames")]
    pub resampler_chunk_frames: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            progress_granularity: default_progress_granularity(),
            encoder_buffer_capacity: default_encoder_buffer_capacity(),
            check_disk_space: true,
            max_pooled_buffers: default_max_pooled_buffers(),
            resampler_chunk_frames: default_resampler_chunk_frames(),
        }
    }
}

const fn default_volume() -> f64 {
    1.0
}

/// Output audio settings. Command line flags take precedence.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct AudioConfig {
    /// Output sample rate in Hz. Unset keeps the input rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Output channel count. Unset keeps the input layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    /// Logarithmic volume: 0.0 = mute, 1.0 = unchanged, up to 2.0
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { sample_rate: None, channels: None, volume: default_volume() }
    }
}

/// Root configuration for `mkit`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct MkitConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: MkitConfig,
    pub file_missing: Option<String>,
}

/// Loads the configuration from defaults, a TOML file, and `MKIT_` environment variables.
///
/// Nested keys use `__` in variable names, e.g. `MKIT_AUDIO__VOLUME=0.5`.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file exists but contains invalid TOML syntax
/// - Environment variables are set but contain invalid values
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(MkitConfig::default()));

    let mut file_missing = None;

    // A missing file is not an error; defaults and the environment still apply.
    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let config: MkitConfig =
        figment.merge(Env::prefixed("MKIT_").split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized to TOML.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&MkitConfig::default())
}
