use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// External transcoder settings shared by the recording and metrics commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// FFmpeg command to use for recording and sampling
    /// Can be a full path (/usr/bin/ffmpeg) or command name (ffmpeg)
    /// The system will search $PATH if not a full path
    #[serde(default = "default_ffmpeg_command")]
    pub command: String,

    /// Ingest URL template; `{stream_id}` and `{app}` are substituted per session
    #[serde(default = "default_input_url_template")]
    pub input_url_template: String,

    /// Audio codec used by the recording profile (video is always copied)
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

/// What to do when an ingest starts for a stream that already has a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the new ingest and keep the running session
    Reject,
    /// Stop the running session, wait for it to terminate, then start fresh
    Supersede,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Reject => write!(f, "reject"),
            DuplicatePolicy::Supersede => write!(f, "supersede"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How long a process gets after SIGTERM before it is killed
    #[serde(default = "default_termination_grace", with = "duration_serde::duration")]
    pub termination_grace: Duration,

    /// Samples that must be measured before metrics are published
    #[serde(default = "default_warmup_samples")]
    pub warmup_samples: u32,

    #[serde(default = "default_duplicate_policy")]
    pub duplicate_policy: DuplicatePolicy,

    /// Carry an unterminated trailing progress line over to the next chunk
    #[serde(default = "default_buffer_partial_lines")]
    pub buffer_partial_lines: bool,

    /// Multiplier from bitrate to estimated bandwidth
    #[serde(default = "default_bandwidth_factor")]
    pub bandwidth_factor: f64,

    /// Per-session process event queue depth
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_vod_path")]
    pub vod_path: PathBuf,
    #[serde(default = "default_media_path")]
    pub media_path: PathBuf,
}

/// Public addresses handed out with stream keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Where broadcasters publish; keys are appended as `/live/<key>`
    #[serde(default = "default_rtmp_base_url")]
    pub rtmp_base_url: String,
    /// Where viewers fetch `live/<key>/index.m3u8`
    #[serde(default = "default_hls_base_url")]
    pub hls_base_url: String,
}

fn default_host() -> String { DEFAULT_HOST.to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_ffmpeg_command() -> String { DEFAULT_FFMPEG_COMMAND.to_string() }
fn default_input_url_template() -> String { DEFAULT_INPUT_URL_TEMPLATE.to_string() }
fn default_audio_codec() -> String { DEFAULT_AUDIO_CODEC.to_string() }
fn default_termination_grace() -> Duration {
    humantime::parse_duration(DEFAULT_TERMINATION_GRACE).unwrap_or(Duration::from_secs(5))
}
fn default_warmup_samples() -> u32 { DEFAULT_WARMUP_SAMPLES }
fn default_duplicate_policy() -> DuplicatePolicy { DuplicatePolicy::Reject }
fn default_buffer_partial_lines() -> bool { DEFAULT_BUFFER_PARTIAL_LINES }
fn default_bandwidth_factor() -> f64 { DEFAULT_BANDWIDTH_FACTOR }
fn default_event_channel_capacity() -> usize { DEFAULT_EVENT_CHANNEL_CAPACITY }
fn default_rtmp_base_url() -> String { DEFAULT_RTMP_BASE_URL.to_string() }
fn default_hls_base_url() -> String { DEFAULT_HLS_BASE_URL.to_string() }
fn default_vod_path() -> PathBuf { PathBuf::from(DEFAULT_VOD_PATH) }
fn default_media_path() -> PathBuf { PathBuf::from(DEFAULT_MEDIA_PATH) }

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            command: default_ffmpeg_command(),
            input_url_template: default_input_url_template(),
            audio_codec: default_audio_codec(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            termination_grace: default_termination_grace(),
            warmup_samples: default_warmup_samples(),
            duplicate_policy: default_duplicate_policy(),
            buffer_partial_lines: default_buffer_partial_lines(),
            bandwidth_factor: default_bandwidth_factor(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            vod_path: default_vod_path(),
            media_path: default_media_path(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            rtmp_base_url: default_rtmp_base_url(),
            hls_base_url: default_hls_base_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            ffmpeg: FfmpegConfig::default(),
            supervisor: SupervisorConfig::default(),
            storage: StorageConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the supervisor cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.ffmpeg.input_url_template.contains("{stream_id}") {
            return Err(AppError::configuration(format!(
                "ffmpeg.input_url_template must contain {{stream_id}}: {}",
                self.ffmpeg.input_url_template
            )));
        }
        if self.ffmpeg.command.trim().is_empty() {
            return Err(AppError::configuration("ffmpeg.command must not be empty"));
        }
        if self.supervisor.warmup_samples == 0 {
            return Err(AppError::configuration("supervisor.warmup_samples must be at least 1"));
        }
        if !(self.supervisor.bandwidth_factor > 0.0) {
            return Err(AppError::configuration("supervisor.bandwidth_factor must be positive"));
        }
        if self.supervisor.event_channel_capacity == 0 {
            return Err(AppError::configuration("supervisor.event_channel_capacity must be positive"));
        }
        for (name, url) in [
            ("streaming.rtmp_base_url", &self.streaming.rtmp_base_url),
            ("streaming.hls_base_url", &self.streaming.hls_base_url),
        ] {
            if !url.contains("://") {
                return Err(AppError::configuration(format!("{} must be an absolute URL: {}", name, url)));
            }
        }
        Ok(())
    }
}
