use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_STREAM_MAX_BITRATE, DEFAULT_STREAM_QUALITY, DEFAULT_STREAM_RESOLUTION};

/// Broadcaster-facing encoding preferences attached to a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub quality: String,
    /// kbit/s
    pub max_bitrate: u32,
    /// `<width>x<height>`
    pub resolution: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_STREAM_QUALITY.to_string(),
            max_bitrate: DEFAULT_STREAM_MAX_BITRATE,
            resolution: DEFAULT_STREAM_RESOLUTION.to_string(),
        }
    }
}

/// Partial settings change; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamSettingsUpdate {
    pub quality: Option<String>,
    pub max_bitrate: Option<u32>,
    pub resolution: Option<String>,
}

impl StreamSettingsUpdate {
    pub fn apply_to(self, settings: &mut StreamSettings) {
        if let Some(quality) = self.quality {
            settings.quality = quality;
        }
        if let Some(max_bitrate) = self.max_bitrate {
            settings.max_bitrate = max_bitrate;
        }
        if let Some(resolution) = self.resolution {
            settings.resolution = resolution;
        }
    }
}

/// A publish credential and the addresses derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamKey {
    pub stream_key: String,
    /// Where the broadcaster publishes
    pub stream_url: String,
    /// Where viewers play the stream back
    pub hls_url: String,
    pub settings: StreamSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returns true for `<width>x<height>` with both sides positive
pub fn is_valid_resolution(resolution: &str) -> bool {
    resolution
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
        .is_some_and(|(w, h)| w > 0 && h > 0)
}
