/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

// FFmpeg defaults
pub const DEFAULT_FFMPEG_COMMAND: &str = "ffmpeg";
pub const DEFAULT_INPUT_URL_TEMPLATE: &str = "rtmp://127.0.0.1/live/{stream_id}";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

// Supervisor defaults
pub const DEFAULT_TERMINATION_GRACE: &str = "5s";
pub const DEFAULT_WARMUP_SAMPLES: u32 = 3;
pub const DEFAULT_BUFFER_PARTIAL_LINES: bool = true;
pub const DEFAULT_BANDWIDTH_FACTOR: f64 = 1.2;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

// Stream key URL defaults
pub const DEFAULT_RTMP_BASE_URL: &str = "rtmp://localhost:1935";
pub const DEFAULT_HLS_BASE_URL: &str = "http://localhost:8000/media";
pub const DEFAULT_STREAM_QUALITY: &str = "high";
pub const DEFAULT_STREAM_MAX_BITRATE: u32 = 6000;
pub const DEFAULT_STREAM_RESOLUTION: &str = "1920x1080";

// Storage defaults
pub const DEFAULT_VOD_PATH: &str = "./media/vod";
pub const DEFAULT_MEDIA_PATH: &str = "./public/media";

// Metrics broadcast defaults
pub const DEFAULT_METRICS_BROADCAST_CAPACITY: usize = 1000;
