//! FFmpeg argument profiles for the two per-session processes
//!
//! The flags are a contract with the external transcoder: any tool that
//! accepts them and writes `key=value` progress lines to stdout will do.

use std::path::Path;
use tracing::warn;

use crate::config::FfmpegConfig;
use crate::models::{ProcessRole, StreamPath};

/// Recording: copy video, transcode audio, write to the VOD path
const RECORDING_ARGS: &[&str] = &[
    "-i", "{input_url}",
    "-c:v", "copy",
    "-c:a", "{audio_codec}",
    "-y", "{output_path}",
];

/// Metrics sampling: decode to nowhere, progress blocks on stdout
const METRICS_ARGS: &[&str] = &[
    "-i", "{input_url}",
    "-f", "null", "-",
    "-stats",
    "-progress", "pipe:1",
];

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub role: ProcessRole,
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct CommandProfiles {
    program: String,
    input_url_template: String,
    audio_codec: String,
}

impl CommandProfiles {
    pub fn new(config: &FfmpegConfig) -> Self {
        Self {
            program: config.command.clone(),
            input_url_template: config.input_url_template.clone(),
            audio_codec: config.audio_codec.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Ingest URL for a stream, e.g. `rtmp://127.0.0.1/live/<stream_id>`
    pub fn input_url(&self, path: &StreamPath) -> String {
        self.input_url_template
            .replace("{app}", &path.app)
            .replace("{stream_id}", &path.stream_id)
    }

    pub fn recording(&self, input_url: &str, output_path: &Path) -> CommandSpec {
        let output_path = output_path.to_string_lossy();
        CommandSpec {
            role: ProcessRole::Recording,
            program: self.program.clone(),
            args: self.resolve_template_variables(RECORDING_ARGS, input_url, &output_path),
        }
    }

    pub fn metrics(&self, input_url: &str) -> CommandSpec {
        CommandSpec {
            role: ProcessRole::Metrics,
            program: self.program.clone(),
            args: self.resolve_template_variables(METRICS_ARGS, input_url, ""),
        }
    }

    fn resolve_template_variables(&self, template: &[&str], input_url: &str, output_path: &str) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                arg.replace("{input_url}", input_url)
                    .replace("{output_path}", output_path)
                    .replace("{audio_codec}", &self.audio_codec)
            })
            .collect()
    }
}

/// Check if FFmpeg is available and get version information
pub async fn check_ffmpeg_availability(ffmpeg_command: &str) -> (bool, Option<String>) {
    match tokio::process::Command::new(ffmpeg_command)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => {
            if output.status.success() {
                let version_output = String::from_utf8_lossy(&output.stdout);
                (true, parse_ffmpeg_version(&version_output))
            } else {
                warn!(
                    "FFmpeg command '{}' failed with status: {}",
                    ffmpeg_command, output.status
                );
                (false, None)
            }
        }
        Err(e) => {
            warn!("Failed to execute FFmpeg command '{}': {}", ffmpeg_command, e);
            (false, None)
        }
    }
}

/// Version from the first line, e.g. "ffmpeg version 6.1.1-3ubuntu5 Copyright ..."
fn parse_ffmpeg_version(output: &str) -> Option<String> {
    output.lines().next().and_then(|line| {
        if line.starts_with("ffmpeg version") {
            line.split_whitespace().nth(2).map(|v| v.to_string())
        } else {
            None
        }
    })
}
