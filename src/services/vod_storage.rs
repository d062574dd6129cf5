//! Recorded stream (VOD) files on disk

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{VodError, VodResult};

/// Chooses where a session's recording is written. Called on the async start
/// path, so implementations must not touch the filesystem.
pub trait VodPathGenerator: Send + Sync {
    fn generate_vod_path(&self, stream_id: &str) -> VodResult<PathBuf>;
}

/// A finished or in-progress recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct VodStorage {
    root: PathBuf,
}

impl VodStorage {
    /// Open the VOD directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> VodResult<Self> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            info!("Created VOD directory {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recordings in the VOD directory, sorted by filename
    pub async fn list_recordings(&self) -> VodResult<Vec<RecordingInfo>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut recordings = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            recordings.push(RecordingInfo {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        recordings.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(recordings)
    }

    /// Map a requested filename to an existing file inside the VOD directory
    pub async fn resolve_recording(&self, filename: &str) -> VodResult<PathBuf> {
        if !is_safe_filename(filename) {
            return Err(VodError::InvalidFilename {
                filename: filename.to_string(),
            });
        }

        let path = self.root.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            _ => Err(VodError::NotFound {
                filename: filename.to_string(),
            }),
        }
    }
}

impl VodPathGenerator for VodStorage {
    /// `<root>/<stream_id>-<ISO-8601 time with ':' and '.' as '-'>.mp4`
    fn generate_vod_path(&self, stream_id: &str) -> VodResult<PathBuf> {
        if !is_safe_filename(stream_id) {
            return Err(VodError::InvalidFilename {
                filename: stream_id.to_string(),
            });
        }
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        Ok(self.root.join(format!("{}-{}.mp4", stream_id, timestamp)))
    }
}

/// Single path component, no traversal
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).components().count() == 1
}
