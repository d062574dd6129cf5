use serde::{Deserialize, Serialize};

use crate::errors::SupervisorError;

pub const DEFAULT_APP: &str = "live";

/// A publish path as reported by the media server: `/<app>/<stream_id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPath {
    pub app: String,
    pub stream_id: String,
}

impl StreamPath {
    pub fn parse(path: &str) -> Result<Self, SupervisorError> {
        let invalid = || SupervisorError::InvalidStreamPath {
            path: path.to_string(),
        };

        let mut segments = path.trim_matches('/').split('/');
        let app = segments.next().filter(|s| is_valid_segment(s)).ok_or_else(invalid)?;
        let stream_id = segments.next().filter(|s| is_valid_segment(s)).ok_or_else(invalid)?;
        if segments.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            app: app.to_string(),
            stream_id: stream_id.to_string(),
        })
    }

    /// Stream published under the default `live` application
    pub fn live(stream_id: &str) -> Result<Self, SupervisorError> {
        if !is_valid_segment(stream_id) {
            return Err(SupervisorError::InvalidStreamPath {
                path: format!("/{}/{}", DEFAULT_APP, stream_id),
            });
        }
        Ok(Self {
            app: DEFAULT_APP.to_string(),
            stream_id: stream_id.to_string(),
        })
    }
}

impl std::fmt::Display for StreamPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.app, self.stream_id)
    }
}

/// Stream identifiers end up in file names and URLs
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
