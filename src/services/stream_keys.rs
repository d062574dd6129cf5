//! Stream key registry
//!
//! Hands out random publish keys together with the RTMP address a
//! broadcaster pushes to and the HLS address viewers play from. Keys live in
//! memory only; a restart invalidates them.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::StreamingConfig;
use crate::errors::{AppError, AppResult, WebError};
use crate::models::{DEFAULT_APP, StreamKey, StreamSettings, StreamSettingsUpdate, is_valid_resolution};

const RESOURCE: &str = "stream key";

#[derive(Clone)]
pub struct StreamKeyRegistry {
    keys: Arc<RwLock<HashMap<String, StreamKey>>>,
    config: StreamingConfig,
}

impl StreamKeyRegistry {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn generate_stream_key() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn stream_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.config.rtmp_base_url.trim_end_matches('/'), DEFAULT_APP, key)
    }

    pub fn hls_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}/index.m3u8",
            self.config.hls_base_url.trim_end_matches('/'),
            DEFAULT_APP,
            key
        )
    }

    /// Issue a fresh key with default settings
    pub async fn create(&self) -> StreamKey {
        let stream_key = self.issue(StreamSettings::default());
        self.keys
            .write()
            .await
            .insert(stream_key.stream_key.clone(), stream_key.clone());
        info!("Issued stream key {}", stream_key.stream_key);
        stream_key
    }

    pub async fn get(&self, key: &str) -> AppResult<StreamKey> {
        self.keys
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::not_found(RESOURCE, key))
    }

    /// Every issued key, oldest first
    pub async fn list(&self) -> Vec<StreamKey> {
        let mut keys: Vec<_> = self.keys.read().await.values().cloned().collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.stream_key.cmp(&b.stream_key)));
        keys
    }

    /// Revoke a key; returns what was removed
    pub async fn delete(&self, key: &str) -> AppResult<StreamKey> {
        let removed = self
            .keys
            .write()
            .await
            .remove(key)
            .ok_or_else(|| AppError::not_found(RESOURCE, key))?;
        info!("Revoked stream key {}", key);
        Ok(removed)
    }

    /// Replace a key with a new one that keeps its settings
    pub async fn regenerate(&self, key: &str) -> AppResult<StreamKey> {
        let mut keys = self.keys.write().await;
        let old = keys.remove(key).ok_or_else(|| AppError::not_found(RESOURCE, key))?;
        let replacement = self.issue(old.settings);
        keys.insert(replacement.stream_key.clone(), replacement.clone());
        drop(keys);

        info!("Replaced stream key {} with {}", key, replacement.stream_key);
        Ok(replacement)
    }

    pub async fn update_settings(&self, key: &str, update: StreamSettingsUpdate) -> AppResult<StreamKey> {
        validate_update(&update)?;

        let mut keys = self.keys.write().await;
        let entry = keys.get_mut(key).ok_or_else(|| AppError::not_found(RESOURCE, key))?;
        update.apply_to(&mut entry.settings);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    fn issue(&self, settings: StreamSettings) -> StreamKey {
        let key = Self::generate_stream_key();
        let now = Utc::now();
        StreamKey {
            stream_url: self.stream_url(&key),
            hls_url: self.hls_url(&key),
            stream_key: key,
            settings,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_update(update: &StreamSettingsUpdate) -> AppResult<()> {
    if update.quality.as_deref().is_some_and(|q| q.trim().is_empty()) {
        return Err(WebError::invalid_request("quality", "must not be empty").into());
    }
    if update.max_bitrate == Some(0) {
        return Err(WebError::invalid_request("max_bitrate", "must be positive").into());
    }
    if let Some(resolution) = &update.resolution {
        if !is_valid_resolution(resolution) {
            return Err(WebError::invalid_request("resolution", "expected <width>x<height>").into());
        }
    }
    Ok(())
}
