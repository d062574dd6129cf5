use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known health snapshot for one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsState {
    /// Instantaneous bitrate estimate in kilobits (1024 bits) per second
    pub bitrate_kbps: u64,
    /// Bitrate scaled by the bandwidth factor, two decimals
    pub bandwidth_kbps: f64,
    /// Time between the last two measured samples
    pub latency_ms: u64,
    pub last_updated: DateTime<Utc>,
}

impl MetricsState {
    /// Zeroed record used as the merge base for a stream's first update
    pub fn zeroed(now: DateTime<Utc>) -> Self {
        Self {
            bitrate_kbps: 0,
            bandwidth_kbps: 0.0,
            latency_ms: 0,
            last_updated: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.bitrate_kbps > 0
    }
}

/// Partial update merged field-by-field into a `MetricsState`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl MetricsUpdate {
    /// Produce the merged record; fields absent from the update keep `base` values
    pub fn merge_into(&self, base: &MetricsState, now: DateTime<Utc>) -> MetricsState {
        MetricsState {
            bitrate_kbps: self.bitrate_kbps.unwrap_or(base.bitrate_kbps),
            bandwidth_kbps: self.bandwidth_kbps.unwrap_or(base.bandwidth_kbps),
            latency_ms: self.latency_ms.unwrap_or(base.latency_ms),
            last_updated: now,
        }
    }
}

/// One parsed progress reading, consumed immediately by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Last `total_size` seen in the chunk, if any
    pub total_size: Option<u64>,
    /// Wall-clock arrival time in milliseconds
    pub received_at_ms: i64,
}
