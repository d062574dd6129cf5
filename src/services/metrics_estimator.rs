//! Converts `total_size` readings into bitrate, bandwidth and latency samples.
//!
//! Bitrate uses binary kilobits: bytes × 8 / 1024 per second. The first
//! `warmup_samples - 1` measured intervals are swallowed because FFmpeg's
//! startup burst inflates them; the counters still advance so the first
//! published sample reflects steady state.

use crate::models::{MetricsUpdate, ProgressSample};

/// Per-session estimator state. Never shared between sessions.
#[derive(Debug, Clone)]
pub struct MetricsEstimator {
    warmup_samples: u32,
    bandwidth_factor: f64,
    last_total_size: u64,
    last_sample_ms: i64,
    last_arrival_ms: i64,
    sample_count: u32,
}

impl MetricsEstimator {
    /// `started_at_ms` seeds both the interval and the latency clocks
    pub fn new(started_at_ms: i64, warmup_samples: u32, bandwidth_factor: f64) -> Self {
        Self {
            warmup_samples,
            bandwidth_factor,
            last_total_size: 0,
            last_sample_ms: started_at_ms,
            last_arrival_ms: started_at_ms,
            sample_count: 0,
        }
    }

    /// Fold one chunk's reading into the state, returning an update once warmed up
    pub fn observe(&mut self, sample: ProgressSample) -> Option<MetricsUpdate> {
        let now = sample.received_at_ms;
        let total_size = sample.total_size.unwrap_or(self.last_total_size);
        let elapsed_ms = now - self.last_sample_ms;

        if elapsed_ms <= 0 {
            // Keep last_total_size so the next interval absorbs these bytes
            self.last_sample_ms = now;
            return None;
        }

        // A counter that went backwards (process restart) reads as zero throughput
        let delta_bytes = total_size.saturating_sub(self.last_total_size);
        let duration_sec = elapsed_ms as f64 / 1000.0;
        let bitrate_kbps = (delta_bytes as f64 * 8.0 / 1024.0 / duration_sec).round() as u64;
        let latency_ms = (now - self.last_arrival_ms).max(0) as u64;
        let bandwidth_kbps = round_to_hundredths(bitrate_kbps as f64 * self.bandwidth_factor);

        self.last_arrival_ms = now;
        self.last_total_size = total_size;
        self.last_sample_ms = now;
        self.sample_count = self.sample_count.saturating_add(1);

        if self.sample_count < self.warmup_samples {
            return None;
        }

        Some(MetricsUpdate {
            bitrate_kbps: Some(bitrate_kbps),
            bandwidth_kbps: Some(bandwidth_kbps),
            latency_ms: Some(latency_ms),
        })
    }

    /// Measured intervals so far, including suppressed ones
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn last_total_size(&self) -> u64 {
        self.last_total_size
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
