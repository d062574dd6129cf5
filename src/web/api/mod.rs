//! JSON and SSE endpoints under `/api/v1`

pub mod ingest;
pub mod metrics_events;
pub mod stream_keys;
pub mod streams;
pub mod vod;
