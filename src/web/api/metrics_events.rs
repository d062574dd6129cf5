//! SSE stream of metric updates and resets

use axum::{
    extract::{Query, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::Deserialize;
use std::time::Duration;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{debug, error, warn};

use crate::services::MetricsEvent;
use crate::web::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsEventQuery {
    /// Only forward events for this stream
    pub stream_id: Option<String>,
}

impl MetricsEventQuery {
    fn matches(&self, event: &MetricsEvent) -> bool {
        self.stream_id
            .as_deref()
            .is_none_or(|stream_id| stream_id == event.stream_id())
    }
}

fn to_sse_event(event: &MetricsEvent) -> Option<Event> {
    let name = match event {
        MetricsEvent::Updated { .. } => "metrics",
        MetricsEvent::Reset { .. } => "reset",
    };
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            error!("Failed to serialize metrics event: {}", e);
            None
        }
    }
}

/// Current entries first, then every write to the metrics store
pub async fn metrics_events_stream(
    Query(query): Query<MetricsEventQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!("Starting metrics SSE stream with filter {:?}", query.stream_id);

    // Subscribe before the snapshot so no write falls between the two
    let receiver = state.metrics_store.subscribe();
    let snapshot = state.metrics_store.snapshot().await;

    let stream = async_stream::stream! {
        yield Ok::<Event, axum::Error>(Event::default().event("heartbeat").data("connected"));

        for (stream_id, metrics) in snapshot {
            let event = MetricsEvent::Updated { stream_id, metrics };
            if query.matches(&event) {
                if let Some(sse) = to_sse_event(&event) {
                    yield Ok(sse);
                }
            }
        }

        let mut updates = BroadcastStream::new(receiver);
        while let Some(item) = updates.next().await {
            match item {
                Ok(event) => {
                    if !query.matches(&event) {
                        continue;
                    }
                    if let Some(sse) = to_sse_event(&event) {
                        yield Ok(sse);
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Metrics SSE client lagged, skipped {} events", skipped);
                }
                #[allow(unreachable_patterns)]
                Err(e) => {
                    warn!("Metrics SSE receive error: {}", e);
                }
            }
        }
        debug!("Metrics SSE stream closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
