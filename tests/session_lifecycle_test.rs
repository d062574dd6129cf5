mod common;

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing_test::traced_test;

use common::{fast_settings, harness};
use ingest_supervisor::{
    config::{DuplicatePolicy, SupervisorConfig},
    errors::SupervisorError,
    models::{ProcessRole, SessionState, StreamPath},
    services::MetricsEvent,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

fn path(stream_id: &str) -> StreamPath {
    StreamPath::live(stream_id).unwrap()
}

fn no_warmup() -> SupervisorConfig {
    SupervisorConfig {
        warmup_samples: 1,
        ..fast_settings()
    }
}

async fn next_event(events: &mut broadcast::Receiver<MetricsEvent>) -> MetricsEvent {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for metrics event")
        .expect("metrics channel closed")
}

#[tokio::test]
async fn test_start_spawns_recording_and_metrics() {
    let h = harness(fast_settings());

    let snapshot = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    assert_eq!(snapshot.state, SessionState::Active);
    assert!(snapshot.recording_pid.is_some());
    assert!(snapshot.metrics_pid.is_some());
    assert_eq!(h.runner.spawn_count(), 2);

    let output = snapshot.output_path.expect("recording path");
    assert!(output.starts_with(h.vod_dir.path()));
    let filename = output.file_name().unwrap().to_string_lossy().into_owned();
    assert!(filename.starts_with("stream1-"));
    assert!(filename.ends_with(".mp4"));

    let recording = h.runner.latest(ProcessRole::Recording);
    assert!(recording.spec.args.contains(&"rtmp://127.0.0.1/live/stream1".to_string()));
    assert_eq!(recording.spec.args.last().map(String::as_str), Some(output.to_str().unwrap()));

    let metrics = h.runner.latest(ProcessRole::Metrics);
    assert!(metrics.spec.args.contains(&"pipe:1".to_string()));

    assert_eq!(h.supervisor.session_state("stream1").await, Some(SessionState::Active));
}

#[tokio::test]
async fn test_warmup_suppresses_first_samples() {
    let h = harness(fast_settings());
    let mut events = h.metrics_store.subscribe();
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();
    let metrics = h.runner.latest(ProcessRole::Metrics);

    for size in [4096, 8192] {
        sleep(Duration::from_millis(20)).await;
        metrics.stdout(&format!("frame=1\ntotal_size={}\nprogress=continue\n", size)).await;
    }
    sleep(Duration::from_millis(100)).await;

    assert!(events.try_recv().is_err());
    assert!(h.metrics_store.get_metrics("stream1").await.is_none());

    metrics.stdout("total_size=12288\nprogress=continue\n").await;

    match next_event(&mut events).await {
        MetricsEvent::Updated { stream_id, metrics } => {
            assert_eq!(stream_id, "stream1");
            assert!(metrics.bitrate_kbps > 0);
            let expected = (metrics.bitrate_kbps as f64 * 1.2 * 100.0).round() / 100.0;
            assert!((metrics.bandwidth_kbps - expected).abs() < 1e-9);
            assert!(metrics.latency_ms >= 90);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_recording_exit_resets_then_metrics_repopulate() {
    let h = harness(no_warmup());
    let mut events = h.metrics_store.subscribe();
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();
    let metrics = h.runner.latest(ProcessRole::Metrics);
    let recording = h.runner.latest(ProcessRole::Recording);

    sleep(Duration::from_millis(10)).await;
    metrics.stdout("total_size=1024\n").await;
    let first = match next_event(&mut events).await {
        MetricsEvent::Updated { metrics, .. } => metrics,
        other => panic!("unexpected event {:?}", other),
    };

    recording.exit(1).await;
    assert_eq!(
        next_event(&mut events).await,
        MetricsEvent::Reset {
            stream_id: "stream1".to_string()
        }
    );
    assert!(h.metrics_store.get_metrics("stream1").await.is_none());

    // The sampler is still attached to the ingest
    assert_eq!(h.supervisor.session_state("stream1").await, Some(SessionState::Active));

    sleep(Duration::from_millis(10)).await;
    metrics.stdout("total_size=4096\n").await;
    match next_event(&mut events).await {
        MetricsEvent::Updated { metrics, .. } => {
            assert!(metrics.last_updated > first.last_updated);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(h.metrics_store.get_metrics("stream1").await.is_some());
}

#[tokio::test]
#[traced_test]
async fn test_metrics_spawn_failure_keeps_recording() {
    let h = harness(no_warmup());
    h.runner.fail_spawn(ProcessRole::Metrics);

    let snapshot = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    assert_eq!(snapshot.state, SessionState::Active);
    assert!(snapshot.recording_pid.is_some());
    assert!(snapshot.metrics_pid.is_none());
    assert_eq!(h.runner.spawn_count(), 1);
    assert!(logs_contain("Failed to spawn metrics process"));

    sleep(Duration::from_millis(50)).await;
    assert!(h.metrics_store.get_metrics("stream1").await.is_none());

    // Ending still stops the recording that did start
    assert!(h.supervisor.on_ingest_end("stream1").await);
    h.supervisor.wait_for_termination("stream1").await;
    assert_eq!(h.runner.terminations(), 1);
}

#[tokio::test]
async fn test_both_spawns_failing_terminates_session() {
    let h = harness(fast_settings());
    h.runner.fail_spawn(ProcessRole::Recording);
    h.runner.fail_spawn(ProcessRole::Metrics);

    let snapshot = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    assert_eq!(snapshot.state, SessionState::Terminated);
    assert_eq!(h.supervisor.session_state("stream1").await, None);
    assert!(h.supervisor.sessions().await.is_empty());
}

#[tokio::test]
async fn test_ingest_end_is_idempotent() {
    let h = harness(fast_settings());
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    assert!(h.supervisor.on_ingest_end("stream1").await);
    assert!(!h.supervisor.on_ingest_end("stream1").await);
    assert!(!h.supervisor.on_ingest_end("unknown").await);

    h.supervisor.wait_for_termination("stream1").await;

    assert_eq!(h.runner.terminations(), 2);
    assert_eq!(h.supervisor.session_state("stream1").await, None);
    assert!(!h.supervisor.on_ingest_end("stream1").await);
    assert_eq!(h.runner.terminations(), 2);
}

#[tokio::test]
async fn test_termination_clears_metrics() {
    let h = harness(no_warmup());
    let mut events = h.metrics_store.subscribe();
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    sleep(Duration::from_millis(10)).await;
    h.runner.latest(ProcessRole::Metrics).stdout("total_size=2048\n").await;
    next_event(&mut events).await;

    h.supervisor.on_ingest_end("stream1").await;
    h.supervisor.wait_for_termination("stream1").await;

    assert!(h.metrics_store.get_metrics("stream1").await.is_none());
}

#[tokio::test]
async fn test_duplicate_start_is_rejected_by_default() {
    let h = harness(fast_settings());
    let first = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    let err = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap_err();

    assert!(matches!(err, SupervisorError::DuplicateSession { ref stream_id, .. } if stream_id == "stream1"));
    assert_eq!(h.runner.spawn_count(), 2);
    let current = h.supervisor.snapshot("stream1").await.unwrap();
    assert_eq!(current.session_id, first.session_id);
}

#[tokio::test]
async fn test_duplicate_start_supersedes_when_configured() {
    let h = harness(SupervisorConfig {
        duplicate_policy: DuplicatePolicy::Supersede,
        ..fast_settings()
    });
    let first = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    let second = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.state, SessionState::Active);
    assert_eq!(h.runner.terminations(), 2);
    assert_eq!(h.runner.spawn_count(), 4);
    assert_eq!(h.supervisor.sessions().await.len(), 1);
}

#[tokio::test]
async fn test_restart_waits_for_stopping_session() {
    let h = harness(fast_settings());
    let first = h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();
    h.supervisor.on_ingest_end("stream1").await;

    let second = timeout(EVENT_TIMEOUT, h.supervisor.on_ingest_start(&path("stream1")))
        .await
        .expect("restart blocked")
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.state, SessionState::Active);
    assert_eq!(h.runner.terminations(), 2);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let h = harness(no_warmup());
    let mut events = h.metrics_store.subscribe();
    h.supervisor.on_ingest_start(&path("alpha")).await.unwrap();
    let alpha = h.runner.latest(ProcessRole::Metrics);
    h.supervisor.on_ingest_start(&path("beta")).await.unwrap();
    let beta = h.runner.latest(ProcessRole::Metrics);

    sleep(Duration::from_millis(10)).await;
    alpha.stdout("total_size=8192\n").await;
    assert_eq!(next_event(&mut events).await.stream_id(), "alpha");
    assert!(h.metrics_store.get_metrics("beta").await.is_none());

    h.supervisor.on_ingest_end("alpha").await;
    h.supervisor.wait_for_termination("alpha").await;

    beta.stdout("total_size=1024\n").await;
    loop {
        let event = next_event(&mut events).await;
        if event.stream_id() == "beta" {
            break;
        }
    }
    assert!(h.metrics_store.get_metrics("alpha").await.is_none());
    assert!(h.metrics_store.get_metrics("beta").await.is_some());
    assert_eq!(h.supervisor.session_state("beta").await, Some(SessionState::Active));
}

#[tokio::test]
async fn test_session_ends_when_both_processes_exit() {
    let h = harness(fast_settings());
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();

    h.runner.latest(ProcessRole::Recording).exit(0).await;
    h.runner.latest(ProcessRole::Metrics).exit(1).await;
    h.supervisor.wait_for_termination("stream1").await;

    assert_eq!(h.supervisor.session_state("stream1").await, None);
    assert_eq!(h.runner.terminations(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_every_session() {
    let h = harness(fast_settings());
    for id in ["a", "b", "c"] {
        h.supervisor.on_ingest_start(&path(id)).await.unwrap();
    }
    assert_eq!(h.supervisor.sessions().await.len(), 3);

    h.supervisor.shutdown().await;

    assert!(h.supervisor.sessions().await.is_empty());
    assert_eq!(h.runner.terminations(), 6);
}

#[tokio::test]
async fn test_abandoned_start_leaves_stream_restartable() {
    let h = harness(fast_settings());
    let stream = path("stream1");

    for polls in 0..3 {
        let mut start = Box::pin(h.supervisor.on_ingest_start(&stream));
        for _ in 0..polls {
            if futures::poll!(start.as_mut()).is_ready() {
                break;
            }
        }
        drop(start);

        h.supervisor.on_ingest_end("stream1").await;
        timeout(EVENT_TIMEOUT, h.supervisor.wait_for_termination("stream1"))
            .await
            .expect("abandoned session never terminated");
    }

    let snapshot = timeout(EVENT_TIMEOUT, h.supervisor.on_ingest_start(&stream))
        .await
        .expect("restart blocked")
        .unwrap();
    assert_eq!(snapshot.state, SessionState::Active);
    assert_eq!(h.supervisor.sessions().await.len(), 1);
}

#[tokio::test]
async fn test_abandoned_start_behind_stopping_session() {
    let h = harness(fast_settings());
    h.supervisor.on_ingest_start(&path("stream1")).await.unwrap();
    h.supervisor.on_ingest_end("stream1").await;

    // Give up while still waiting on the previous session
    let waiting = timeout(Duration::ZERO, h.supervisor.on_ingest_start(&path("stream1"))).await;
    assert!(waiting.is_err());
    assert_eq!(h.supervisor.session_state("stream1").await, Some(SessionState::Stopping));

    h.supervisor.wait_for_termination("stream1").await;
    let snapshot = timeout(EVENT_TIMEOUT, h.supervisor.on_ingest_start(&path("stream1")))
        .await
        .expect("restart blocked")
        .unwrap();
    assert_eq!(snapshot.state, SessionState::Active);
}
