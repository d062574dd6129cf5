//! Session Supervisor
//!
//! Owns one ingest session per stream id. A session runs a recording process
//! and a metrics-sampling process, feeds the sampler's progress output through
//! the parser and estimator into the [`MetricsStore`], and tears everything
//! down when the ingest ends or both processes are gone.
//!
//! Each session is driven by its own task that consumes the two processes'
//! event queues, so output for one process is handled strictly in arrival
//! order and estimator state is never shared between sessions.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{Instrument, Span, debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::{DuplicatePolicy, SupervisorConfig};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::models::{
    ExitStatusInfo, ProcessEvent, ProcessRole, ProgressSample, SessionSnapshot, SessionState,
    StreamPath,
};
use crate::services::command_profile::CommandProfiles;
use crate::services::metrics_estimator::MetricsEstimator;
use crate::services::metrics_store::MetricsStore;
use crate::services::process_runner::{ProcessControl, ProcessEvents, ProcessHandle, ProcessRunner};
use crate::services::progress_parser::ProgressParser;
use crate::services::vod_storage::VodPathGenerator;

/// Extra time on top of the grace period a shutdown waits for sessions
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

/// Stderr lines containing any of these are logged as warnings
const ERROR_MARKERS: &[&str] = &["error", "failed", "invalid", "could not", "unable to", "not found"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Stop,
}

struct SessionEntry {
    session_id: Uuid,
    state_tx: Arc<watch::Sender<SessionState>>,
    control_tx: mpsc::Sender<SessionCommand>,
    started_at: DateTime<Utc>,
    recording_pid: Option<u32>,
    metrics_pid: Option<u32>,
    output_path: Option<PathBuf>,
}

impl SessionEntry {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn snapshot(&self, stream_id: &str) -> SessionSnapshot {
        SessionSnapshot {
            stream_id: stream_id.to_string(),
            session_id: self.session_id,
            state: self.state(),
            started_at: self.started_at,
            recording_pid: self.recording_pid,
            metrics_pid: self.metrics_pid,
            output_path: self.output_path.clone(),
        }
    }
}

type SessionRegistry = Arc<RwLock<HashMap<String, SessionEntry>>>;

/// Manages recording/metrics process pairs with automatic lifecycle management
pub struct SessionSupervisor {
    sessions: SessionRegistry,
    runner: Arc<dyn ProcessRunner>,
    vod_paths: Arc<dyn VodPathGenerator>,
    metrics_store: MetricsStore,
    profiles: CommandProfiles,
    settings: SupervisorConfig,
    span: Span,
}

impl SessionSupervisor {
    /// `span` is the parent of every session's log context
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        vod_paths: Arc<dyn VodPathGenerator>,
        metrics_store: MetricsStore,
        profiles: CommandProfiles,
        settings: SupervisorConfig,
        span: Span,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            runner,
            vod_paths,
            metrics_store,
            profiles,
            settings,
            span,
        }
    }

    pub fn metrics_store(&self) -> &MetricsStore {
        &self.metrics_store
    }

    /// Start recording and sampling for a newly published stream.
    ///
    /// A stream whose previous session is still stopping waits for it to
    /// terminate first. A stream with a live session is rejected or
    /// superseded depending on the configured policy. Spawn failures are
    /// logged and leave the session degraded; when neither process starts the
    /// returned snapshot is already `Terminated`.
    ///
    /// Dropping the returned future never strands a registry entry: the
    /// session is registered, and its task spawned, without any await in
    /// between.
    pub async fn on_ingest_start(&self, path: &StreamPath) -> SupervisorResult<SessionSnapshot> {
        let stream_id = path.stream_id.as_str();
        let session_id = Uuid::new_v4();

        let mut sessions = loop {
            let sessions = self.sessions.write().await;
            let Some(existing) = sessions.get(stream_id) else {
                break sessions;
            };

            let state = existing.state();
            let mut state_rx = existing.state_tx.subscribe();
            if state.is_live() {
                match self.settings.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        warn!(
                            parent: &self.span,
                            "stream_id={} duplicate ingest rejected, existing session {} is {}",
                            stream_id, existing.session_id, state
                        );
                        return Err(SupervisorError::DuplicateSession {
                            stream_id: stream_id.to_string(),
                            state: state.to_string(),
                        });
                    }
                    DuplicatePolicy::Supersede => {
                        info!(
                            parent: &self.span,
                            "stream_id={} superseding session {}", stream_id, existing.session_id
                        );
                        request_stop(existing);
                    }
                }
            }
            drop(sessions);

            debug!(parent: &self.span, "stream_id={} waiting for previous session to terminate", stream_id);
            let _ = state_rx.wait_for(|s| *s == SessionState::Terminated).await;
        };

        let session_span = tracing::info_span!(
            parent: &self.span,
            "session",
            stream_id = %stream_id,
            session_id = %session_id
        );

        // Spawning is synchronous; the lock is held until the entry is in place
        let state_tx = Arc::new(watch::Sender::new(SessionState::Starting));
        let input_url = self.profiles.input_url(path);
        let (recording, output_path) = session_span.in_scope(|| self.spawn_recording(stream_id, &input_url));
        let metrics = session_span.in_scope(|| self.spawn_metrics(&input_url));

        if recording.is_none() && metrics.is_none() {
            drop(sessions);
            state_tx.send_replace(SessionState::Terminated);
            error!(parent: &session_span, "No process could be started, session terminated");
            self.metrics_store.reset_metrics(stream_id).await;
            return Ok(terminated_snapshot(stream_id, session_id));
        }

        let (control_tx, control_rx) = mpsc::channel(4);
        state_tx.send_replace(SessionState::Active);
        let entry = SessionEntry {
            session_id,
            state_tx: state_tx.clone(),
            control_tx,
            started_at: Utc::now(),
            recording_pid: recording.as_ref().and_then(|h| h.pid),
            metrics_pid: metrics.as_ref().and_then(|h| h.pid),
            output_path,
        };
        let snapshot = entry.snapshot(stream_id);
        sessions.insert(stream_id.to_string(), entry);
        drop(sessions);

        info!(
            parent: &session_span,
            "Session {} recording_pid={:?} metrics_pid={:?}",
            snapshot.state, snapshot.recording_pid, snapshot.metrics_pid
        );

        let run = SessionRun {
            stream_id: stream_id.to_string(),
            recording: recording.map(split_handle),
            metrics: metrics.map(split_handle),
            control_rx,
            state_tx: state_tx.clone(),
            metrics_store: self.metrics_store.clone(),
            parser: ProgressParser::new(self.settings.buffer_partial_lines),
            estimator: MetricsEstimator::new(
                now_ms(),
                self.settings.warmup_samples,
                self.settings.bandwidth_factor,
            ),
            termination_grace: self.settings.termination_grace,
        };
        let cleanup = SessionCleanup {
            sessions: self.sessions.clone(),
            metrics_store: self.metrics_store.clone(),
            stream_id: stream_id.to_string(),
            session_id,
            state_tx,
        };

        let task = tokio::spawn(
            async move {
                run.run().await;
            }
            .instrument(session_span.clone()),
        );

        // A panicking session must not leave a stuck registry entry behind
        tokio::spawn(
            async move {
                if let Err(e) = task.await {
                    error!("Session task failed: {}", e);
                }
                cleanup.finish().await;
            }
            .instrument(session_span),
        );

        Ok(snapshot)
    }

    /// Stop the stream's session. Unknown streams and sessions that are
    /// already stopping are ignored. Returns whether a stop was initiated.
    pub async fn on_ingest_end(&self, stream_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        let Some(entry) = sessions.get(stream_id) else {
            debug!(parent: &self.span, "stream_id={} ingest ended without a session", stream_id);
            return false;
        };

        if !entry.state().is_live() {
            debug!(parent: &self.span, "stream_id={} session already {}", stream_id, entry.state());
            return false;
        }

        info!(parent: &self.span, "stream_id={} ingest ended, stopping session {}", stream_id, entry.session_id);
        request_stop(entry)
    }

    pub async fn session_state(&self, stream_id: &str) -> Option<SessionState> {
        self.sessions.read().await.get(stream_id).map(|entry| entry.state())
    }

    pub async fn snapshot(&self, stream_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(stream_id)
            .map(|entry| entry.snapshot(stream_id))
    }

    /// All registered sessions, sorted by stream id
    pub async fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(stream_id, entry)| entry.snapshot(stream_id))
            .collect();
        snapshots.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        snapshots
    }

    /// Resolve once the stream has no registered session
    pub async fn wait_for_termination(&self, stream_id: &str) {
        let state_rx = self
            .sessions
            .read()
            .await
            .get(stream_id)
            .map(|entry| entry.state_tx.subscribe());

        if let Some(mut state_rx) = state_rx {
            let _ = state_rx.wait_for(|s| *s == SessionState::Terminated).await;
        }
    }

    /// Stop every session and wait (bounded) for them to terminate
    pub async fn shutdown(&self) {
        let stream_ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        if stream_ids.is_empty() {
            return;
        }

        info!(parent: &self.span, "Stopping {} active session(s)", stream_ids.len());
        for stream_id in &stream_ids {
            self.on_ingest_end(stream_id).await;
        }

        let deadline = self.settings.termination_grace + SHUTDOWN_MARGIN;
        let wait_all = futures::future::join_all(stream_ids.iter().map(|id| self.wait_for_termination(id)));
        if tokio::time::timeout(deadline, wait_all).await.is_err() {
            warn!(parent: &self.span, "Sessions still running after {:?}", deadline);
        }
    }

    fn spawn_recording(&self, stream_id: &str, input_url: &str) -> (Option<ProcessHandle>, Option<PathBuf>) {
        let output_path = match self.vod_paths.generate_vod_path(stream_id) {
            Ok(path) => path,
            Err(e) => {
                error!("Failed to choose recording path: {}", e);
                return (None, None);
            }
        };

        let spec = self.profiles.recording(input_url, &output_path);
        match self.runner.spawn(&spec) {
            Ok(handle) => {
                info!("Recording to {} with PID {:?}", output_path.display(), handle.pid);
                (Some(handle), Some(output_path))
            }
            Err(e) => {
                error!("{}", e);
                (None, None)
            }
        }
    }

    fn spawn_metrics(&self, input_url: &str) -> Option<ProcessHandle> {
        match self.runner.spawn(&self.profiles.metrics(input_url)) {
            Ok(handle) => {
                info!("Sampling metrics with PID {:?}", handle.pid);
                Some(handle)
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

/// Mark the entry Stopping and tell its task; false when it was not live
fn request_stop(entry: &SessionEntry) -> bool {
    let changed = entry.state_tx.send_if_modified(|state| {
        if state.is_live() {
            *state = SessionState::Stopping;
            true
        } else {
            false
        }
    });
    // A full queue already holds a Stop
    if changed
        && matches!(
            entry.control_tx.try_send(SessionCommand::Stop),
            Err(mpsc::error::TrySendError::Closed(_))
        )
    {
        debug!("Session {} already finished", entry.session_id);
    }
    changed
}

fn terminated_snapshot(stream_id: &str, session_id: Uuid) -> SessionSnapshot {
    SessionSnapshot {
        stream_id: stream_id.to_string(),
        session_id,
        state: SessionState::Terminated,
        started_at: Utc::now(),
        recording_pid: None,
        metrics_pid: None,
        output_path: None,
    }
}

fn split_handle(handle: ProcessHandle) -> (ProcessEvents, ProcessControl) {
    (handle.events, handle.control)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Final bookkeeping for a session; safe to run more than once
struct SessionCleanup {
    sessions: SessionRegistry,
    metrics_store: MetricsStore,
    stream_id: String,
    session_id: Uuid,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl SessionCleanup {
    async fn finish(&self) {
        if *self.state_tx.borrow() == SessionState::Terminated {
            return;
        }

        // Reset before the entry disappears so a successor starts from absent
        self.metrics_store.reset_metrics(&self.stream_id).await;

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&self.stream_id)
            .is_some_and(|entry| entry.session_id == self.session_id)
        {
            sessions.remove(&self.stream_id);
        }
        self.state_tx.send_replace(SessionState::Terminated);
        drop(sessions);

        info!("Session terminated");
    }
}

/// State owned by one session's event loop
struct SessionRun {
    stream_id: String,
    recording: Option<(ProcessEvents, ProcessControl)>,
    metrics: Option<(ProcessEvents, ProcessControl)>,
    control_rx: mpsc::Receiver<SessionCommand>,
    state_tx: Arc<watch::Sender<SessionState>>,
    metrics_store: MetricsStore,
    parser: ProgressParser,
    estimator: MetricsEstimator,
    termination_grace: Duration,
}

impl SessionRun {
    async fn run(mut self) {
        let (mut recording_events, recording_control) = unzip(self.recording.take());
        let (mut metrics_events, metrics_control) = unzip(self.metrics.take());
        let mut stopping = false;

        while recording_events.is_some() || metrics_events.is_some() {
            tokio::select! {
                event = next_event(&mut recording_events), if recording_events.is_some() => {
                    let done = match event {
                        Some(event) => self.handle_recording_event(event).await,
                        None => true,
                    };
                    if done {
                        recording_events = None;
                    }
                }
                event = next_event(&mut metrics_events), if metrics_events.is_some() => {
                    let done = match event {
                        Some(event) => self.handle_metrics_event(event).await,
                        None => true,
                    };
                    if done {
                        metrics_events = None;
                    }
                }
                command = self.control_rx.recv(), if !stopping => {
                    // A closed control channel means the supervisor is gone
                    if let Some(command) = command {
                        debug!("Received {:?}", command);
                    }
                    stopping = true;
                    self.state_tx.send_if_modified(|state| {
                        if state.is_live() {
                            *state = SessionState::Stopping;
                            true
                        } else {
                            false
                        }
                    });
                    debug!("Terminating processes with {:?} grace", self.termination_grace);
                    if recording_events.is_some() {
                        if let Some(control) = &recording_control {
                            control.terminate(self.termination_grace).await;
                        }
                    }
                    if metrics_events.is_some() {
                        if let Some(control) = &metrics_control {
                            control.terminate(self.termination_grace).await;
                        }
                    }
                }
            }
        }

        debug!("Both processes exited");
    }

    /// Returns true once the recording process is finished
    async fn handle_recording_event(&mut self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Stdout(chunk) => {
                trace!("recording stdout {} bytes", chunk.len());
                false
            }
            ProcessEvent::Stderr(chunk) => {
                log_process_output(ProcessRole::Recording, &chunk);
                false
            }
            ProcessEvent::Errored(message) => {
                error!("{}", SupervisorError::runtime(ProcessRole::Recording, &self.stream_id, message));
                false
            }
            ProcessEvent::Exited(status) => {
                self.log_exit(ProcessRole::Recording, status);
                // Metrics are tied to the recording, whatever the exit code
                self.metrics_store.reset_metrics(&self.stream_id).await;
                true
            }
        }
    }

    /// Returns true once the metrics process is finished
    async fn handle_metrics_event(&mut self, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Stdout(chunk) => {
                let sample = ProgressSample {
                    total_size: self.parser.total_size(&chunk),
                    received_at_ms: now_ms(),
                };
                if let Some(update) = self.estimator.observe(sample) {
                    self.metrics_store.update_metrics(&self.stream_id, update).await;
                }
                false
            }
            ProcessEvent::Stderr(chunk) => {
                log_process_output(ProcessRole::Metrics, &chunk);
                false
            }
            ProcessEvent::Errored(message) => {
                error!("{}", SupervisorError::runtime(ProcessRole::Metrics, &self.stream_id, message));
                false
            }
            ProcessEvent::Exited(status) => {
                self.log_exit(ProcessRole::Metrics, status);
                true
            }
        }
    }

    fn log_exit(&self, role: ProcessRole, status: ExitStatusInfo) {
        let stopping = *self.state_tx.borrow() == SessionState::Stopping;
        if status.success() {
            info!("{} process exited normally", role);
        } else if stopping {
            info!("{} process stopped ({})", role, status);
        } else {
            let err = SupervisorError::NonZeroExit {
                role,
                stream_id: self.stream_id.clone(),
                status: status.to_string(),
            };
            error!("{}", err);
        }
    }
}

fn unzip(
    parts: Option<(ProcessEvents, ProcessControl)>,
) -> (Option<ProcessEvents>, Option<ProcessControl>) {
    match parts {
        Some((events, control)) => (Some(events), Some(control)),
        None => (None, None),
    }
}

async fn next_event(events: &mut Option<ProcessEvents>) -> Option<ProcessEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Forward process stderr to the log, line by line
fn log_process_output(role: ProcessRole, chunk: &[u8]) {
    let text = String::from_utf8_lossy(chunk);
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let lower = line.to_lowercase();
        if ERROR_MARKERS.iter().any(|marker| lower.contains(marker)) {
            warn!(role = %role, "ffmpeg: {}", line);
        } else if role == ProcessRole::Recording {
            debug!(role = %role, "ffmpeg: {}", line);
        } else {
            trace!(role = %role, "ffmpeg: {}", line);
        }
    }
}
