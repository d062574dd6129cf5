//! Shared fixtures: an in-memory process runner and supervisor wiring

#![allow(dead_code)]

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use ingest_supervisor::{
    config::{Config, SupervisorConfig},
    errors::{SupervisorError, SupervisorResult},
    models::{ExitStatusInfo, ProcessEvent, ProcessRole},
    services::{
        CommandProfiles, CommandSpec, MetricsStore, ProcessCommand, ProcessControl, ProcessEvents,
        ProcessHandle, ProcessRunner, SessionSupervisor, StreamKeyRegistry, VodStorage,
    },
};

/// One process handed out by [`FakeProcessRunner`]
pub struct FakeProcess {
    pub spec: CommandSpec,
    pub pid: u32,
    events_tx: mpsc::Sender<ProcessEvent>,
}

impl FakeProcess {
    pub async fn emit(&self, event: ProcessEvent) {
        self.events_tx.send(event).await.expect("session dropped its events");
    }

    pub async fn stdout(&self, text: &str) {
        self.emit(ProcessEvent::Stdout(Bytes::from(text.to_string()))).await;
    }

    pub async fn exit(&self, code: i32) {
        self.emit(ProcessEvent::Exited(ExitStatusInfo::from_code(code))).await;
    }
}

/// Runner that never touches the OS. Terminate requests are counted and
/// answered with a SIGTERM exit.
#[derive(Default)]
pub struct FakeProcessRunner {
    failing: Mutex<HashSet<ProcessRole>>,
    spawned: Mutex<Vec<Arc<FakeProcess>>>,
    terminations: Arc<AtomicUsize>,
    next_pid: AtomicU32,
}

impl FakeProcessRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        })
    }

    pub fn fail_spawn(&self, role: ProcessRole) {
        self.failing.lock().unwrap().insert(role);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.spawned.lock().unwrap().iter().map(|p| p.spec.clone()).collect()
    }

    /// Most recently spawned process for the role
    pub fn latest(&self, role: ProcessRole) -> Arc<FakeProcess> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.spec.role == role)
            .cloned()
            .expect("no process spawned for role")
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, spec: &CommandSpec) -> SupervisorResult<ProcessHandle> {
        if self.failing.lock().unwrap().contains(&spec.role) {
            return Err(SupervisorError::spawn(
                spec.role,
                spec.program.clone(),
                "No such file or directory (os error 2)",
            ));
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        let (control_tx, mut control_rx) = mpsc::channel(4);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);

        let exit_tx = events_tx.clone();
        let terminations = self.terminations.clone();
        tokio::spawn(async move {
            if let Some(ProcessCommand::Terminate { .. }) = control_rx.recv().await {
                terminations.fetch_add(1, Ordering::SeqCst);
                let _ = exit_tx
                    .send(ProcessEvent::Exited(ExitStatusInfo::from_signal(15)))
                    .await;
            }
        });

        self.spawned.lock().unwrap().push(Arc::new(FakeProcess {
            spec: spec.clone(),
            pid,
            events_tx,
        }));

        Ok(ProcessHandle {
            role: spec.role,
            pid: Some(pid),
            events: ProcessEvents::new(events_rx),
            control: ProcessControl::new(control_tx),
        })
    }
}

pub struct Harness {
    pub supervisor: Arc<SessionSupervisor>,
    pub runner: Arc<FakeProcessRunner>,
    pub metrics_store: MetricsStore,
    pub vod_storage: VodStorage,
    pub stream_keys: StreamKeyRegistry,
    pub config: Config,
    pub vod_dir: TempDir,
}

pub fn fast_settings() -> SupervisorConfig {
    SupervisorConfig {
        termination_grace: Duration::from_millis(200),
        ..SupervisorConfig::default()
    }
}

pub fn harness(settings: SupervisorConfig) -> Harness {
    let vod_dir = TempDir::new().unwrap();
    let runner = FakeProcessRunner::new();
    let metrics_store = MetricsStore::new();
    let vod_storage = VodStorage::new(vod_dir.path()).unwrap();

    let mut config = Config::default();
    config.supervisor = settings.clone();
    config.storage.vod_path = vod_dir.path().to_path_buf();
    config.storage.media_path = vod_dir.path().join("media");

    let supervisor = Arc::new(SessionSupervisor::new(
        runner.clone(),
        Arc::new(vod_storage.clone()),
        metrics_store.clone(),
        CommandProfiles::new(&config.ffmpeg),
        settings,
        tracing::info_span!("supervisor"),
    ));

    Harness {
        supervisor,
        runner,
        metrics_store,
        vod_storage,
        stream_keys: StreamKeyRegistry::new(config.streaming.clone()),
        config,
        vod_dir,
    }
}
