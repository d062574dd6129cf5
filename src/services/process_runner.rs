//! External process runner
//!
//! Spawns one command with piped stdout/stderr and turns everything the
//! process does into typed [`ProcessEvent`]s on a bounded channel: output
//! chunks in arrival order, runtime errors, and finally exactly one
//! `Exited`. Termination is requested through [`ProcessControl`]: SIGTERM
//! first, SIGKILL once the grace period runs out.

use bytes::Bytes;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{SupervisorError, SupervisorResult};
use crate::models::{ExitStatusInfo, ProcessEvent, ProcessRole};
use crate::services::command_profile::CommandSpec;

const READ_BUFFER_SIZE: usize = 8192;

/// How long to wait for buffered output after the process is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests accepted by a running process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCommand {
    Terminate { grace: Duration },
}

/// Receiving side of a process's event stream
#[derive(Debug)]
pub struct ProcessEvents {
    rx: mpsc::Receiver<ProcessEvent>,
}

impl ProcessEvents {
    pub fn new(rx: mpsc::Receiver<ProcessEvent>) -> Self {
        Self { rx }
    }

    /// Next event; `None` once the process is gone and its queue drained
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }
}

/// Control side of a running process
#[derive(Debug, Clone)]
pub struct ProcessControl {
    tx: mpsc::Sender<ProcessCommand>,
}

impl ProcessControl {
    pub fn new(tx: mpsc::Sender<ProcessCommand>) -> Self {
        Self { tx }
    }

    /// Ask the process to stop. A process that already exited ignores this.
    pub async fn terminate(&self, grace: Duration) {
        if self.tx.send(ProcessCommand::Terminate { grace }).await.is_err() {
            debug!("Terminate requested for a process that already exited");
        }
    }
}

/// Exclusive ownership of one spawned process
#[derive(Debug)]
pub struct ProcessHandle {
    pub role: ProcessRole,
    pub pid: Option<u32>,
    pub events: ProcessEvents,
    pub control: ProcessControl,
}

/// Launches external commands.
///
/// `spawn` fails synchronously when the program cannot be started; failures
/// after that arrive as events on the returned handle.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, spec: &CommandSpec) -> SupervisorResult<ProcessHandle>;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    event_capacity: usize,
}

impl TokioProcessRunner {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            event_capacity: event_capacity.max(1),
        }
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn spawn(&self, spec: &CommandSpec) -> SupervisorResult<ProcessHandle> {
        let mut cmd = TokioCommand::new(&spec.program);
        cmd.args(&spec.args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(spec.role, &spec.program, e.to_string()))?;
        let pid = child.id();

        let (events_tx, events_rx) = mpsc::channel(self.event_capacity);
        let (control_tx, control_rx) = mpsc::channel(4);

        let readers = [
            child
                .stdout
                .take()
                .map(|stdout| tokio::spawn(forward_output(stdout, events_tx.clone(), ProcessEvent::Stdout))),
            child
                .stderr
                .take()
                .map(|stderr| tokio::spawn(forward_output(stderr, events_tx.clone(), ProcessEvent::Stderr))),
        ];

        tokio::spawn(supervise_child(child, spec.role, control_rx, events_tx, readers));

        debug!("Spawned {} process with PID {:?}: {}", spec.role, pid, spec);

        Ok(ProcessHandle {
            role: spec.role,
            pid,
            events: ProcessEvents::new(events_rx),
            control: ProcessControl::new(control_tx),
        })
    }
}

/// Copy one pipe into the event channel chunk by chunk
async fn forward_output<R>(
    mut pipe: R,
    events_tx: mpsc::Sender<ProcessEvent>,
    wrap: fn(Bytes) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match pipe.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buffer[..n]);
                if events_tx.send(wrap(chunk)).await.is_err() {
                    // Owner dropped the handle
                    break;
                }
            }
            Err(e) => {
                let _ = events_tx
                    .send(ProcessEvent::Errored(format!("Failed to read process output: {}", e)))
                    .await;
                break;
            }
        }
    }
}

/// Own the child until it exits, then emit `Exited` after the output drained
async fn supervise_child(
    mut child: Child,
    role: ProcessRole,
    mut control_rx: mpsc::Receiver<ProcessCommand>,
    events_tx: mpsc::Sender<ProcessEvent>,
    readers: [Option<JoinHandle<()>>; 2],
) {
    let status = tokio::select! {
        status = child.wait() => status,
        command = control_rx.recv() => match command {
            Some(ProcessCommand::Terminate { grace }) => terminate_child(&mut child, role, grace).await,
            // Every control handle dropped: nobody can stop it later
            None => terminate_child(&mut child, role, Duration::ZERO).await,
        },
    };

    for mut reader in readers.into_iter().flatten() {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("{} process output still open after exit, abandoning reader", role);
            reader.abort();
        }
    }

    let exit = match status {
        Ok(status) => ExitStatusInfo::from(status),
        Err(e) => {
            let _ = events_tx
                .send(ProcessEvent::Errored(format!("Failed to wait for process: {}", e)))
                .await;
            ExitStatusInfo { code: None, signal: None }
        }
    };
    let _ = events_tx.send(ProcessEvent::Exited(exit)).await;
}

/// SIGTERM, wait up to `grace`, then SIGKILL
async fn terminate_child(
    child: &mut Child,
    role: ProcessRole,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if !grace.is_zero() {
        send_graceful_stop(child);
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        warn!(
            "{} process {:?} ignored stop request for {:?}, killing",
            role,
            child.id(),
            grace
        );
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_graceful_stop(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to our unreaped child, so it cannot have been recycled
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result != 0 {
            debug!("SIGTERM to {} failed: {}", pid, std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_stop(child: &mut Child) {
    let _ = child.start_kill();
}
