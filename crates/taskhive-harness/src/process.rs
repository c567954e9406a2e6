//! Supervised child process execution.
//!
//! One harness run is one child process. Its stdout and stderr are read line
//! by line on separate tasks and funneled through a channel into a single
//! supervising loop, which also waits on the child and drives the deadline:
//! when the timeout expires the child gets SIGTERM, and if it is still alive
//! after the grace period it is killed outright.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::inference::{OutputPatterns, ProgressTracker};
use crate::observer::ExecutionObserver;

/// How long readers may keep delivering output after the child exits.
///
/// A grandchild that inherited the pipes can hold them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A fully resolved command line.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub grace_period: Duration,
}

/// What the supervisor observed.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// `None` when the child was ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Running,
    Terminating,
    Killed,
}

/// Run `spec` to completion, streaming stdout to `observer`.
///
/// Errors only when the child cannot be spawned or waited on. Timeouts and
/// non-zero exits are reported through the returned outcome.
pub async fn supervise(
    spec: &ProcessSpec,
    observer: &dyn ExecutionObserver,
    patterns: &OutputPatterns,
    tracker: &mut ProgressTracker,
) -> Result<ProcessOutcome, HarnessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(&spec.working_dir)
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    debug!(program = %spec.program, args = spec.args.len(), "Spawning harness process");

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
        binary: spec.program.clone(),
        source,
    })?;

    info!(pid = ?child.id(), program = %spec.program, "Harness process spawned");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let mut readers: Vec<JoinHandle<()>> = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut captured = Captured::default();
    let mut streams_open = true;
    let mut deadline = Deadline::Running;
    let timer = tokio::time::sleep(spec.timeout);
    tokio::pin!(timer);

    let status = loop {
        tokio::select! {
            line = line_rx.recv(), if streams_open => match line {
                Some((stream, line)) => {
                    captured.push(stream, line, observer, patterns, tracker).await;
                }
                None => streams_open = false,
            },
            status = child.wait() => break status?,
            () = &mut timer, if deadline != Deadline::Killed => {
                deadline = escalate(&mut child, deadline, spec);
                if deadline == Deadline::Terminating {
                    timer.as_mut().reset(Instant::now() + spec.grace_period);
                }
            }
        }
    };

    if streams_open {
        let drain_until = Instant::now() + DRAIN_TIMEOUT;
        loop {
            match tokio::time::timeout_at(drain_until, line_rx.recv()).await {
                Ok(Some((stream, line))) => {
                    captured.push(stream, line, observer, patterns, tracker).await;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        program = %spec.program,
                        "Output pipes still open after exit; abandoning readers"
                    );
                    break;
                }
            }
        }
    }
    for reader in readers {
        reader.abort();
    }

    let elapsed = started.elapsed();
    let timed_out = deadline != Deadline::Running;
    info!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "Harness process exited"
    );

    Ok(ProcessOutcome {
        exit_code: status.code(),
        stdout: captured.stdout,
        stderr: captured.stderr,
        timed_out,
        elapsed,
    })
}

fn escalate(child: &mut Child, deadline: Deadline, spec: &ProcessSpec) -> Deadline {
    match deadline {
        Deadline::Running => {
            warn!(
                timeout_ms = spec.timeout.as_millis() as u64,
                grace_ms = spec.grace_period.as_millis() as u64,
                "Harness deadline passed, sending SIGTERM"
            );
            send_sigterm(child);
            Deadline::Terminating
        }
        Deadline::Terminating | Deadline::Killed => {
            warn!("Harness ignored SIGTERM, killing");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Failed to kill harness process");
            }
            Deadline::Killed
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid, error = %e, "Failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) {
    // No graceful signal here; go straight to the kill.
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill harness process");
    }
}

fn spawn_reader<R>(
    stream: R,
    kind: Stream,
    tx: mpsc::UnboundedSender<(Stream, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // Harness output is not guaranteed to be UTF-8; the pipe
                    // must keep draining either way.
                    let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                    if tx.send((kind, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(stream = ?kind, error = %e, "Stopped reading harness output");
                    break;
                }
            }
        }
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    async fn push(
        &mut self,
        stream: Stream,
        line: String,
        observer: &dyn ExecutionObserver,
        patterns: &OutputPatterns,
        tracker: &mut ProgressTracker,
    ) {
        match stream {
            Stream::Stdout => {
                observer.on_output(&line).await;
                if let Some(event) = tracker.observe(patterns, &line) {
                    debug!(phase = %event.phase, percent = event.percent, "Harness progress");
                    observer.on_progress(event).await;
                }
                self.stdout.push_str(&line);
                self.stdout.push('\n');
            }
            Stream::Stderr => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    debug!(stderr = %trimmed, "Harness stderr");
                }
                self.stderr.push_str(&line);
                self.stderr.push('\n');
            }
        }
    }
}
