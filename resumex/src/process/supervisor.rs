//! Process supervisor.
//!
//! Runs one child command per call:
//! - appends a header to the session log
//! - pumps stdout/stderr into the log and mirrors them to the console
//! - races natural exit against SIGINT/SIGTERM
//!
//! On interruption the signal is forwarded to the child, which gets a grace
//! period to exit before it is killed. The call then reports
//! [`RunOutcome::Interrupted`] with exit code 130 whether or not the child
//! exited within the grace period.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::command::join_command;
use super::pump::{spawn_pump, OutputStream, SharedLog};
use super::signal::{self, Interrupt, InterruptListener};
use crate::config::DEFAULT_GRACE_PERIOD;

/// Exit code reported for an interrupted run.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Exit code used when the child died without one (killed by a signal).
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// How long output is drained after the child exits.
///
/// Background jobs started by the command can hold the pipes open long after
/// the command itself is gone.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Failure that prevented the command from running under supervision.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The session log could not be opened or written.
    #[error("failed to open log file {}", path.display())]
    Log {
        /// Log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The child process could not be started.
    #[error("failed to start command '{program}'")]
    Spawn {
        /// Executable that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A stdio pipe to the child was not available.
    #[error("failed to create {0} pipe")]
    Pipe(&'static str),

    /// Waiting on the child failed.
    #[error("failed to wait for command")]
    Wait(#[source] io::Error),

    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers")]
    Signal(#[source] io::Error),
}

/// What to run and where its output goes.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Session identifier written to the log header.
    pub session_id: String,
    /// The program to execute.
    pub program: String,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,
    /// Session log, opened for append.
    pub log_path: PathBuf,
}

impl RunRequest {
    /// Create a request for `program` logging to `log_path`.
    pub fn new(
        session_id: impl Into<String>,
        program: impl Into<String>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            log_path: log_path.into(),
        }
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn display_command(&self) -> String {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        join_command(&argv)
    }
}

/// Terminal state of one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited on its own; any exit code counts.
    Completed,
    /// An operator signal stopped the run.
    Interrupted(Interrupt),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("command completed"),
            Self::Interrupted(signal) => write!(f, "command interrupted by signal {signal}"),
        }
    }
}

/// Exit code and outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Child exit code, or 130 when interrupted.
    pub exit_code: i32,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl RunReport {
    const fn completed(exit_code: i32) -> Self {
        Self {
            exit_code,
            outcome: RunOutcome::Completed,
        }
    }

    const fn interrupted(signal: Interrupt) -> Self {
        Self {
            exit_code: INTERRUPTED_EXIT_CODE,
            outcome: RunOutcome::Interrupted(signal),
        }
    }

    /// Whether an operator signal ended the run.
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Interrupted(_))
    }
}

/// Runs commands with output capture and signal-aware shutdown.
#[derive(Debug, Clone)]
pub struct Supervisor {
    grace_period: Duration,
    drain_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl Supervisor {
    /// Create a supervisor with the given grace period.
    pub const fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bound the wait for remaining output once the child has exited.
    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run the request, treating SIGINT/SIGTERM as interruption.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, SupervisorError> {
        // Installed before the child starts so an early Ctrl-C cannot kill us.
        let mut listener = InterruptListener::install().map_err(SupervisorError::Signal)?;
        self.run_until(request, listener.recv()).await
    }

    /// Run the request, treating completion of `interrupt` as an operator signal.
    pub async fn run_until<F>(
        &self,
        request: &RunRequest,
        interrupt: F,
    ) -> Result<RunReport, SupervisorError>
    where
        F: Future<Output = Interrupt>,
    {
        let log = open_log(request).await?;
        let mut child = spawn_child(request)?;

        let stdout = child.stdout.take().ok_or(SupervisorError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SupervisorError::Pipe("stderr"))?;

        let stdout_pump = spawn_pump(stdout, OutputStream::Stdout, log.clone());
        let stderr_pump = spawn_pump(stderr, OutputStream::Stderr, log);

        info!(
            session = %request.session_id,
            pid = child.id(),
            program = %request.program,
            "command started"
        );

        tokio::pin!(interrupt);

        tokio::select! {
            status = child.wait() => {
                let exit_code = exit_code(status.map_err(SupervisorError::Wait)?);
                self.drain(request, [stdout_pump, stderr_pump], &mut interrupt).await;

                info!(session = %request.session_id, exit_code, "command completed");
                Ok(RunReport::completed(exit_code))
            }
            signal = &mut interrupt => {
                self.shut_down(&mut child, signal).await;
                info!(session = %request.session_id, %signal, "command interrupted");
                Ok(RunReport::interrupted(signal))
            }
        }
    }

    /// Let the pumps copy what is still buffered, then stop them.
    ///
    /// Gives up after the drain timeout or on an operator signal. The child
    /// has already exited, so neither changes the outcome.
    async fn drain<F>(
        &self,
        request: &RunRequest,
        pumps: [JoinHandle<()>; 2],
        interrupt: &mut Pin<&mut F>,
    ) where
        F: Future<Output = Interrupt>,
    {
        let aborts = pumps.each_ref().map(JoinHandle::abort_handle);
        let [stdout_pump, stderr_pump] = pumps;
        let finished = async {
            let _ = stdout_pump.await;
            let _ = stderr_pump.await;
        };

        tokio::select! {
            () = finished => {}
            () = sleep(self.drain_timeout) => {
                warn!(
                    session = %request.session_id,
                    drain_ms = self.drain_timeout.as_millis(),
                    "output still open after command exited, detaching"
                );
            }
            signal = interrupt.as_mut() => {
                debug!(session = %request.session_id, %signal, "signal while draining output");
            }
        }

        for abort in aborts {
            abort.abort();
        }
    }

    /// Forward the signal, give the child the grace period, then kill it.
    async fn shut_down(&self, child: &mut Child, signal: Interrupt) {
        eprintln!("\nReceived signal {signal}, terminating command...");

        if let Err(e) = signal::forward(child, signal) {
            warn!(%signal, error = %e, "failed to forward signal to command");
        }

        match timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "command exited within grace period"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for command after signal"),
            Err(_) => {
                warn!(
                    grace_ms = self.grace_period.as_millis(),
                    "command ignored signal, killing it"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill command");
                }
            }
        }
    }
}

async fn open_log(request: &RunRequest) -> Result<SharedLog, SupervisorError> {
    let log_error = |source| SupervisorError::Log {
        path: request.log_path.clone(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&request.log_path)
        .await
        .map_err(log_error)?;

    let working_dir = request
        .working_dir
        .as_ref()
        .map_or_else(|| ".".to_string(), |dir| dir.display().to_string());

    let header = format!(
        "=== Session {} started at {} ===\n\
         Command: {}\n\
         Working Directory: {}\n\
         ========================================\n",
        request.session_id,
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        request.display_command(),
        working_dir,
    );

    file.write_all(header.as_bytes()).await.map_err(log_error)?;
    file.flush().await.map_err(log_error)?;

    Ok(Arc::new(Mutex::new(file)))
}

fn spawn_child(request: &RunRequest) -> Result<Child, SupervisorError> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args);

    if let Some(ref dir) = request.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|source| SupervisorError::Spawn {
        program: request.program.clone(),
        source,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(GENERIC_FAILURE_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn sh(dir: &TempDir, script: &str) -> RunRequest {
        RunRequest::new("test-session", "sh", dir.path().join("session.log"))
            .args(["-c", script])
            .working_dir(dir.path())
    }

    async fn never() -> Interrupt {
        std::future::pending().await
    }

    fn read_log(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("session.log")).unwrap()
    }

    #[tokio::test]
    async fn test_exit_code_is_reported_as_completed() {
        let dir = TempDir::new().unwrap();
        let report = Supervisor::default()
            .run_until(&sh(&dir, "exit 7"), never())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.exit_code, 7);
        assert!(!report.is_interrupted());
    }

    #[tokio::test]
    async fn test_output_is_logged_with_stream_prefixes() {
        let dir = TempDir::new().unwrap();
        let report = Supervisor::default()
            .run_until(&sh(&dir, "echo out; echo err >&2; echo more"), never())
            .await
            .unwrap();
        assert_eq!(report.exit_code, 0);

        let log = read_log(&dir);
        assert!(log.starts_with("=== Session test-session started at "));
        assert!(log.contains("Command: sh -c \"echo out; echo err >&2; echo more\"\n"));
        assert!(log.contains(&format!("Working Directory: {}\n", dir.path().display())));

        let stdout: Vec<_> = log.lines().filter(|l| l.starts_with("[STDOUT]")).collect();
        assert_eq!(stdout, vec!["[STDOUT] out", "[STDOUT] more"]);
        assert!(log.contains("[STDERR] err\n"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        Supervisor::default()
            .run_until(&sh(&dir, "ls"), never())
            .await
            .unwrap();

        assert!(read_log(&dir).contains("[STDOUT] marker.txt"));
    }

    #[tokio::test]
    async fn test_log_is_appended_per_run() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::default();
        supervisor.run_until(&sh(&dir, "echo one"), never()).await.unwrap();
        supervisor.run_until(&sh(&dir, "echo two"), never()).await.unwrap();

        let log = read_log(&dir);
        assert_eq!(log.matches("=== Session test-session started").count(), 2);
        assert!(log.find("[STDOUT] one").unwrap() < log.find("[STDOUT] two").unwrap());
    }

    #[tokio::test]
    async fn test_killed_child_maps_to_generic_failure() {
        let dir = TempDir::new().unwrap();
        let report = Supervisor::default()
            .run_until(&sh(&dir, "kill -9 $$"), never())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.exit_code, GENERIC_FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let request = RunRequest::new("s", "nonexistent_command_12345", dir.path().join("s.log"));

        let err = Supervisor::default()
            .run_until(&request, never())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_log_prevents_start() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let request = RunRequest::new("s", "touch", dir.path().join("missing").join("s.log"))
            .args([marker.display().to_string()]);

        let err = Supervisor::default()
            .run_until(&request, never())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Log { .. }));
        assert!(!marker.exists());

        // The OS error is reported once, through the source chain.
        let source = std::error::Error::source(&err).unwrap().to_string();
        assert!(!err.to_string().contains(&source));
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(chain.matches(&source).count(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_forwards_signal_and_reports_130() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(Interrupt::Sigterm);
        });

        let start = Instant::now();
        let report = Supervisor::default()
            .run_until(&sh(&dir, "echo started; exec sleep 30"), async {
                rx.await.unwrap_or(Interrupt::Sigint)
            })
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted(Interrupt::Sigterm));
        assert_eq!(report.exit_code, INTERRUPTED_EXIT_CODE);
        assert_eq!(
            report.outcome.to_string(),
            "command interrupted by signal SIGTERM"
        );
        // sleep dies on SIGTERM well before the grace period runs out.
        assert!(start.elapsed() < Duration::from_secs(5));

        let log = read_log(&dir);
        assert_eq!(log.matches("=== Session test-session started").count(), 1);
    }

    #[tokio::test]
    async fn test_child_ignoring_signal_is_killed_after_grace() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(Interrupt::Sigterm);
        });

        let start = Instant::now();
        let report = Supervisor::new(Duration::from_millis(300))
            .run_until(&sh(&dir, "trap '' TERM; exec sleep 30"), async {
                rx.await.unwrap_or(Interrupt::Sigint)
            })
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Interrupted(Interrupt::Sigterm));
        assert_eq!(report.exit_code, INTERRUPTED_EXIT_CODE);
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_background_job_does_not_hold_run_open() {
        let dir = TempDir::new().unwrap();
        let start = Instant::now();
        let report = Supervisor::default()
            .with_drain_timeout(Duration::from_millis(300))
            .run_until(&sh(&dir, "sleep 5 & echo bg-started"), never())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.exit_code, 0);
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(read_log(&dir).contains("[STDOUT] bg-started\n"));
    }

    #[tokio::test]
    async fn test_signal_while_draining_returns_promptly() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = tx.send(Interrupt::Sigint);
        });

        let start = Instant::now();
        let report = Supervisor::default()
            .with_drain_timeout(Duration::from_secs(60))
            .run_until(&sh(&dir, "sleep 10 & exit 0"), async {
                rx.await.unwrap_or(Interrupt::Sigint)
            })
            .await
            .unwrap();

        // The command itself finished before the signal arrived.
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.exit_code, 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
