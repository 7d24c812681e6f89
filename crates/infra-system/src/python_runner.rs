// Python runner: one interpreter subprocess per run
// reason: tokio::process for async pipes and waits, nix for process-group kill
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pyrunner_core::application::constants::{DEFAULT_DRAIN_GRACE, DEFAULT_MAX_OUTPUT_BYTES};
use pyrunner_core::port::{CodeRunner, ExecutionError, OutputSink, RunOutput, RunSpec, StreamKind};

/// Interpreter-side driver, passed with `-c`
const BOOTSTRAP: &str = include_str!("bootstrap.py");

const READ_CHUNK: usize = 8192;

/// Variables the bootstrap reads (and removes) before user code starts
const ENV_SCRATCH_DIR: &str = "PYRUNNER_SCRATCH_DIR";
const ENV_RESTRICT_WRITES: &str = "PYRUNNER_RESTRICT_WRITES";
const ENV_ALLOW_ASYNC: &str = "PYRUNNER_ALLOW_ASYNC";

/// PythonRunner configuration
#[derive(Debug, Clone)]
pub struct PythonRunnerConfig {
    /// Interpreter executable, looked up on PATH when not absolute
    pub interpreter: PathBuf,
    /// Host variables passed through to the interpreter; everything else is dropped
    pub env_allowlist: Vec<String>,
    /// Per-stream capture cap
    pub max_output_bytes: usize,
    /// How long to keep reading pipes once the interpreter has exited
    pub drain_grace: Duration,
}

impl Default for PythonRunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            env_allowlist: ["PATH", "HOME", "LANG", "LC_ALL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

/// Runs source code in a fresh `python3 -I` process
///
/// The child gets its own process group, the run's scratch directory as its
/// working directory and an allowlisted environment. Source goes in over
/// stdin; stdout and stderr are captured separately.
pub struct PythonRunner {
    config: PythonRunnerConfig,
}

impl PythonRunner {
    /// Create a new runner
    ///
    /// # Example
    /// ```ignore
    /// let runner = PythonRunner::new(PythonRunnerConfig::default());
    /// let version = runner.probe().await?;
    /// ```
    pub fn new(config: PythonRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PythonRunnerConfig {
        &self.config
    }

    /// Check that the interpreter starts and report its version
    ///
    /// # Errors
    /// - ExecutionError::InterpreterUnavailable if it cannot be started or exits non-zero
    pub async fn probe(&self) -> Result<String, ExecutionError> {
        let output = Command::new(&self.config.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ExecutionError::InterpreterUnavailable(format!(
                    "{}: {}",
                    self.config.interpreter.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ExecutionError::InterpreterUnavailable(format!(
                "{} --version exited with {}",
                self.config.interpreter.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let version = if stdout.trim().is_empty() {
            stderr.trim().to_string()
        } else {
            stdout.trim().to_string()
        };
        Ok(version)
    }

    fn command(&self, spec: &RunSpec) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(["-I", "-u", "-X", "utf8", "-c", BOOTSTRAP])
            .current_dir(&spec.workspace)
            .env_clear();

        for key in &self.config.env_allowlist {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }

        cmd.env(ENV_SCRATCH_DIR, &spec.workspace)
            .env(ENV_RESTRICT_WRITES, flag(spec.restrict_writes))
            .env(ENV_ALLOW_ASYNC, flag(spec.allow_async))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// SIGKILL the child's whole process group, then reap the child
    async fn kill_tree(&self, child: &mut Child, group: &ProcessGroup) {
        if !group.kill() {
            let _ = child.start_kill();
        }
        if let Err(e) = child.wait().await {
            warn!(error = %e, "Failed to reap killed interpreter");
        }
    }
}

/// The interpreter's process group, SIGKILLed when dropped
///
/// Covers every exit from `run`, including the future being dropped by a
/// cancelled job. `kill_on_drop` alone reaches only the interpreter itself.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// Returns false when the group could not be signalled
    #[cfg(unix)]
    fn kill(&self) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return false;
        };
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            // Nothing left in the group
            Ok(()) | Err(Errno::ESRCH) => true,
            Err(e) => {
                warn!(pgid = pgid, error = %e, "killpg failed");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) -> bool {
        false
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            self.kill();
        }
    }
}

#[async_trait]
impl CodeRunner for PythonRunner {
    async fn run(
        &self,
        spec: RunSpec,
        sink: Arc<dyn OutputSink>,
    ) -> Result<RunOutput, ExecutionError> {
        let mut child = self.command(&spec).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecutionError::InterpreterUnavailable(format!(
                    "{}: {}",
                    self.config.interpreter.display(),
                    e
                ))
            } else {
                ExecutionError::SpawnFailed(e.to_string())
            }
        })?;

        debug!(run_id = %spec.run_id, pid = ?child.id(), "Interpreter spawned");
        let mut group = ProcessGroup::of(&child);

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::IoError("stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::IoError("stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::IoError("stderr not piped".to_string()))?;

        // Interpreter may exit before reading everything; a broken pipe is fine
        let source = spec.source_code.clone().into_bytes();
        let run_id = spec.run_id.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&source).await {
                debug!(run_id = %run_id, error = %e, "Source write ended early");
            }
            let _ = stdin.shutdown().await;
        });

        let capture = Arc::new(Capture::new(self.config.max_output_bytes));
        let out_task = tokio::spawn(pump(
            stdout,
            StreamKind::Stdout,
            capture.clone(),
            sink.clone(),
        ));
        let err_task = tokio::spawn(pump(stderr, StreamKind::Stderr, capture.clone(), sink));
        let pumps = [out_task.abort_handle(), err_task.abort_handle()];

        let (exit_code, timed_out) = match timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // Anything user code started goes with the interpreter
                group.kill();
                (status.code(), false)
            }
            Ok(Err(e)) => {
                self.kill_tree(&mut child, &group).await;
                pumps.iter().for_each(|p| p.abort());
                return Err(ExecutionError::IoError(e.to_string()));
            }
            Err(_) => {
                warn!(
                    run_id = %spec.run_id,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "Run exceeded its deadline, killing interpreter"
                );
                self.kill_tree(&mut child, &group).await;
                (None, true)
            }
        };

        // Descendants outside the group can hold the pipes open
        let drained = timeout(self.config.drain_grace, async {
            let _ = out_task.await;
            let _ = err_task.await;
        })
        .await;
        if drained.is_err() {
            warn!(run_id = %spec.run_id, "Output pipes still open after drain grace");
            pumps.iter().for_each(|p| p.abort());
        }
        group.disarm();

        let (stdout, stderr, truncated) = capture.take();

        info!(
            run_id = %spec.run_id,
            exit_code = ?exit_code,
            timed_out = timed_out,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            truncated = truncated,
            "Interpreter finished"
        );

        Ok(RunOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
            truncated,
        })
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

/// Output collected so far; shared between the pump tasks and `run`
struct Capture {
    limit: usize,
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    truncated: AtomicBool,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
            truncated: AtomicBool::new(false),
        }
    }

    fn buffer(&self, stream: StreamKind) -> &Mutex<Vec<u8>> {
        match stream {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }

    fn push(&self, stream: StreamKind, chunk: &[u8]) {
        let mut buffer = self
            .buffer(stream)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let room = self.limit.saturating_sub(buffer.len());
        if chunk.len() > room {
            self.truncated.store(true, Ordering::Relaxed);
        }
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn take(&self) -> (Vec<u8>, Vec<u8>, bool) {
        let stdout = std::mem::take(
            &mut *self.stdout.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let stderr = std::mem::take(
            &mut *self.stderr.lock().unwrap_or_else(PoisonError::into_inner),
        );
        (stdout, stderr, self.truncated.load(Ordering::Relaxed))
    }
}

async fn pump<R>(
    mut reader: R,
    stream: StreamKind,
    capture: Arc<Capture>,
    sink: Arc<dyn OutputSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                capture.push(stream, &buf[..n]);
                sink.on_output(stream, &buf[..n]);
            }
            Err(e) => {
                debug!(stream = ?stream, error = %e, "Output pipe read failed");
                break;
            }
        }
    }
}
