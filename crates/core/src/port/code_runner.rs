// Code Runner Port
// Abstraction for running one piece of source in an interpreter

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Everything a runner needs to execute one run (owned, so it can cross tasks)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub run_id: String,
    pub source_code: String,
    pub timeout: Duration,
    pub allow_async: bool,
    pub restrict_writes: bool,
    /// Per-run scratch directory: working directory and write-allow root
    pub workspace: PathBuf,
}

/// Raw output of a run as seen by the runner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub truncated: bool,
}

/// Which captured stream a chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Per-call receiver for output chunks as they are produced.
///
/// Each run gets its own sink; nothing is redirected process-wide.
pub trait OutputSink: Send + Sync {
    fn on_output(&self, stream: StreamKind, chunk: &[u8]);
}

/// Sink for callers that only want the final result
pub struct DiscardSink;

impl OutputSink for DiscardSink {
    fn on_output(&self, _stream: StreamKind, _chunk: &[u8]) {}
}

/// Runner errors (infrastructure only; user-code faults are part of RunOutput)
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Interpreter not available: {0}")]
    InterpreterUnavailable(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Code Runner trait
///
/// Implementations:
/// - PythonRunner (infra-system): one interpreter subprocess per run
/// - MockCodeRunner: scripted behavior for tests
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `spec` to completion or until its timeout elapses
    ///
    /// Timeouts are not errors: they return `Ok` with `timed_out = true` and
    /// whatever output was captured before the deadline.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the interpreter cannot be started
    /// - ExecutionError::IoError if waiting on the process fails
    async fn run(
        &self,
        spec: RunSpec,
        sink: Arc<dyn OutputSink>,
    ) -> Result<RunOutput, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Emit the given streams and exit with `exit_code`
        Output {
            stdout: String,
            stderr: String,
            exit_code: i32,
        },
        /// Emit `partial` on stdout, then block until the RunSpec timeout
        Hang { partial: String },
        /// Sleep for the duration, then succeed with empty output
        Sleep(Duration),
        /// Fail to spawn
        SpawnFail(String),
        /// Panic inside the runner (for task isolation testing)
        Panic(String),
    }

    /// Mock Code Runner for testing
    pub struct MockCodeRunner {
        behavior: Mutex<MockBehavior>,
        calls: Mutex<Vec<RunSpec>>,
    }

    impl MockCodeRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn printing(stdout: impl Into<String>) -> Self {
            Self::new(MockBehavior::Output {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        pub fn faulting(stdout: impl Into<String>, trace: impl Into<String>) -> Self {
            Self::new(MockBehavior::Output {
                stdout: stdout.into(),
                stderr: trace.into(),
                exit_code: 1,
            })
        }

        pub fn hanging(partial: impl Into<String>) -> Self {
            Self::new(MockBehavior::Hang {
                partial: partial.into(),
            })
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_spec(&self) -> Option<RunSpec> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CodeRunner for MockCodeRunner {
        async fn run(
            &self,
            spec: RunSpec,
            sink: Arc<dyn OutputSink>,
        ) -> Result<RunOutput, ExecutionError> {
            self.calls.lock().unwrap().push(spec.clone());
            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Output {
                    stdout,
                    stderr,
                    exit_code,
                } => {
                    sink.on_output(StreamKind::Stdout, stdout.as_bytes());
                    sink.on_output(StreamKind::Stderr, stderr.as_bytes());
                    Ok(RunOutput {
                        stdout: stdout.into_bytes(),
                        stderr: stderr.into_bytes(),
                        exit_code: Some(exit_code),
                        timed_out: false,
                        truncated: false,
                    })
                }
                MockBehavior::Hang { partial } => {
                    sink.on_output(StreamKind::Stdout, partial.as_bytes());
                    tokio::time::sleep(spec.timeout).await;
                    Ok(RunOutput {
                        stdout: partial.into_bytes(),
                        stderr: Vec::new(),
                        exit_code: None,
                        timed_out: true,
                        truncated: false,
                    })
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(RunOutput {
                        exit_code: Some(0),
                        ..RunOutput::default()
                    })
                }
                MockBehavior::SpawnFail(msg) => Err(ExecutionError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
            }
        }
    }
}
