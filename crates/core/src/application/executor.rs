// Executor Service - the code execution use case
//
// policy pre-check -> concurrency permit -> scratch dir -> runner -> result

use crate::domain::{
    ExecutionOutcome, ExecutionRequest, ExecutionResult, ImportPolicy, RunId,
};
use crate::error::{AppError, Result};
use crate::port::{
    CodeRunner, DiscardSink, IdProvider, OutputSink, RunOutput, RunSpec, ScratchStore,
    StreamKind, TimeProvider,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Executor Service
///
/// Produces exactly one ExecutionResult per request. User-code failures
/// (faults, timeouts, policy rejections) are results, not errors; `Err` is
/// reserved for infrastructure problems such as a missing interpreter.
pub struct ExecutorService {
    runner: Arc<dyn CodeRunner>,
    scratch: Arc<dyn ScratchStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    permits: Arc<Semaphore>,
    runs_started: AtomicU64,
}

impl ExecutorService {
    /// Create a new executor service
    ///
    /// # Arguments
    /// * `runner` - Interpreter adapter
    /// * `scratch` - Per-run scratch directory store
    /// * `id_provider` - Run ID generator (injected for determinism)
    /// * `time_provider` - Clock used for elapsed time
    /// * `max_concurrent_runs` - Interpreter processes allowed at once (at least 1)
    pub fn new(
        runner: Arc<dyn CodeRunner>,
        scratch: Arc<dyn ScratchStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            runner,
            scratch,
            id_provider,
            time_provider,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            runs_started: AtomicU64::new(0),
        }
    }

    /// Allocate a run ID (background jobs reuse it as their job ID)
    pub fn next_run_id(&self) -> RunId {
        self.id_provider.generate_id()
    }

    /// Run a request and wait for its result
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let run_id = self.next_run_id();
        self.execute_run(&run_id, request, Arc::new(DiscardSink)).await
    }

    /// Run a request under a caller-chosen ID, streaming output chunks to `sink`
    pub async fn execute_run(
        &self,
        run_id: &str,
        request: &ExecutionRequest,
        sink: Arc<dyn OutputSink>,
    ) -> Result<ExecutionResult> {
        let policy = ImportPolicy::new(request.blocked_modules().iter().cloned());
        if let Err(violation) = policy.check(request.source_code()) {
            warn!(
                run_id = %run_id,
                module = %violation.module,
                "Run rejected by import pre-check"
            );
            let message = format!("{}\n", violation);
            sink.on_output(StreamKind::Stderr, message.as_bytes());
            return Ok(ExecutionResult::policy_violation(run_id, message));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("Run permits closed: {}", e)))?;
        self.runs_started.fetch_add(1, Ordering::Relaxed);

        let workspace = self.scratch.create(run_id).await?;
        let timeout = request.timeout();

        info!(
            run_id = %run_id,
            timeout_secs = timeout.as_secs(),
            allow_async = request.allow_async(),
            restrict_writes = request.restrict_writes(),
            source_bytes = request.source_code().len(),
            "Starting run"
        );

        let spec = RunSpec {
            run_id: run_id.to_string(),
            source_code: request.source_code().to_string(),
            timeout: timeout.as_duration(),
            allow_async: request.allow_async(),
            restrict_writes: request.restrict_writes(),
            workspace,
        };

        let start = self.time_provider.now_millis();
        let output = self.runner.run(spec, sink).await?;
        let elapsed_ms = (self.time_provider.now_millis() - start).max(0);

        let files = match self.scratch.list_files(run_id).await {
            Ok(files) => files,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Could not list scratch files");
                Vec::new()
            }
        };

        let result = build_result(run_id, output, elapsed_ms, timeout.as_secs(), files);

        info!(
            run_id = %run_id,
            outcome = %result.outcome,
            elapsed_ms = elapsed_ms,
            exit_code = ?result.exit_code,
            files = result.files.len(),
            "Run finished"
        );

        Ok(result)
    }

    /// Runs that reached the interpreter since startup
    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    /// Free interpreter slots right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

fn classify(output: &RunOutput) -> ExecutionOutcome {
    if output.timed_out {
        ExecutionOutcome::TimedOut
    } else if output.exit_code == Some(0) {
        ExecutionOutcome::Completed
    } else {
        ExecutionOutcome::RuntimeFault
    }
}

fn build_result(
    run_id: &str,
    output: RunOutput,
    elapsed_ms: i64,
    timeout_secs: u64,
    files: Vec<crate::domain::ScratchFile>,
) -> ExecutionResult {
    let outcome = classify(&output);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "TimeoutExceeded: execution did not finish within {}s\n",
            timeout_secs
        ));
    }

    ExecutionResult {
        run_id: run_id.to_string(),
        outcome,
        stdout,
        stderr,
        elapsed_seconds: elapsed_ms as f64 / 1000.0,
        timed_out: output.timed_out,
        exit_code: output.exit_code,
        truncated: output.truncated,
        files,
    }
}
