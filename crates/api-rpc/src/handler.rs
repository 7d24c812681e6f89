//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{rate_limited, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelResponse, JobRequest, ListFilesRequest, ListFilesResponse, PolicyCheckRequest,
    PolicyCheckResponse, ReadFileRequest, ReadFileResponse, RunRequest, RunResponse,
    StatsResponse, StatusResponse, SubmitResponse,
};
use base64::Engine;
use jsonrpsee::types::ErrorObjectOwned;
use pyrunner_core::application::{ExecutorService, JobManager};
use pyrunner_core::domain::{ExecutionRequest, ImportPolicy, JobState};
use pyrunner_core::error::AppError;
use pyrunner_core::port::{ScratchStore, SystemProbe};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Application services the handler dispatches to
#[derive(Clone)]
pub struct RpcServices {
    pub executor: Arc<ExecutorService>,
    pub jobs: Arc<JobManager>,
    pub scratch: Arc<dyn ScratchStore>,
    pub probe: Arc<dyn SystemProbe>,
}

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    services: RpcServices,
    default_blocked_modules: Vec<String>,
    max_source_bytes: usize,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    /// Create a handler
    ///
    /// # Arguments
    /// * `services` - Application services
    /// * `default_blocked_modules` - Denylist used when a request omits `blocked_modules`
    /// * `max_source_bytes` - Largest accepted `source_code`
    /// * `rate_limiter` - Shared by run, submit and cancel
    pub fn new(
        services: RpcServices,
        default_blocked_modules: Vec<String>,
        max_source_bytes: usize,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            services,
            default_blocked_modules,
            max_source_bytes,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    fn check_rate(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            Err(rate_limited())
        }
    }

    fn blocked_or_default(&self, blocked: Option<Vec<String>>) -> Vec<String> {
        blocked.unwrap_or_else(|| self.default_blocked_modules.clone())
    }

    fn build_request(&self, params: RunRequest) -> Result<ExecutionRequest, ErrorObjectOwned> {
        let blocked = self.blocked_or_default(params.blocked_modules);
        ExecutionRequest::builder(params.source_code)
            .timeout_secs(params.timeout_seconds)
            .allow_async(params.allow_async)
            .restrict_writes(params.restrict_writes)
            .blocked_modules(blocked)
            .max_source_bytes(self.max_source_bytes)
            .build()
            .map_err(|e| to_rpc_error(AppError::from(e)))
    }

    /// exec.run.v1
    pub async fn run(&self, params: RunRequest) -> Result<RunResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let request = self.build_request(params)?;
        self.services
            .executor
            .execute(&request)
            .await
            .map_err(to_rpc_error)
    }

    /// exec.submit.v1
    pub async fn submit(&self, params: RunRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let request = self.build_request(params)?;
        let job_id = self
            .services
            .jobs
            .submit(request)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id,
            state: JobState::Running,
        })
    }

    /// exec.status.v1
    pub async fn status(&self, params: JobRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let snapshot = self
            .services
            .jobs
            .status(&params.job_id)
            .map_err(to_rpc_error)?;
        let job = snapshot.job;

        Ok(StatusResponse {
            job_id: job.id,
            state: job.state,
            created_at: job.created_at,
            finished_at: job.finished_at,
            stdout: snapshot.live_stdout,
            stderr: snapshot.live_stderr,
            result: job.result,
            error: job.error,
        })
    }

    /// exec.cancel.v1
    pub async fn cancel(&self, params: JobRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        self.check_rate()?;
        let cancelled = self
            .services
            .jobs
            .cancel(&params.job_id)
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// files.list.v1
    pub async fn list_files(
        &self,
        params: ListFilesRequest,
    ) -> Result<ListFilesResponse, ErrorObjectOwned> {
        let files = self
            .services
            .scratch
            .list_files(&params.run_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(ListFilesResponse {
            run_id: params.run_id,
            files,
        })
    }

    /// files.read.v1
    pub async fn read_file(
        &self,
        params: ReadFileRequest,
    ) -> Result<ReadFileResponse, ErrorObjectOwned> {
        let content = self
            .services
            .scratch
            .read_file(&params.run_id, &params.path)
            .await
            .map_err(to_rpc_error)?;

        debug!(run_id = %params.run_id, path = %params.path, bytes = content.len(), "Serving scratch file");

        Ok(ReadFileResponse {
            size_bytes: content.len() as u64,
            content_base64: base64::engine::general_purpose::STANDARD.encode(&content),
            run_id: params.run_id,
            path: params.path,
        })
    }

    /// policy.check.v1
    pub async fn check_policy(
        &self,
        params: PolicyCheckRequest,
    ) -> Result<PolicyCheckResponse, ErrorObjectOwned> {
        let policy = ImportPolicy::new(self.blocked_or_default(params.blocked_modules));

        Ok(match policy.check(&params.source_code) {
            Ok(()) => PolicyCheckResponse {
                allowed: true,
                blocked_module: None,
                message: None,
            },
            Err(violation) => PolicyCheckResponse {
                allowed: false,
                message: Some(violation.to_string()),
                blocked_module: Some(violation.module),
            },
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let metrics = self.services.probe.get_metrics().await;

        Ok(StatsResponse {
            version: pyrunner_core::VERSION.to_string(),
            runs_started: self.services.executor.runs_started(),
            available_run_slots: self.services.executor.available_permits(),
            jobs: self.services.jobs.counts(),
            cpu_usage_percent: metrics.cpu_usage_percent,
            memory_used_mb: metrics.memory_used_mb,
            memory_total_mb: metrics.memory_total_mb,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use pyrunner_core::application::JobManagerConfig;
    use pyrunner_core::domain::{ExecutionOutcome, DEFAULT_BLOCKED_MODULES, MAX_SOURCE_BYTES};
    use pyrunner_core::port::code_runner::mocks::MockCodeRunner;
    use pyrunner_core::port::id_provider::SequentialIdProvider;
    use pyrunner_core::port::scratch_store::mocks::InMemoryScratchStore;
    use pyrunner_core::port::system_probe::mocks::MockSystemProbe;
    use pyrunner_core::port::time_provider::SystemTimeProvider;

    struct Fixture {
        handler: RpcHandler,
        runner: Arc<MockCodeRunner>,
        scratch: Arc<InMemoryScratchStore>,
    }

    fn fixture_with_limit(burst: u32) -> Fixture {
        let runner = Arc::new(MockCodeRunner::printing("hello\n"));
        let scratch = Arc::new(InMemoryScratchStore::new());
        let probe = Arc::new(MockSystemProbe::new(5.0));
        let executor = Arc::new(ExecutorService::new(
            runner.clone(),
            scratch.clone(),
            Arc::new(SequentialIdProvider::new("run")),
            Arc::new(SystemTimeProvider),
            2,
        ));
        let jobs = Arc::new(JobManager::new(
            executor.clone(),
            probe.clone(),
            Arc::new(SystemTimeProvider),
            JobManagerConfig::default(),
        ));
        let services = RpcServices {
            executor,
            jobs,
            scratch: scratch.clone(),
            probe,
        };
        let handler = RpcHandler::new(
            services,
            DEFAULT_BLOCKED_MODULES.iter().map(|m| m.to_string()).collect(),
            MAX_SOURCE_BYTES,
            RateLimiter::new(burst, 1),
        );
        Fixture {
            handler,
            runner,
            scratch,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_limit(100)
    }

    fn run_request(source: &str) -> RunRequest {
        RunRequest {
            source_code: source.to_string(),
            timeout_seconds: 8,
            allow_async: false,
            restrict_writes: false,
            blocked_modules: None,
        }
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let fx = fixture();
        let result = fx.handler.run(run_request("print('hello')")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Completed);
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_default_denylist_applies_when_absent() {
        let fx = fixture();
        let result = fx.handler.run(run_request("import subprocess")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::PolicyViolation);
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_denylist_disables_check() {
        let fx = fixture();
        let mut req = run_request("import subprocess");
        req.blocked_modules = Some(vec![]);

        let result = fx.handler.run(req).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Completed);
        assert_eq!(fx.runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_rejected() {
        let fx = fixture();
        let mut req = run_request("pass");
        req.timeout_seconds = 600;

        let err = fx.handler.run(req).await.unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let fx = fixture_with_limit(1);
        fx.handler.run(run_request("pass")).await.unwrap();
        let err = fx.handler.run(run_request("pass")).await.unwrap_err();
        assert_eq!(err.code(), code::THROTTLED);
    }

    #[tokio::test]
    async fn test_submit_status_cancel() {
        let fx = fixture();
        let submitted = fx.handler.submit(run_request("print('hello')")).await.unwrap();
        assert_eq!(submitted.state, JobState::Running);

        let job = JobRequest {
            job_id: submitted.job_id.clone(),
        };
        let mut status = fx.handler.status(job.clone()).await.unwrap();
        for _ in 0..100 {
            if status.state.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            status = fx.handler.status(job.clone()).await.unwrap();
        }
        assert_eq!(status.state, JobState::Finished);
        assert_eq!(status.stdout, "hello\n");
        assert_eq!(status.result.unwrap().stdout, "hello\n");

        let cancel = fx.handler.cancel(job).await.unwrap();
        assert!(!cancel.cancelled);
    }

    #[tokio::test]
    async fn test_status_unknown_job() {
        let fx = fixture();
        let err = fx
            .handler
            .status(JobRequest {
                job_id: "nope".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_file_is_base64() {
        let fx = fixture();
        fx.scratch.put_file("run-7", "out.txt", b"hi there");

        let listed = fx
            .handler
            .list_files(ListFilesRequest {
                run_id: "run-7".into(),
            })
            .await
            .unwrap();
        assert_eq!(listed.files.len(), 1);

        let read = fx
            .handler
            .read_file(ReadFileRequest {
                run_id: "run-7".into(),
                path: "out.txt".into(),
            })
            .await
            .unwrap();
        assert_eq!(read.size_bytes, 8);
        assert_eq!(read.content_base64, "aGkgdGhlcmU=");
    }

    #[tokio::test]
    async fn test_check_policy() {
        let fx = fixture();

        let denied = fx
            .handler
            .check_policy(PolicyCheckRequest {
                source_code: "from shutil import rmtree".into(),
                blocked_modules: None,
            })
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.blocked_module.as_deref(), Some("shutil"));

        let allowed = fx
            .handler
            .check_policy(PolicyCheckRequest {
                source_code: "import math".into(),
                blocked_modules: None,
            })
            .await
            .unwrap();
        assert!(allowed.allowed);
        assert!(allowed.message.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let fx = fixture();
        fx.handler.run(run_request("pass")).await.unwrap();

        let stats = fx.handler.stats().await.unwrap();
        assert_eq!(stats.runs_started, 1);
        assert_eq!(stats.available_run_slots, 2);
        assert_eq!(stats.cpu_usage_percent, 5.0);
        assert_eq!(stats.jobs.running, 0);
    }
}
