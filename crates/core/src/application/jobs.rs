// Job Manager - background submissions
//
// Each job is one spawned run task plus a supervisor that records how it ended.
// Cancellation aborts the run task; dropping the runner future kills the
// interpreter process.

use super::constants::CPU_THROTTLE_THRESHOLD;
use super::executor::ExecutorService;
use super::live_output::LiveOutput;
use super::lock_unpoisoned;
use crate::domain::{BackgroundJob, ExecutionRequest, ExecutionResult, JobId, JobState};
use crate::error::{AppError, Result};
use crate::port::{SystemProbe, TimeProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError};
use tracing::{error, info, warn};

/// Job manager configuration
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Refuse submissions while host CPU usage is above this (percent)
    pub cpu_throttle_percent: f32,
    /// Per-stream cap for output buffered while a job runs
    pub live_output_limit: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            cpu_throttle_percent: CPU_THROTTLE_THRESHOLD,
            live_output_limit: super::constants::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Point-in-time view of a job, including output printed so far
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job: BackgroundJob,
    pub live_stdout: String,
    pub live_stderr: String,
}

/// Jobs per state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct JobEntry {
    job: BackgroundJob,
    live: Arc<LiveOutput>,
    abort: Option<AbortHandle>,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// Background job manager
pub struct JobManager {
    executor: Arc<ExecutorService>,
    probe: Arc<dyn SystemProbe>,
    time_provider: Arc<dyn TimeProvider>,
    config: JobManagerConfig,
    jobs: JobTable,
}

impl JobManager {
    pub fn new(
        executor: Arc<ExecutorService>,
        probe: Arc<dyn SystemProbe>,
        time_provider: Arc<dyn TimeProvider>,
        config: JobManagerConfig,
    ) -> Self {
        Self {
            executor,
            probe,
            time_provider,
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a run in the background and return its job ID immediately
    ///
    /// # Errors
    /// - AppError::Throttled if host CPU usage is above the configured threshold
    pub async fn submit(&self, request: ExecutionRequest) -> Result<JobId> {
        let metrics = self.probe.get_metrics().await;
        if metrics.cpu_usage_percent > self.config.cpu_throttle_percent {
            warn!(
                cpu_usage = metrics.cpu_usage_percent,
                threshold = self.config.cpu_throttle_percent,
                "Background submission throttled"
            );
            return Err(AppError::Throttled(format!(
                "CPU usage {:.1}% is above {:.1}%",
                metrics.cpu_usage_percent, self.config.cpu_throttle_percent
            )));
        }

        let job_id = self.executor.next_run_id();
        let live = Arc::new(LiveOutput::new(self.config.live_output_limit));

        lock_unpoisoned(&self.jobs).insert(
            job_id.clone(),
            JobEntry {
                job: BackgroundJob::new(job_id.clone(), self.time_provider.now_millis()),
                live: live.clone(),
                abort: None,
            },
        );

        let executor = self.executor.clone();
        let run_id = job_id.clone();
        let handle =
            tokio::spawn(async move { executor.execute_run(&run_id, &request, live).await });

        {
            let mut jobs = lock_unpoisoned(&self.jobs);
            match jobs.get_mut(&job_id) {
                Some(entry) if !entry.job.state.is_terminal() => {
                    entry.abort = Some(handle.abort_handle());
                }
                // Cancelled before the handle was registered
                _ => handle.abort(),
            }
        }

        let jobs = self.jobs.clone();
        let time_provider = self.time_provider.clone();
        let supervised_id = job_id.clone();
        tokio::spawn(async move {
            let outcome = handle.await;
            record_completion(&jobs, time_provider.as_ref(), &supervised_id, outcome);
        });

        info!(job_id = %job_id, "Background job submitted");
        Ok(job_id)
    }

    /// Current state of a job
    ///
    /// # Errors
    /// - AppError::NotFound if the job is unknown (or already purged)
    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        let jobs = lock_unpoisoned(&self.jobs);
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        let (live_stdout, live_stderr) = entry.live.snapshot();
        Ok(JobSnapshot {
            job: entry.job.clone(),
            live_stdout,
            live_stderr,
        })
    }

    /// Cancel a running job
    ///
    /// # Returns
    /// `true` if the job was running and is now cancelled, `false` if it had
    /// already reached a terminal state
    ///
    /// # Errors
    /// - AppError::NotFound if the job is unknown
    pub fn cancel(&self, job_id: &str) -> Result<bool> {
        let mut jobs = lock_unpoisoned(&self.jobs);
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        if entry.job.state.is_terminal() {
            return Ok(false);
        }

        entry.job.cancel(self.time_provider.now_millis())?;
        if let Some(abort) = entry.abort.take() {
            abort.abort();
        }

        info!(job_id = %job_id, "Background job cancelled");
        Ok(true)
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = lock_unpoisoned(&self.jobs);
        let mut counts = JobCounts::default();
        for entry in jobs.values() {
            match entry.job.state {
                JobState::Running => counts.running += 1,
                JobState::Finished => counts.finished += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Forget terminal jobs that finished more than `max_age` ago
    ///
    /// # Returns
    /// Number of jobs removed
    pub fn purge_finished(&self, max_age: Duration) -> usize {
        let cutoff = self.time_provider.now_millis() - max_age.as_millis() as i64;
        let mut jobs = lock_unpoisoned(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.job.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        before - jobs.len()
    }
}

fn record_completion(
    jobs: &Mutex<HashMap<JobId, JobEntry>>,
    time_provider: &dyn TimeProvider,
    job_id: &str,
    outcome: std::result::Result<Result<ExecutionResult>, JoinError>,
) {
    let mut jobs = lock_unpoisoned(jobs);
    let Some(entry) = jobs.get_mut(job_id) else {
        return;
    };
    entry.abort = None;
    if entry.job.state.is_terminal() {
        return;
    }

    let now = time_provider.now_millis();
    let transition = match outcome {
        Ok(Ok(result)) => {
            info!(job_id = %job_id, outcome = %result.outcome, "Background job finished");
            entry.job.finish(result, now)
        }
        Ok(Err(e)) => {
            error!(job_id = %job_id, error = %e, "Background job failed");
            entry.job.fail(e.to_string(), now)
        }
        Err(join_error) if join_error.is_cancelled() => return,
        Err(join_error) => {
            error!(job_id = %job_id, error = %join_error, "Background run panicked");
            entry.job.fail(format!("Run panicked: {}", join_error), now)
        }
    };

    if let Err(e) = transition {
        warn!(job_id = %job_id, error = %e, "Ignoring late job completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionOutcome;
    use crate::port::code_runner::mocks::{MockBehavior, MockCodeRunner};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::scratch_store::mocks::InMemoryScratchStore;
    use crate::port::system_probe::mocks::MockSystemProbe;
    use crate::port::time_provider::ManualTimeProvider;

    struct Fixture {
        manager: JobManager,
        runner: Arc<MockCodeRunner>,
        probe: Arc<MockSystemProbe>,
        clock: Arc<ManualTimeProvider>,
    }

    fn fixture(behavior: MockBehavior) -> Fixture {
        let runner = Arc::new(MockCodeRunner::new(behavior));
        let probe = Arc::new(MockSystemProbe::new(10.0));
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let executor = Arc::new(ExecutorService::new(
            runner.clone(),
            Arc::new(InMemoryScratchStore::new()),
            Arc::new(SequentialIdProvider::new("job")),
            clock.clone(),
            2,
        ));
        let manager = JobManager::new(
            executor,
            probe.clone(),
            clock.clone(),
            JobManagerConfig::default(),
        );
        Fixture {
            manager,
            runner,
            probe,
            clock,
        }
    }

    fn request(source: &str) -> ExecutionRequest {
        ExecutionRequest::builder(source).build().unwrap()
    }

    async fn wait_terminal(manager: &JobManager, job_id: &str) -> JobSnapshot {
        for _ in 0..200 {
            let snapshot = manager.status(job_id).unwrap();
            if snapshot.job.state.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_submit_runs_to_finished() {
        let fx = fixture(MockBehavior::Output {
            stdout: "done\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
        });

        let job_id = fx.manager.submit(request("print('done')")).await.unwrap();
        assert_eq!(job_id, "job-1");

        let snapshot = wait_terminal(&fx.manager, &job_id).await;
        assert_eq!(snapshot.job.state, JobState::Finished);
        let result = snapshot.job.result.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Completed);
        assert_eq!(result.stdout, "done\n");
        assert_eq!(snapshot.live_stdout, "done\n");
        assert_eq!(fx.runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_user_fault_still_finishes_job() {
        let fx = fixture(MockBehavior::Output {
            stdout: String::new(),
            stderr: "ValueError: bad\n".to_string(),
            exit_code: 1,
        });

        let job_id = fx.manager.submit(request("raise ValueError('bad')")).await.unwrap();
        let snapshot = wait_terminal(&fx.manager, &job_id).await;

        assert_eq!(snapshot.job.state, JobState::Finished);
        assert_eq!(
            snapshot.job.result.unwrap().outcome,
            ExecutionOutcome::RuntimeFault
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_fails_job() {
        let fx = fixture(MockBehavior::SpawnFail("no interpreter".to_string()));

        let job_id = fx.manager.submit(request("pass")).await.unwrap();
        let snapshot = wait_terminal(&fx.manager, &job_id).await;

        assert_eq!(snapshot.job.state, JobState::Failed);
        assert!(snapshot.job.error.unwrap().contains("no interpreter"));
    }

    #[tokio::test]
    async fn test_panicking_run_fails_job() {
        let fx = fixture(MockBehavior::Panic("runner exploded".to_string()));

        let job_id = fx.manager.submit(request("pass")).await.unwrap();
        let snapshot = wait_terminal(&fx.manager, &job_id).await;

        assert_eq!(snapshot.job.state, JobState::Failed);
        assert!(snapshot.job.error.unwrap().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_running_job() {
        let fx = fixture(MockBehavior::Hang {
            partial: "started\n".to_string(),
        });

        let job_id = fx.manager.submit(request("while True: pass")).await.unwrap();
        while fx.runner.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(fx.manager.cancel(&job_id).unwrap());
        let snapshot = fx.manager.status(&job_id).unwrap();
        assert_eq!(snapshot.job.state, JobState::Cancelled);
        assert_eq!(snapshot.live_stdout, "started\n");

        // Second cancel is a no-op
        assert!(!fx.manager.cancel(&job_id).unwrap());

        // The aborted run never records a result
        tokio::time::sleep(Duration::from_secs(120)).await;
        let snapshot = fx.manager.status(&job_id).unwrap();
        assert_eq!(snapshot.job.state, JobState::Cancelled);
        assert!(snapshot.job.result.is_none());
    }

    #[tokio::test]
    async fn test_cancel_finished_job_returns_false() {
        let fx = fixture(MockBehavior::Output {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        });

        let job_id = fx.manager.submit(request("pass")).await.unwrap();
        wait_terminal(&fx.manager, &job_id).await;

        assert!(!fx.manager.cancel(&job_id).unwrap());
        assert_eq!(
            fx.manager.status(&job_id).unwrap().job.state,
            JobState::Finished
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let fx = fixture(MockBehavior::Sleep(Duration::ZERO));
        assert!(matches!(
            fx.manager.status("missing"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.manager.cancel("missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_busy_host_throttles_submission() {
        let fx = fixture(MockBehavior::Sleep(Duration::ZERO));
        fx.probe.set_cpu_usage(97.5);

        let err = fx.manager.submit(request("pass")).await.unwrap_err();
        assert!(matches!(err, AppError::Throttled(_)));
        assert_eq!(fx.manager.counts(), JobCounts::default());
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_purge_finished_respects_age() {
        let fx = fixture(MockBehavior::Sleep(Duration::ZERO));

        let job_id = fx.manager.submit(request("pass")).await.unwrap();
        wait_terminal(&fx.manager, &job_id).await;
        assert_eq!(fx.manager.counts().finished, 1);

        assert_eq!(fx.manager.purge_finished(Duration::from_secs(60)), 0);

        fx.clock.advance(61_000);
        assert_eq!(fx.manager.purge_finished(Duration::from_secs(60)), 1);
        assert!(fx.manager.status(&job_id).is_err());
    }
}
