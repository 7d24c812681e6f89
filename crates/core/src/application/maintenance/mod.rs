// Maintenance Service
// Periodic cleanup of scratch directories and finished background jobs

use super::constants::{
    DEFAULT_JOB_RETENTION, DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_WORKSPACE_RETENTION,
};
use super::jobs::JobManager;
use super::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::ScratchStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often the loop runs
    pub interval: Duration,
    /// Scratch directories untouched for this long are removed
    pub workspace_retention: Duration,
    /// Terminal jobs older than this are forgotten
    pub job_retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MAINTENANCE_INTERVAL,
            workspace_retention: DEFAULT_WORKSPACE_RETENTION,
            job_retention: DEFAULT_JOB_RETENTION,
        }
    }
}

/// What one maintenance pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub workspaces_removed: usize,
    pub jobs_removed: usize,
}

/// Maintenance scheduler
pub struct MaintenanceScheduler {
    scratch: Arc<dyn ScratchStore>,
    jobs: Arc<JobManager>,
    config: MaintenanceConfig,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `scratch` - Store whose stale run directories are purged
    /// * `jobs` - Job manager whose finished jobs are forgotten
    /// * `config` - Cadence and retention windows
    pub fn new(
        scratch: Arc<dyn ScratchStore>,
        jobs: Arc<JobManager>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            scratch,
            jobs,
            config,
        }
    }

    /// Run the maintenance loop until `shutdown` fires
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            workspace_retention_secs = self.config.workspace_retention.as_secs(),
            job_retention_secs = self.config.job_retention.as_secs(),
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = ?e, "Scheduled maintenance failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Maintenance scheduler stopped");
                    break;
                }
            }
        }
    }

    /// Run one maintenance pass immediately
    pub async fn run_now(&self) -> Result<MaintenanceReport> {
        let jobs_removed = self.jobs.purge_finished(self.config.job_retention);
        let workspaces_removed = self
            .scratch
            .purge_older_than(self.config.workspace_retention)
            .await?;

        let report = MaintenanceReport {
            workspaces_removed,
            jobs_removed,
        };

        info!(
            workspaces_removed = report.workspaces_removed,
            jobs_removed = report.jobs_removed,
            "Maintenance completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::executor::ExecutorService;
    use crate::application::jobs::JobManagerConfig;
    use crate::application::shutdown::shutdown_channel;
    use crate::port::code_runner::mocks::MockCodeRunner;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::scratch_store::mocks::InMemoryScratchStore;
    use crate::port::system_probe::mocks::MockSystemProbe;
    use crate::port::time_provider::SystemTimeProvider;

    fn scheduler(scratch: Arc<InMemoryScratchStore>) -> MaintenanceScheduler {
        let executor = Arc::new(ExecutorService::new(
            Arc::new(MockCodeRunner::printing("")),
            scratch.clone(),
            Arc::new(SequentialIdProvider::new("run")),
            Arc::new(SystemTimeProvider),
            1,
        ));
        let jobs = Arc::new(JobManager::new(
            executor,
            Arc::new(MockSystemProbe::new(0.0)),
            Arc::new(SystemTimeProvider),
            JobManagerConfig::default(),
        ));
        MaintenanceScheduler::new(scratch, jobs, MaintenanceConfig::default())
    }

    #[tokio::test]
    async fn test_run_now_purges_workspaces() {
        let scratch = Arc::new(InMemoryScratchStore::new());
        scratch.put_file("run-a", "out.txt", b"x");
        scratch.put_file("run-b", "out.txt", b"y");

        let report = scheduler(scratch.clone()).run_now().await.unwrap();

        assert_eq!(report.workspaces_removed, 2);
        assert_eq!(report.jobs_removed, 0);
        assert_eq!(scratch.run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_shutdown() {
        let scratch = Arc::new(InMemoryScratchStore::new());
        let (tx, token) = shutdown_channel();

        let handle = tokio::spawn(scheduler(scratch).run(token));
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
