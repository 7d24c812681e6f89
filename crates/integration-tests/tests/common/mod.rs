//! Shared wiring for integration tests: real interpreter, real scratch store.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pyrunner_core::application::{ExecutorService, JobManager, JobManagerConfig};
use pyrunner_core::port::id_provider::UuidProvider;
use pyrunner_core::port::system_probe::mocks::MockSystemProbe;
use pyrunner_core::port::time_provider::SystemTimeProvider;
use pyrunner_infra_system::{FsScratchStore, PythonRunner, PythonRunnerConfig};
use tempfile::TempDir;

pub struct Harness {
    pub executor: Arc<ExecutorService>,
    pub scratch: Arc<FsScratchStore>,
    pub probe: Arc<MockSystemProbe>,
    /// Keeps the scratch root alive for the test's duration
    pub root: TempDir,
}

impl Harness {
    pub fn job_manager(&self) -> Arc<JobManager> {
        Arc::new(JobManager::new(
            self.executor.clone(),
            self.probe.clone(),
            Arc::new(SystemTimeProvider),
            JobManagerConfig::default(),
        ))
    }
}

/// Wire the real adapters, or `None` (with a note) when python3 is missing
pub async fn harness_or_skip(max_concurrent_runs: usize) -> Option<Harness> {
    let runner = PythonRunner::new(PythonRunnerConfig {
        drain_grace: Duration::from_millis(500),
        ..PythonRunnerConfig::default()
    });
    if let Err(e) = runner.probe().await {
        eprintln!("skipping: {}", e);
        return None;
    }

    let root = TempDir::new().unwrap();
    let scratch = Arc::new(FsScratchStore::new(root.path().join("scratch"), 1024 * 1024));
    let executor = Arc::new(ExecutorService::new(
        Arc::new(runner),
        scratch.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        max_concurrent_runs,
    ));

    Some(Harness {
        executor,
        scratch,
        probe: Arc::new(MockSystemProbe::new(10.0)),
        root,
    })
}

/// Alive and not a zombie
#[cfg(target_os = "linux")]
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone; false if it outlives `limit`
#[cfg(target_os = "linux")]
pub async fn gone_within(pid: i32, limit: Duration) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < limit {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
