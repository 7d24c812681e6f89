//! PyRunner Daemon - Main Entry Point
//!
//! Wires the Python runner, scratch store and system probe into the executor,
//! background job manager and maintenance loop, then serves JSON-RPC until
//! Ctrl+C.

mod config;
mod logging;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pyrunner_api_rpc::{RpcServer, RpcServerConfig, RpcServices};
use pyrunner_core::application::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use pyrunner_core::application::{
    shutdown_channel, ExecutorService, JobManager, JobManagerConfig, MaintenanceConfig,
    MaintenanceScheduler,
};
use pyrunner_core::port::id_provider::UuidProvider;
use pyrunner_core::port::time_provider::SystemTimeProvider;
use pyrunner_infra_system::{FsScratchStore, PythonRunner, PythonRunnerConfig, SystemProbeImpl};

use crate::config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging (the log format is part of the config)
    let config = DaemonConfig::load()?;
    let _log_guard = logging::init(&config.log)?;

    info!("PyRunner v{} starting...", VERSION);

    // 2. Adapters
    let runner = Arc::new(PythonRunner::new(PythonRunnerConfig {
        interpreter: config.executor.python.clone(),
        env_allowlist: config.executor.env_allowlist.clone(),
        max_output_bytes: config.executor.max_output_bytes,
        drain_grace: config.executor.drain_grace(),
    }));
    let python_version = runner
        .probe()
        .await
        .context("Python interpreter is not usable")?;
    info!(
        interpreter = %config.executor.python.display(),
        version = %python_version,
        "Interpreter ready"
    );

    let scratch_root = config.executor.scratch_root();
    tokio::fs::create_dir_all(&scratch_root)
        .await
        .with_context(|| format!("Cannot create scratch root {}", scratch_root.display()))?;
    info!(scratch_root = %scratch_root.display(), "Scratch store ready");

    let scratch = Arc::new(FsScratchStore::new(
        scratch_root,
        config.executor.max_download_bytes,
    ));
    let probe = Arc::new(SystemProbeImpl::new());
    let time_provider = Arc::new(SystemTimeProvider);

    // 3. Application services (DI wiring)
    let executor = Arc::new(ExecutorService::new(
        runner,
        scratch.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
        config.executor.max_concurrent_runs,
    ));
    let jobs = Arc::new(JobManager::new(
        executor.clone(),
        probe.clone(),
        time_provider,
        JobManagerConfig {
            cpu_throttle_percent: config.jobs.cpu_throttle_percent,
            live_output_limit: config.executor.max_output_bytes,
        },
    ));

    // 4. JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc.host.clone(),
        port: config.rpc.port,
        rate_limit_burst: config.rpc.rate_limit_burst,
        rate_limit_per_sec: config.rpc.rate_limit_per_sec,
        default_blocked_modules: config.policy.blocked_modules.clone(),
        max_source_bytes: config.executor.max_source_bytes,
    };
    let services = RpcServices {
        executor,
        jobs: jobs.clone(),
        scratch: scratch.clone(),
        probe,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, services)
        .start()
        .await
        .context("RPC server start failed")?;

    // 5. Maintenance loop
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let maintenance = MaintenanceScheduler::new(
        scratch,
        jobs,
        MaintenanceConfig {
            interval: Duration::from_secs(config.maintenance.interval_secs),
            workspace_retention: Duration::from_secs(config.maintenance.workspace_retention_secs),
            job_retention: Duration::from_secs(config.maintenance.job_retention_secs),
        },
    );
    let maintenance_handle = tokio::spawn(maintenance.run(shutdown_rx));

    info!(addr = %rpc_addr, "System ready. Press Ctrl+C to shut down");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server was already stopped");
    }
    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, rpc_handle.stopped())
        .await
        .is_err()
    {
        warn!("RPC server did not stop within the shutdown timeout");
    }
    let _ = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, maintenance_handle).await;

    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}
