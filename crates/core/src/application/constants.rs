// Service constants (no magic values in services or adapters)
use std::time::Duration;

/// Concurrent interpreter processes allowed by default
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Per-stream capture limit (1 MiB); output past this is dropped and flagged
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long to keep draining pipes after the interpreter exits or is killed
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// CPU usage above which background submissions are refused (percent)
pub const CPU_THROTTLE_THRESHOLD: f32 = 90.0;

/// Largest scratch file served by a download (10 MiB)
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Maintenance cadence (10 minutes)
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Scratch directories older than this are purged (1 hour)
pub const DEFAULT_WORKSPACE_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Finished background jobs are forgotten after this (1 hour)
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Time the daemon waits for in-flight work on shutdown (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
