// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod executor;
pub mod jobs;
pub mod live_output;
pub mod maintenance;
pub mod shutdown;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-exports
pub use executor::ExecutorService;
pub use jobs::{JobCounts, JobManager, JobManagerConfig, JobSnapshot};
pub use live_output::LiveOutput;
pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceScheduler};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

/// Lock a mutex, recovering the data if a holder panicked.
///
/// Output buffers and the job table stay usable after a panicking run task.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
