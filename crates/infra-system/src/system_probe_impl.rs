// System probe implementation
// reason: sysinfo for cross-platform CPU and memory readings
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use sysinfo::System;
use tracing::debug;

use pyrunner_core::port::system_probe::{SystemMetrics, SystemProbe};

/// System probe implementation using sysinfo
///
/// Keeps one `System` alive so consecutive CPU readings are deltas
/// rather than a fresh zero sample each time.
pub struct SystemProbeImpl {
    system: Mutex<System>,
}

impl SystemProbeImpl {
    /// Create a new system probe
    ///
    /// # Example
    /// ```ignore
    /// let probe = SystemProbeImpl::new();
    /// ```
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemProbeImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SystemProbeImpl {
    async fn get_metrics(&self) -> SystemMetrics {
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_usage_percent = sys.global_cpu_info().cpu_usage();
        let memory_used_mb = sys.used_memory() / 1024 / 1024;
        let memory_total_mb = sys.total_memory() / 1024 / 1024;

        debug!(
            cpu = %cpu_usage_percent,
            mem_used_mb = %memory_used_mb,
            mem_total_mb = %memory_total_mb,
            "System metrics collected"
        );

        SystemMetrics {
            cpu_usage_percent,
            memory_used_mb,
            memory_total_mb,
        }
    }
}
