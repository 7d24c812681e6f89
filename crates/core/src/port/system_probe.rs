// System resource monitoring port
// reason: async-trait so adapters may sample without blocking the runtime
use async_trait::async_trait;

/// Host resource metrics
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

/// System probe port for resource monitoring
///
/// Used to refuse background submissions on an overloaded host and for stats
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Get current system metrics
    ///
    /// # Example
    /// ```text
    /// let metrics = probe.get_metrics().await;
    /// if metrics.cpu_usage_percent > 90.0 {
    ///     return Err(AppError::Throttled("host busy".into()));
    /// }
    /// ```
    async fn get_metrics(&self) -> SystemMetrics;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock SystemProbe for testing
    pub struct MockSystemProbe {
        metrics: Mutex<SystemMetrics>,
    }

    impl MockSystemProbe {
        pub fn new(cpu_usage_percent: f32) -> Self {
            Self {
                metrics: Mutex::new(SystemMetrics {
                    cpu_usage_percent,
                    memory_used_mb: 1024,
                    memory_total_mb: 2048,
                }),
            }
        }

        pub fn set_cpu_usage(&self, cpu_usage_percent: f32) {
            self.metrics.lock().unwrap().cpu_usage_percent = cpu_usage_percent;
        }
    }

    #[async_trait]
    impl SystemProbe for MockSystemProbe {
        async fn get_metrics(&self) -> SystemMetrics {
            self.metrics.lock().unwrap().clone()
        }
    }
}
