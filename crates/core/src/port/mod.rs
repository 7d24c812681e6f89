// Port Layer - Interfaces for external dependencies

pub mod code_runner;
pub mod id_provider; // For deterministic testing
pub mod scratch_store;
pub mod system_probe;
pub mod time_provider;

// Re-exports
pub use code_runner::{
    CodeRunner, DiscardSink, ExecutionError, OutputSink, RunOutput, RunSpec, StreamKind,
};
pub use id_provider::IdProvider;
pub use scratch_store::ScratchStore;
pub use system_probe::{SystemMetrics, SystemProbe};
pub use time_provider::TimeProvider;
