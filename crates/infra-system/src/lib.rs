// PyRunner Infrastructure - System Adapters
// Implements: CodeRunner (Python subprocess), ScratchStore (filesystem), SystemProbe

pub mod python_runner;
pub mod scratch_store;
pub mod system_probe_impl;

pub use python_runner::{PythonRunner, PythonRunnerConfig};
pub use scratch_store::FsScratchStore;
pub use system_probe_impl::SystemProbeImpl;
