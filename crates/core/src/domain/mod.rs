// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod policy;
pub mod request;
pub mod result;

// Re-exports
pub use error::DomainError;
pub use job::{BackgroundJob, JobId, JobState};
pub use policy::{ImportPolicy, PolicyViolation, DEFAULT_BLOCKED_MODULES};
pub use request::{ExecutionRequest, ExecutionRequestBuilder, TimeoutSecs, MAX_SOURCE_BYTES};
pub use result::{ExecutionOutcome, ExecutionResult, RunId, ScratchFile};
