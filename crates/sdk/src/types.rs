//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from api-rpc crate.

use serde::{Deserialize, Serialize};

/// Default wall-clock limit for a run, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;

/// Request to run (or submit) a script
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub source_code: String,
    pub timeout_seconds: u64,
    pub allow_async: bool,
    pub restrict_writes: bool,
    /// `None` uses the daemon's default denylist, `Some(vec![])` disables the check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_modules: Option<Vec<String>>,
}

impl RunRequest {
    /// Request with default options for `source_code`
    pub fn new(source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            allow_async: false,
            restrict_writes: false,
            blocked_modules: None,
        }
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn allow_async(mut self, allow: bool) -> Self {
        self.allow_async = allow;
        self
    }

    pub fn restrict_writes(mut self, restrict: bool) -> Self {
        self.restrict_writes = restrict;
        self
    }

    pub fn blocked_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Completed,
    RuntimeFault,
    TimedOut,
    PolicyViolation,
}

/// A file left in a run's scratch directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScratchFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Result of a finished run
#[derive(Debug, Clone, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub files: Vec<ScratchFile>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

/// Background job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Response from submit operation
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub state: JobState,
}

/// Response from status operation
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub state: JobState,
    pub created_at: i64,
    pub finished_at: Option<i64>,
    /// Live output while running, final output afterwards
    pub stdout: String,
    pub stderr: String,
    pub result: Option<RunResult>,
    pub error: Option<String>,
}

/// Request naming a background job
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub job_id: String,
}

/// Response from cancel operation
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListFilesRequest {
    pub run_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFilesResponse {
    pub run_id: String,
    pub files: Vec<ScratchFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadFileRequest {
    pub run_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReadFileResponse {
    pub content_base64: String,
}

/// Request to run only the import pre-check
#[derive(Debug, Clone, Serialize)]
pub struct PolicyCheckRequest {
    pub source_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_modules: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyCheckResponse {
    pub allowed: bool,
    pub blocked_module: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobCounts {
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Response from stats operation
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub version: String,
    pub runs_started: u64,
    pub available_run_slots: usize,
    pub jobs: JobCounts,
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub uptime_seconds: u64,
}
