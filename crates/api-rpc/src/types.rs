//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use pyrunner_core::application::JobCounts;
use pyrunner_core::domain::{ExecutionResult, JobId, JobState, ScratchFile, TimeoutSecs};
use serde::{Deserialize, Serialize};

/// exec.run.v1 / exec.submit.v1 - Run source code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub source_code: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub allow_async: bool,
    #[serde(default)]
    pub restrict_writes: bool,
    /// Absent: server default denylist. Empty: pre-check disabled.
    #[serde(default)]
    pub blocked_modules: Option<Vec<String>>,
}

fn default_timeout() -> u64 {
    TimeoutSecs::DEFAULT
}

/// exec.run.v1 result
pub type RunResponse = ExecutionResult;

/// exec.submit.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub state: JobState,
}

/// exec.status.v1 / exec.cancel.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
}

/// exec.status.v1 result; stdout/stderr hold live output while the job runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub state: JobState,
    pub created_at: i64,
    pub finished_at: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub result: Option<ExecutionResult>,
    pub error: Option<String>,
}

/// exec.cancel.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelled: bool,
}

/// files.list.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesRequest {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub run_id: String,
    pub files: Vec<ScratchFile>,
}

/// files.read.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileRequest {
    pub run_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileResponse {
    pub run_id: String,
    pub path: String,
    pub size_bytes: u64,
    pub content_base64: String,
}

/// policy.check.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheckRequest {
    pub source_code: String,
    #[serde(default)]
    pub blocked_modules: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheckResponse {
    pub allowed: bool,
    pub blocked_module: Option<String>,
    pub message: Option<String>,
}

/// admin.stats.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_defaults() {
        let req: RunRequest = serde_json::from_str(r#"{"source_code": "print(1)"}"#).unwrap();
        assert_eq!(req.timeout_seconds, 8);
        assert!(!req.allow_async);
        assert!(!req.restrict_writes);
        assert!(req.blocked_modules.is_none());
    }

    #[test]
    fn test_empty_blocklist_is_distinct_from_absent() {
        let req: RunRequest =
            serde_json::from_str(r#"{"source_code": "", "blocked_modules": []}"#).unwrap();
        assert_eq!(req.blocked_modules, Some(vec![]));
    }
}
