// Execution Result Domain Model

use serde::{Deserialize, Serialize};

/// Run ID (UUID v4, also the scratch directory name)
pub type RunId = String;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// Source ran to the end (or exited with status 0)
    Completed,
    /// Uncaught exception or non-zero exit; trace is in stderr
    RuntimeFault,
    /// Deadline elapsed and the interpreter was killed
    TimedOut,
    /// Rejected by the import pre-check, nothing ran
    PolicyViolation,
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOutcome::Completed => write!(f, "COMPLETED"),
            ExecutionOutcome::RuntimeFault => write!(f, "RUNTIME_FAULT"),
            ExecutionOutcome::TimedOut => write!(f, "TIMED_OUT"),
            ExecutionOutcome::PolicyViolation => write!(f, "POLICY_VIOLATION"),
        }
    }
}

/// A file left behind in the run's scratch directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchFile {
    /// Path relative to the scratch directory, `/`-separated
    pub path: String,
    pub size_bytes: u64,
}

/// Outcome of exactly one ExecutionRequest.
///
/// Streams are final: nothing writes to them after the result is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub outcome: ExecutionOutcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    /// True if either stream hit the capture limit
    pub truncated: bool,
    pub files: Vec<ScratchFile>,
}

impl ExecutionResult {
    /// Result for a request rejected before anything ran
    pub fn policy_violation(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            outcome: ExecutionOutcome::PolicyViolation,
            stdout: String::new(),
            stderr: message.into(),
            elapsed_seconds: 0.0,
            timed_out: false,
            exit_code: None,
            truncated: false,
            files: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_violation_result_has_no_output() {
        let result = ExecutionResult::policy_violation("run-1", "blocked");
        assert_eq!(result.outcome, ExecutionOutcome::PolicyViolation);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "blocked");
        assert!(!result.timed_out);
        assert!(!result.is_success());
    }

    #[test]
    fn test_outcome_serializes_screaming_case() {
        let json = serde_json::to_string(&ExecutionOutcome::RuntimeFault).unwrap();
        assert_eq!(json, "\"RUNTIME_FAULT\"");
        assert_eq!(ExecutionOutcome::TimedOut.to_string(), "TIMED_OUT");
    }
}
